use std::collections::HashSet;

use crate::config::ApiKeyConfig;

/// API-key policy snapshot (§3). `header_name` comparisons are
/// case-insensitive at lookup time; callers pass already-lowercased headers.
#[derive(Debug, Clone)]
pub struct ApiKeyPolicy {
    pub enabled: bool,
    pub required: bool,
    pub header_name: String,
    pub keys: HashSet<String>,
}

impl From<&ApiKeyConfig> for ApiKeyPolicy {
    fn from(config: &ApiKeyConfig) -> Self {
        Self {
            enabled: config.enabled,
            required: config.required,
            header_name: config.header_name.clone(),
            keys: config.keys.iter().cloned().collect(),
        }
    }
}

impl ApiKeyPolicy {
    pub fn header_name_lower(&self) -> String {
        self.header_name.to_ascii_lowercase()
    }

    /// Extracts and verifies a presented header value against the policy,
    /// applying the `Authorization: Bearer <key>` stripping rule from §3.
    pub fn verify(&self, header_value: Option<&str>) -> bool {
        let Some(value) = header_value else {
            return false;
        };
        let key = if self.header_name.eq_ignore_ascii_case("authorization") {
            value.strip_prefix("Bearer ").unwrap_or(value)
        } else {
            value
        };
        self.keys.contains(key)
    }
}

pub struct ApiKeyHandler {
    policy: std::sync::RwLock<ApiKeyPolicy>,
}

impl ApiKeyHandler {
    pub fn new(policy: ApiKeyPolicy) -> Self {
        Self {
            policy: std::sync::RwLock::new(policy),
        }
    }

    pub fn update_config(&self, policy: ApiKeyPolicy) {
        *self.policy.write().expect("api key policy lock poisoned") = policy;
    }

    pub fn snapshot(&self) -> ApiKeyPolicy {
        self.policy.read().expect("api key policy lock poisoned").clone()
    }
}
