use std::collections::HashSet;

use crate::config::CorsConfig;

/// Immutable snapshot of the CORS policy. Updates replace the whole snapshot
/// atomically (see `CorsHandler::update_config`) rather than mutating fields
/// in place, so a reader never observes a half-updated policy.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    pub enabled: bool,
    pub allowed_origins: HashSet<String>,
    pub allowed_methods: HashSet<String>,
    pub allowed_headers: HashSet<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl From<&CorsConfig> for CorsPolicy {
    fn from(config: &CorsConfig) -> Self {
        Self {
            enabled: config.enabled,
            allowed_origins: config.allowed_origins.iter().cloned().collect(),
            allowed_methods: config
                .allowed_methods
                .iter()
                .map(|m| m.to_ascii_uppercase())
                .collect(),
            allowed_headers: config
                .allowed_headers
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            allow_credentials: config.allow_credentials,
            max_age_secs: config.max_age_secs,
        }
    }
}

impl CorsPolicy {
    fn allows_origin(&self, origin: &str) -> bool {
        if origin.is_empty() {
            return true;
        }
        self.allowed_origins.contains("*") || self.allowed_origins.contains(origin)
    }
}

/// Outcome of processing one request through the CORS handler. `headers` are
/// the `(name, value)` pairs to attach to the eventual response.
#[derive(Debug, Clone, Default)]
pub struct CorsDecision {
    pub is_valid: bool,
    pub is_preflight: bool,
    pub headers: Vec<(&'static str, String)>,
}

/// Runtime CORS handler: owns a swappable `CorsPolicy` and exposes the admin
/// operations from §4.2 in addition to `process`.
pub struct CorsHandler {
    policy: std::sync::RwLock<CorsPolicy>,
}

impl CorsHandler {
    pub fn new(policy: CorsPolicy) -> Self {
        Self {
            policy: std::sync::RwLock::new(policy),
        }
    }

    pub fn update_config(&self, policy: CorsPolicy) {
        *self.policy.write().expect("cors policy lock poisoned") = policy;
    }

    pub fn add_allowed_origin(&self, origin: &str) {
        let mut guard = self.policy.write().expect("cors policy lock poisoned");
        guard.allowed_origins.insert(origin.to_string());
    }

    pub fn remove_allowed_origin(&self, origin: &str) {
        let mut guard = self.policy.write().expect("cors policy lock poisoned");
        guard.allowed_origins.remove(origin);
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.policy
            .read()
            .expect("cors policy lock poisoned")
            .allows_origin(origin)
    }

    /// Implements §4.2's `process` operation.
    pub fn process(
        &self,
        method: &str,
        origin: Option<&str>,
        req_headers: Option<&str>,
        req_method: Option<&str>,
    ) -> CorsDecision {
        let policy = self.policy.read().expect("cors policy lock poisoned");

        if !policy.enabled {
            return CorsDecision {
                is_valid: true,
                is_preflight: false,
                headers: Vec::new(),
            };
        }

        let origin = origin.unwrap_or("");
        let is_preflight =
            method.eq_ignore_ascii_case("OPTIONS") && req_method.is_some_and(|m| !m.is_empty());

        if !policy.allows_origin(origin) {
            return CorsDecision {
                is_valid: false,
                is_preflight,
                headers: Vec::new(),
            };
        }

        if is_preflight {
            let req_method = req_method.unwrap_or("");
            let method_allowed =
                policy.allowed_methods.contains("*") || policy.allowed_methods.contains(req_method);

            let headers_allowed = req_headers
                .unwrap_or("")
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .all(|h| policy.allowed_headers.contains("*") || policy.allowed_headers.contains(&h));

            if !method_allowed || !headers_allowed {
                return CorsDecision {
                    is_valid: false,
                    is_preflight,
                    headers: Vec::new(),
                };
            }

            let mut headers = vec![
                ("Access-Control-Allow-Origin", origin_header(&policy, origin)),
                (
                    "Access-Control-Allow-Methods",
                    join_sorted(&policy.allowed_methods),
                ),
                (
                    "Access-Control-Allow-Headers",
                    join_sorted(&policy.allowed_headers),
                ),
                (
                    "Access-Control-Max-Age",
                    policy.max_age_secs.to_string(),
                ),
            ];
            if policy.allow_credentials {
                headers.push(("Access-Control-Allow-Credentials", "true".to_string()));
            }

            return CorsDecision {
                is_valid: true,
                is_preflight: true,
                headers,
            };
        }

        let mut headers = Vec::new();
        if !origin.is_empty() {
            headers.push(("Access-Control-Allow-Origin", origin_header(&policy, origin)));
            if policy.allow_credentials {
                headers.push(("Access-Control-Allow-Credentials", "true".to_string()));
            }
        }

        CorsDecision {
            is_valid: true,
            is_preflight: false,
            headers,
        }
    }
}

fn origin_header(policy: &CorsPolicy, origin: &str) -> String {
    // Browsers reject a literal "*" alongside credentialed requests, so when
    // the wildcard is configured we still echo the caller's concrete origin.
    if policy.allowed_origins.contains("*") && !policy.allow_credentials {
        "*".to_string()
    } else {
        origin.to_string()
    }
}

fn join_sorted(set: &HashSet<String>) -> String {
    let mut items: Vec<&str> = set.iter().map(String::as_str).collect();
    items.sort_unstable();
    items.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> CorsHandler {
        CorsHandler::new(CorsPolicy {
            enabled: true,
            allowed_origins: ["https://app.x".to_string()].into_iter().collect(),
            allowed_methods: ["GET", "POST", "OPTIONS"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            allowed_headers: ["content-type", "authorization"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            allow_credentials: false,
            max_age_secs: 600,
        })
    }

    #[test]
    fn preflight_with_allowed_origin_succeeds() {
        let h = handler();
        let decision = h.process(
            "OPTIONS",
            Some("https://app.x"),
            Some("content-type"),
            Some("POST"),
        );
        assert!(decision.is_valid);
        assert!(decision.is_preflight);
        assert!(
            decision
                .headers
                .iter()
                .any(|(k, v)| *k == "Access-Control-Allow-Origin" && v == "https://app.x")
        );
        assert!(
            decision
                .headers
                .iter()
                .any(|(k, v)| *k == "Access-Control-Allow-Methods" && v.contains("POST"))
        );
    }

    #[test]
    fn disallowed_origin_is_rejected() {
        let h = handler();
        let decision = h.process("GET", Some("https://evil.example"), None, None);
        assert!(!decision.is_valid);
    }

    #[test]
    fn non_preflight_never_emits_method_or_header_lists() {
        let h = handler();
        let decision = h.process("GET", Some("https://app.x"), None, None);
        assert!(decision.is_valid);
        assert!(!decision.is_preflight);
        assert!(
            !decision
                .headers
                .iter()
                .any(|(k, _)| *k == "Access-Control-Allow-Methods")
        );
    }

    #[test]
    fn disabled_policy_allows_everything_with_no_headers() {
        let h = handler();
        h.update_config(CorsPolicy {
            enabled: false,
            ..handler().policy.into_inner().unwrap()
        });
        let decision = h.process("GET", Some("https://evil.example"), None, None);
        assert!(decision.is_valid);
        assert!(decision.headers.is_empty());
    }

    #[test]
    fn admin_ops_mutate_allowed_origins() {
        let h = handler();
        assert!(!h.is_origin_allowed("https://new.example"));
        h.add_allowed_origin("https://new.example");
        assert!(h.is_origin_allowed("https://new.example"));
        h.remove_allowed_origin("https://new.example");
        assert!(!h.is_origin_allowed("https://new.example"));
    }

    #[test]
    fn preflight_with_disallowed_method_is_rejected() {
        let h = handler();
        let decision = h.process("OPTIONS", Some("https://app.x"), None, Some("DELETE"));
        assert!(!decision.is_valid);
    }
}
