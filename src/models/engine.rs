use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterEngineRequest {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub load_params: Option<Value>,
    #[serde(default)]
    pub gpu_id: Option<i32>,
    #[serde(default)]
    pub load_at_startup: Option<bool>,
}

impl RegisterEngineRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "'id' must be a non-empty string".into(),
            ));
        }
        if self.path.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "'path' must be a non-empty string".into(),
            ));
        }
        Ok(())
    }

    pub fn from_json(body: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidRequest(format!("invalid JSON body: {e}")))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("RegisterEngineRequest always serializes")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterEngineResponse {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatusResponse {
    pub status: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineListEntry {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineListResponse {
    pub engines: Vec<EngineListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveEngineResponse {
    pub id: String,
    pub removed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_json_round_trips_from_json() {
        let body = serde_json::json!({
            "id": "m1",
            "path": "models/m1.bin",
            "load_params": serde_json::Value::Null,
            "gpu_id": serde_json::Value::Null,
            "load_at_startup": true
        });
        let req = RegisterEngineRequest::from_json(body.to_string().as_bytes()).unwrap();
        assert_eq!(req.to_json(), body);
    }
}
