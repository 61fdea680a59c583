use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartDownloadRequest {
    pub url: String,
    pub local_path: String,
}

impl StartDownloadRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.url.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "'url' must be a non-empty string".into(),
            ));
        }
        if self.local_path.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "'local_path' must be a non-empty string".into(),
            ));
        }
        Ok(())
    }

    pub fn from_json(body: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidRequest(format!("invalid JSON body: {e}")))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("StartDownloadRequest always serializes")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartDownloadResponse {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_json_round_trips_from_json() {
        let body = serde_json::json!({
            "url": "https://example.com/weights.bin",
            "local_path": "models/weights.bin"
        });
        let req = StartDownloadRequest::from_json(body.to_string().as_bytes()).unwrap();
        assert_eq!(req.to_json(), body);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadStatusEntry {
    pub id: String,
    pub url: String,
    pub local_path: String,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadsSnapshotResponse {
    pub downloads: Vec<DownloadStatusEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelAllResponse {
    pub cancelled: usize,
}
