use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

use super::common::Usage;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl ChatCompletionRequest {
    /// Validates the DTO against the invariants in the data model: a
    /// non-empty model id and a non-empty message array where every role is
    /// non-empty.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.model.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "'model' must be a non-empty string".into(),
            ));
        }
        if self.messages.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "'messages' must be a non-empty array".into(),
            ));
        }
        for message in &self.messages {
            if message.role.trim().is_empty() {
                return Err(GatewayError::InvalidRequest(
                    "every message must have a non-empty 'role'".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn from_json(body: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidRequest(format!("invalid JSON body: {e}")))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("ChatCompletionRequest always serializes")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ChatDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChunkChoice {
    pub index: u32,
    pub delta: ChatDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<ChatChunkChoice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_model() {
        let req = ChatCompletionRequest {
            model: "  ".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            temperature: None,
            top_p: None,
            n: None,
            max_tokens: None,
            seed: None,
            stream: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_empty_messages() {
        let req = ChatCompletionRequest {
            model: "m1".into(),
            messages: vec![],
            temperature: None,
            top_p: None,
            n: None,
            max_tokens: None,
            seed: None,
            stream: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_blank_role() {
        let req = ChatCompletionRequest {
            model: "m1".into(),
            messages: vec![ChatMessage {
                role: "".into(),
                content: "hi".into(),
            }],
            temperature: None,
            top_p: None,
            n: None,
            max_tokens: None,
            seed: None,
            stream: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_request() {
        let req = ChatCompletionRequest {
            model: "m1".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            temperature: Some(0.7),
            top_p: None,
            n: None,
            max_tokens: Some(16),
            seed: None,
            stream: Some(true),
        };
        assert!(req.validate().is_ok());
        assert!(req.is_streaming());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(ChatCompletionRequest::from_json(b"{not json").is_err());
    }

    #[test]
    fn to_json_round_trips_from_json() {
        let body = serde_json::json!({
            "model": "m1",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.7,
            "top_p": serde_json::Value::Null,
            "n": serde_json::Value::Null,
            "max_tokens": 16,
            "seed": serde_json::Value::Null,
            "stream": false
        });
        let req = ChatCompletionRequest::from_json(body.to_string().as_bytes()).unwrap();
        assert_eq!(req.to_json(), body);
    }
}
