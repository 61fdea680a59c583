use serde::{Deserialize, Serialize, de};

use crate::error::GatewayError;

use super::common::Usage;

/// `prompt` is either a non-empty string or a non-empty array of strings.
#[derive(Debug, Clone)]
pub enum Prompt {
    Single(String),
    Many(Vec<String>),
}

impl Prompt {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            Prompt::Single(s) => vec![s.clone()],
            Prompt::Many(items) => items.clone(),
        }
    }
}

impl<'de> Deserialize<'de> for Prompt {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Single(String),
            Many(Vec<String>),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Single(s) => Ok(Prompt::Single(s)),
            Raw::Many(items) => Ok(Prompt::Many(items)),
        }
    }
}

impl Serialize for Prompt {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Prompt::Single(s) => s.serialize(serializer),
            Prompt::Many(items) => items.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: Prompt,
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

impl CompletionRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.model.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "'model' must be a non-empty string".into(),
            ));
        }
        match &self.prompt {
            Prompt::Single(s) if s.is_empty() => {
                return Err(GatewayError::InvalidRequest(
                    "'prompt' must be a non-empty string".into(),
                ));
            }
            Prompt::Many(items) if items.is_empty() => {
                return Err(GatewayError::InvalidRequest(
                    "'prompt' array must be non-empty".into(),
                ));
            }
            _ => {}
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
        serde_json::to_value(self).expect("CompletionRequest always serializes")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub text: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionChunkChoice {
    pub index: u32,
    pub text: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<CompletionChunkChoice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_single_string_prompt() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"model":"m1","prompt":"hello"}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn accepts_array_prompt() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"model":"m1","prompt":["a","b"]}"#).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.prompt.as_vec(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn rejects_empty_string_prompt() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"model":"m1","prompt":""}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_empty_array_prompt() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"model":"m1","prompt":[]}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn to_json_round_trips_from_json() {
        let body = serde_json::json!({
            "model": "m1",
            "prompt": ["a", "b"],
            "temperature": serde_json::Value::Null,
            "top_p": serde_json::Value::Null,
            "n": serde_json::Value::Null,
            "max_tokens": serde_json::Value::Null,
            "seed": serde_json::Value::Null,
            "stream": serde_json::Value::Null
        });
        let req = CompletionRequest::from_json(body.to_string().as_bytes()).unwrap();
        assert_eq!(req.to_json(), body);
    }
}
