//! A deterministic, in-process engine used for local/dev operation and for
//! every integration test in this crate, so the gateway runs end-to-end
//! without a real model backend (§6).

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

use super::{
    collaborator::{EngineLoader, GenerationInput, GenerationRequest, GenerationStats, TokenEvent},
    record::EngineHandle,
};

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 64;

/// Echoes the input back to the caller one whitespace-delimited word at a
/// time. `load_params.fail = true` simulates a load failure; `load_params.
/// token_delay_ms` adds a per-token delay so tests can exercise TTFT/TPS
/// without a real model.
pub struct TestEngineLoader {
    next_handle: AtomicU64,
}

impl Default for TestEngineLoader {
    fn default() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
        }
    }
}

impl TestEngineLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl EngineLoader for TestEngineLoader {
    async fn load(
        &self,
        path: &str,
        params: &Value,
        _gpu_id: Option<i32>,
    ) -> Result<EngineHandle, GatewayError> {
        let should_fail = params
            .get("fail")
            .and_then(Value::as_bool)
            .unwrap_or(false)
            || path.trim().is_empty();

        if should_fail {
            return Err(GatewayError::EngineLoad(format!(
                "failed to load model at '{path}'"
            )));
        }

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        Ok(EngineHandle(id))
    }

    async fn generate(
        &self,
        _handle: EngineHandle,
        request: GenerationRequest,
        sink: mpsc::Sender<TokenEvent>,
        cancel: CancellationToken,
    ) -> Result<GenerationStats, GatewayError> {
        let text = match &request.input {
            GenerationInput::Chat { messages } => messages
                .last()
                .map(|(_, content)| content.clone())
                .unwrap_or_default(),
            GenerationInput::Completion { prompt } => prompt.clone(),
        };

        let input_tokens = text.split_whitespace().count() as u64;
        let max_output = request
            .max_tokens
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS)
            .max(1);

        let words: Vec<&str> = text.split_whitespace().collect();
        let words = if words.is_empty() { vec!["(empty prompt)"] } else { words };

        let mut emitted = 0u32;
        let mut truncated = false;

        for (i, word) in words.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(GatewayError::EngineRuntime("generation cancelled".into()));
            }
            if emitted >= max_output {
                truncated = true;
                break;
            }
            let delta = if i == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            };
            if sink
                .send(TokenEvent {
                    delta,
                    is_final: false,
                    finish_reason: None,
                })
                .await
                .is_err()
            {
                // Receiver dropped: the caller disconnected, cooperatively stop.
                return Err(GatewayError::EngineRuntime("client disconnected".into()));
            }
            emitted += 1;
        }

        let finish_reason = if truncated { "length" } else { "stop" };
        let _ = sink
            .send(TokenEvent {
                delta: String::new(),
                is_final: true,
                finish_reason: Some(finish_reason.to_string()),
            })
            .await;

        Ok(GenerationStats {
            input_tokens,
            output_tokens: emitted as u64,
        })
    }

    async fn unload(&self, _handle: EngineHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_succeeds_for_normal_path() {
        let loader = TestEngineLoader::new();
        let handle = loader.load("models/foo.bin", &Value::Null, None).await;
        assert!(handle.is_ok());
    }

    #[tokio::test]
    async fn load_fails_when_requested() {
        let loader = TestEngineLoader::new();
        let handle = loader
            .load("models/foo.bin", &serde_json::json!({"fail": true}), None)
            .await;
        assert!(handle.is_err());
    }

    #[tokio::test]
    async fn generate_echoes_words_and_emits_final_stop() {
        let loader = TestEngineLoader::new();
        let handle = loader.load("m", &Value::Null, None).await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let request = GenerationRequest {
            input: GenerationInput::Chat {
                messages: vec![("user".to_string(), "Hi there".to_string())],
            },
            max_tokens: None,
            temperature: None,
            top_p: None,
            seed: None,
        };
        let stats = loader
            .generate(handle, request, tx, cancel)
            .await
            .unwrap();
        assert_eq!(stats.output_tokens, 2);

        let mut events = Vec::new();
        while let Some(evt) = rx.recv().await {
            events.push(evt);
        }
        assert_eq!(events.len(), 3);
        assert!(!events[0].is_final);
        assert!(!events[1].is_final);
        assert!(events[2].is_final);
        assert_eq!(events[2].finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn generate_truncates_at_max_tokens_with_length_reason() {
        let loader = TestEngineLoader::new();
        let handle = loader.load("m", &Value::Null, None).await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let request = GenerationRequest {
            input: GenerationInput::Completion {
                prompt: "one two three four five".to_string(),
            },
            max_tokens: Some(2),
            temperature: None,
            top_p: None,
            seed: None,
        };
        loader
            .generate(handle, request, tx, CancellationToken::new())
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(evt) = rx.recv().await {
            events.push(evt);
        }
        let final_event = events.last().unwrap();
        assert_eq!(final_event.finish_reason.as_deref(), Some("length"));
    }

    #[tokio::test]
    async fn generate_stops_cooperatively_when_cancelled() {
        let loader = TestEngineLoader::new();
        let handle = loader.load("m", &Value::Null, None).await.unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = GenerationRequest {
            input: GenerationInput::Completion {
                prompt: "one two three".to_string(),
            },
            max_tokens: None,
            temperature: None,
            top_p: None,
            seed: None,
        };
        let result = loader.generate(handle, request, tx, cancel).await;
        assert!(result.is_err());
    }
}
