use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

use super::record::EngineHandle;

/// What the dispatcher asks an engine to generate from: either a chat
/// transcript or a single completion prompt.
#[derive(Debug, Clone)]
pub enum GenerationInput {
    Chat { messages: Vec<(String, String)> },
    Completion { prompt: String },
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub input: GenerationInput,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: Option<i64>,
}

/// One unit pushed through the token sink (§6's `token_sink` contract).
#[derive(Debug, Clone)]
pub struct TokenEvent {
    pub delta: String,
    pub is_final: bool,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The engine collaborator contract from §6: `load` / `generate` / `unload`.
/// The gateway treats implementations as opaque and blocking-from-its-
/// perspective; a real backend is expected to offload onto `spawn_blocking`
/// or its own executor internally.
#[async_trait::async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(
        &self,
        path: &str,
        params: &Value,
        gpu_id: Option<i32>,
    ) -> Result<EngineHandle, GatewayError>;

    async fn generate(
        &self,
        handle: EngineHandle,
        request: GenerationRequest,
        sink: mpsc::Sender<TokenEvent>,
        cancel: CancellationToken,
    ) -> Result<GenerationStats, GatewayError>;

    async fn unload(&self, handle: EngineHandle);
}
