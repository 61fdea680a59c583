use std::time::Instant;

use serde_json::Value;

/// Opaque handle to a loaded engine. Engines never see each other's handles;
/// the node manager is the only thing that dereferences one, and only
/// through the `EngineLoader` that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Registered,
    Loading,
    Loaded,
    Unloading,
    Failed,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Registered => "unloaded",
            EngineState::Loading => "loading",
            EngineState::Loaded => "loaded",
            EngineState::Unloading => "unloading",
            EngineState::Failed => "failed",
        }
    }
}

/// One entry in the node manager's registry (§3's engine record, §4.4's
/// state machine). `handle` is populated only while `state == Loaded`.
#[derive(Debug, Clone)]
pub struct EngineRecord {
    pub id: String,
    pub model_path: String,
    pub load_params: Value,
    pub gpu_id: Option<i32>,
    pub state: EngineState,
    pub handle: Option<EngineHandle>,
    pub last_used_at: Option<Instant>,
    pub registered_at: Instant,
    pub failure_message: Option<String>,
}

impl EngineRecord {
    pub fn new(id: String, model_path: String, load_params: Value, gpu_id: Option<i32>) -> Self {
        Self {
            id,
            model_path,
            load_params,
            gpu_id,
            state: EngineState::Registered,
            handle: None,
            last_used_at: None,
            registered_at: Instant::now(),
            failure_message: None,
        }
    }
}
