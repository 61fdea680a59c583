//! Engine lifecycle: the collaborator contract (§6), the record/state-machine
//! types backing it, the node manager that owns the registry (§4.4), and the
//! deterministic test engine used in place of a real model backend.

pub mod collaborator;
pub mod manager;
pub mod record;
pub mod test_engine;

pub use collaborator::{EngineLoader, GenerationInput, GenerationRequest, GenerationStats, TokenEvent};
pub use manager::NodeManager;
pub use record::{EngineHandle, EngineRecord, EngineState};
pub use test_engine::TestEngineLoader;
