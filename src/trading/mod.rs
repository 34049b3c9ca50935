pub mod event_bus;
pub mod orchestrator;

pub use event_bus::{EngineEvent, EventBus};
pub use orchestrator::EvaluationScheduler;
