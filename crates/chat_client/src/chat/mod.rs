pub mod orchestrator;
pub mod signals;

pub use orchestrator::ChatOrchestrator;
pub use signals::{ChatSignal, SendOutcome};
