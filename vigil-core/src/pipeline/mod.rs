pub mod orchestrator;

pub use orchestrator::{FailoverOrchestrator, PipelineSettings, Providers};
