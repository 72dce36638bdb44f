mod orchestrator;
mod runtime;
mod shutdown;
mod state;
mod stats;
mod streaming;
mod tracking;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::{HeadcastPipeline, HeadcastPipelineBuilder};
pub use types::{ComponentState, PipelineStats, PoseOutcome, ShutdownReason};
