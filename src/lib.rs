// lib.rs - Main library file that exports all modules
pub mod assistant_client;
pub mod db;
pub mod handlers;
pub mod image_client;
pub mod middleware;
pub mod pipeline;
pub mod queue;
pub mod renderer_client;
pub mod voice_client;

// Re-export commonly used types for convenience
pub use pipeline::{StageError, StageExecutor, StageOutcome};
pub use queue::scheduler::PipelineQueue;
pub use queue::store::QueueCheckpointer;
pub use queue::{Job, JobId, JobKind, JobSpec, JobStatus};

/// Shared application state handed to every handler
pub struct AppState {
    pub queue: PipelineQueue,
}
