//! Worker supervisor and per-job compression pipeline.

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod supervisor;

pub use config::WorkerConfig;
pub use error::{PipelineFailure, WorkerError, WorkerResult};
pub use pipeline::Pipeline;
pub use supervisor::WorkerSupervisor;
