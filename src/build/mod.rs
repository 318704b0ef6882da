//! Build Orchestrator and its collaborators
//!
//! - `orchestrator`: bounded worker pool driving per-song builds
//! - `adapter`: the msupcm++ process boundary
//! - `artifact`: MSU-1 PCM header checks
//! - `workspace`: staging layout and cleanup
//! - `report`: per-song results and batch summary
//! - `warnings`: persisted warning acknowledgements

pub mod adapter;
pub mod artifact;
pub mod orchestrator;
pub mod report;
pub mod warnings;
pub mod workspace;

pub use adapter::{AdapterOutcome, CompilerAdapter, CompilerJob, MsuPcmAdapter};
pub use artifact::{encode_artifact, validate_artifact};
pub use orchestrator::{
    BuildEvent, BuildHandle, BuildOptions, BuildOrchestrator, CancellationToken, DEFAULT_MAX_WORKERS,
};
pub use report::{BuildCounts, BuildReport, BuildStatus, SongResult};
pub use warnings::WarningAcknowledgements;
pub use workspace::BuildWorkspace;
