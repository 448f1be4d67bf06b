// src/lib.rs
// Public library surface for the CLI and integration tests.

pub mod assemble;
pub mod backend;
pub mod config;
pub mod engine;
pub mod identity;
pub mod logging;
pub mod lookup;
pub mod metrics;
pub mod normalize;
pub mod repair;
pub mod signal;
pub mod store;
pub mod types;

// Post-generation tools: reconciliation, flat import, counts
pub mod group;
pub mod reconcile;
pub mod stats;

// ---- Re-exports for stable public API ----
pub use crate::backend::{Backend, BackendError, BackendKind, BackendReply};
pub use crate::engine::{EngineState, GenerationEngine, RunSummary};
pub use crate::identity::IdentityKey;
pub use crate::lookup::LookupIndex;
pub use crate::signal::{OutputRecord, Sentiment, Signal};

use tracing::info;

/// Full generation pass for one backend: build the lookup index, pick the work
/// queue, resume from the backend's output file and process what is left.
pub async fn run_generation(
    kind: BackendKind,
    pipeline: &config::PipelineConfig,
    ai: &config::AiConfig,
) -> anyhow::Result<RunSummary> {
    let index = LookupIndex::from_dir(&pipeline.enriched_dir);
    let items = lookup::work_queue(&pipeline.clustered_file, &index)?;
    let backend = backend::build_backend(kind, pipeline, ai)?;

    let engine = GenerationEngine::new(backend, kind.output_path(pipeline), &pipeline.generation);
    let (_, summary) = engine.resume(&items, &index).await?;
    info!(backend = ?kind, "{}", summary.describe());
    Ok(summary)
}
