// src/metrics.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::path::Path;

pub const BACKEND_CALLS: &str = "signals_backend_calls_total";
pub const BACKEND_ERRORS: &str = "signals_backend_errors_total";
pub const BACKEND_LATENCY_MS: &str = "signals_backend_latency_ms";
pub const ITEMS_SKIPPED: &str = "signals_items_skipped_total";
pub const CHECKPOINTS: &str = "signals_checkpoints_total";
pub const RECORDS_PERSISTED: &str = "signals_records_persisted";

/// One-time metrics registration (so series show up in the rendered snapshot).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(BACKEND_CALLS, "Backend classification calls issued.");
        describe_counter!(
            BACKEND_ERRORS,
            "Items recorded with an error (backend failure or unusable reply)."
        );
        describe_histogram!(BACKEND_LATENCY_MS, "Backend call latency in milliseconds.");
        describe_counter!(ITEMS_SKIPPED, "Work items skipped as already completed.");
        describe_counter!(CHECKPOINTS, "Atomic checkpoint writes.");
        describe_gauge!(RECORDS_PERSISTED, "Output records in the last checkpoint.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Write the exposition text (textfile-collector style), atomically.
    pub fn write_snapshot(&self, path: &Path) -> Result<()> {
        let text = self.handle.render();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::fs::write(tmp.path(), text)?;
        tmp.persist(path)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
        Ok(())
    }
}
