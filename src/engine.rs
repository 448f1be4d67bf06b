// src/engine.rs
//! # Generation Engine
//! Sequential, checkpointed pass over work items against one backend.
//!
//! Per identity key: `pending → in_flight → {completed | errored}`; keys that
//! already hold signals are `skipped` and never re-billed. The state map is an
//! explicit value passed in and handed back; the engine is its only writer.
//! Every `checkpoint_every` processed items, and once at the end, the whole map
//! is written atomically, so a crash loses at most one checkpoint interval.

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::assemble::{assemble, ClassificationRequest};
use crate::backend::{interpret, Backend, BackendError};
use crate::config::GenerationConfig;
use crate::identity::{anon_id, IdentityKey};
use crate::lookup::LookupIndex;
use crate::metrics as m;
use crate::signal::{OutputRecord, Signal};
use crate::store;
use crate::types::WorkItem;

/// All output records keyed by identity; doubles as the resume checkpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    records: BTreeMap<IdentityKey, OutputRecord>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records. If a key appears twice, a completed record
    /// wins over an empty one; otherwise the first occurrence is kept.
    pub fn from_records(records: Vec<OutputRecord>) -> Self {
        let mut state = Self::new();
        for rec in records {
            let key = rec.identity();
            state.upsert(key, rec);
        }
        state
    }

    pub fn load(path: &Path) -> Result<Self> {
        let records = store::load_output(path)
            .with_context(|| format!("loading previous output from {}", path.display()))?;
        Ok(Self::from_records(records))
    }

    pub fn is_completed(&self, key: &IdentityKey) -> bool {
        self.records.get(key).is_some_and(OutputRecord::is_completed)
    }

    /// Insert or replace; a record that already holds signals is never replaced.
    pub fn upsert(&mut self, key: IdentityKey, record: OutputRecord) {
        if self.is_completed(&key) {
            return;
        }
        self.records.insert(key, record);
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&OutputRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in key order; this is exactly what gets persisted.
    pub fn to_records(&self) -> Vec<OutputRecord> {
        self.records.values().cloned().collect()
    }

    pub fn completed_count(&self) -> usize {
        self.records.values().filter(|r| r.is_completed()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Key already completed; backend not called.
    Skipped,
    Completed { signals: usize },
    Errored(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records in the final output.
    pub total: usize,
    /// Items sent to the backend this run.
    pub processed: usize,
    /// Records loaded from a previous run.
    pub resumed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub checkpoints: usize,
}

impl RunSummary {
    pub fn describe(&self) -> String {
        format!(
            "signals written: {} total (new: {}, resumed: {}, skipped: {}, errored: {})",
            self.total, self.processed, self.resumed, self.skipped, self.errored
        )
    }
}

pub struct GenerationEngine<B: Backend> {
    backend: B,
    output: PathBuf,
    checkpoint_every: usize,
    delay: Duration,
    timeout: Duration,
}

impl<B: Backend> GenerationEngine<B> {
    pub fn new(backend: B, output: impl Into<PathBuf>, cfg: &GenerationConfig) -> Self {
        m::ensure_described();
        Self {
            backend,
            output: output.into(),
            checkpoint_every: cfg.checkpoint_every.max(1),
            delay: cfg.delay(),
            timeout: cfg.timeout(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Load the previous output (if any) and run over `items`.
    pub async fn resume(
        &self,
        items: &[WorkItem],
        index: &LookupIndex,
    ) -> Result<(EngineState, RunSummary)> {
        let state = EngineState::load(&self.output)?;
        self.run(items, index, state).await
    }

    /// One sequential pass. Only persistence failures abort the run.
    pub async fn run(
        &self,
        items: &[WorkItem],
        index: &LookupIndex,
        mut state: EngineState,
    ) -> Result<(EngineState, RunSummary)> {
        let mut summary = RunSummary {
            resumed: state.len(),
            ..RunSummary::default()
        };
        info!(
            provider = self.backend.name(),
            items = items.len(),
            resumed = summary.resumed,
            output = %self.output.display(),
            "generation run started"
        );

        for item in items {
            match self.process_item(item, index, &mut state).await {
                ItemOutcome::Skipped => {
                    summary.skipped += 1;
                    continue;
                }
                ItemOutcome::Completed { .. } => {}
                ItemOutcome::Errored(_) => summary.errored += 1,
            }
            summary.processed += 1;

            if summary.processed % self.checkpoint_every == 0 {
                self.checkpoint(&state)?;
                summary.checkpoints += 1;
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        self.checkpoint(&state)?;
        summary.checkpoints += 1;
        summary.total = state.len();

        info!(
            provider = self.backend.name(),
            total = summary.total,
            new = summary.processed,
            resumed = summary.resumed,
            skipped = summary.skipped,
            errored = summary.errored,
            "generation run finished"
        );
        Ok((state, summary))
    }

    /// Classify one item and upsert its record. Never fails: backend and schema
    /// problems become an errored record with an empty signal list.
    pub async fn process_item(
        &self,
        item: &WorkItem,
        index: &LookupIndex,
        state: &mut EngineState,
    ) -> ItemOutcome {
        let req = assemble(item, index);
        let key = req.key();
        let id = anon_id(&key.to_string());

        if state.is_completed(&key) {
            debug!(%id, "skipped: already completed");
            counter!(m::ITEMS_SKIPPED).increment(1);
            return ItemOutcome::Skipped;
        }

        debug!(%id, provider = self.backend.name(), "in_flight");
        let result = self.call_backend(&req).await;

        let (signals, error) = match result {
            Ok(signals) => (signals, None),
            Err(e) => {
                warn!(%id, provider = self.backend.name(), error = %e, "item errored");
                counter!(m::BACKEND_ERRORS, "provider" => self.backend.name()).increment(1);
                (Vec::new(), Some(e))
            }
        };

        let outcome = match &error {
            Some(e) => ItemOutcome::Errored(e.clone()),
            None => {
                debug!(%id, signals = signals.len(), "completed");
                ItemOutcome::Completed {
                    signals: signals.len(),
                }
            }
        };

        let record = OutputRecord {
            key: Some(key.to_string()),
            title: req.title.clone(),
            published: req.published.clone(),
            source: req.source.clone(),
            url: req.url.clone(),
            signals,
            error,
        };
        state.upsert(key, record);
        outcome
    }

    async fn call_backend(&self, req: &ClassificationRequest) -> Result<Vec<Signal>, String> {
        counter!(m::BACKEND_CALLS, "provider" => self.backend.name()).increment(1);
        let t0 = Instant::now();
        let reply = tokio::time::timeout(self.timeout, self.backend.classify(req)).await;
        histogram!(m::BACKEND_LATENCY_MS, "provider" => self.backend.name())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        match reply {
            Ok(Ok(reply)) => interpret(reply, req),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(BackendError::Timeout(self.timeout).to_string()),
        }
    }

    fn checkpoint(&self, state: &EngineState) -> Result<()> {
        store::write_output(&self.output, &state.to_records())
            .with_context(|| format!("checkpointing to {}", self.output.display()))?;
        counter!(m::CHECKPOINTS).increment(1);
        gauge!(m::RECORDS_PERSISTED).set(state.len() as f64);
        debug!(records = state.len(), "checkpoint written");
        Ok(())
    }
}
