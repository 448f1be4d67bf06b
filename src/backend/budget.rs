// src/backend/budget.rs
//! Daily call budget for billed backends, persisted across runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use super::{Backend, BackendError, BackendReply};
use crate::assemble::ClassificationRequest;
use crate::store::write_json_atomic;

pub fn default_budget_dir() -> PathBuf {
    PathBuf::from("cache/budget")
}

/// Counts successful calls per UTC day; refuses further calls once the limit is hit.
/// Refused items are recorded as errored and picked up again by a later run.
pub struct BudgetedBackend<B: Backend> {
    inner: B,
    dir: PathBuf,
    limit: u32,
    counter: Mutex<DailyCounter>,
}

impl<B: Backend> BudgetedBackend<B> {
    pub fn new(inner: B, dir: PathBuf, limit: u32) -> Self {
        let counter = Mutex::new(load_daily_counter(&dir).unwrap_or_default());
        Self {
            inner,
            dir,
            limit,
            counter,
        }
    }

    pub fn used_today(&self) -> u32 {
        let mut g = self.counter.lock().expect("poisoned counter");
        g.roll_over();
        g.count
    }
}

#[async_trait]
impl<B: Backend> Backend for BudgetedBackend<B> {
    async fn classify(&self, req: &ClassificationRequest) -> Result<BackendReply, BackendError> {
        {
            let mut g = self.counter.lock().expect("poisoned counter");
            g.roll_over();
            if g.count >= self.limit {
                return Err(BackendError::DailyLimit(self.limit));
            }
        }

        let reply = self.inner.classify(req).await?;

        // Increment after a successful real call only.
        let snapshot = {
            let mut g = self.counter.lock().expect("poisoned counter");
            g.count = g.count.saturating_add(1);
            g.clone()
        };
        if let Err(e) = save_daily_counter(&self.dir, &snapshot) {
            warn!(error = %format!("{e:#}"), "failed to persist daily call counter");
        }
        Ok(reply)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn roll_over(&mut self) {
        let now = today();
        if self.date != now {
            self.date = now;
            self.count = 0;
        }
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> Option<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir)).ok()?;
    serde_json::from_str(&s).ok()
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> anyhow::Result<()> {
    write_json_atomic(&counter_path(dir), dc)
}
