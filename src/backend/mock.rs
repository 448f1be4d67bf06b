// src/backend/mock.rs
//! Deterministic backend for tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{Backend, BackendError, BackendReply};
use crate::assemble::ClassificationRequest;

/// Replies are looked up by request title, falling back to a default.
/// Every call is recorded so tests can assert nothing was re-billed.
pub struct MockBackend {
    by_title: HashMap<String, Result<BackendReply, BackendError>>,
    fallback: Result<BackendReply, BackendError>,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn constant(reply: BackendReply) -> Self {
        Self {
            by_title: HashMap::new(),
            fallback: Ok(reply),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: BackendError) -> Self {
        Self {
            by_title: HashMap::new(),
            fallback: Err(err),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, title: &str, reply: Result<BackendReply, BackendError>) -> Self {
        self.by_title.insert(title.to_string(), reply);
        self
    }

    /// Titles seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock calls poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock calls poisoned").len()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn classify(&self, req: &ClassificationRequest) -> Result<BackendReply, BackendError> {
        self.calls
            .lock()
            .expect("mock calls poisoned")
            .push(req.title.clone());
        self.by_title
            .get(&req.title)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
