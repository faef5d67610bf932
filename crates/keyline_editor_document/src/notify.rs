// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pluggable error notifier.
//!
//! Non-fatal document errors route through one notifier per pass, letting
//! the caller pick log-and-continue or collect-and-fail-the-batch.

use crate::error::DocumentError;
use parking_lot::Mutex;

/// Sink for locally recovered document errors.
pub trait ErrorNotifier: Send + Sync {
    /// Report one recovered error.
    fn notify(&self, error: DocumentError);
}

/// Notifier that logs each error and continues.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl ErrorNotifier for LogNotifier {
    fn notify(&self, error: DocumentError) {
        tracing::warn!("document error: {error}");
    }
}

/// Notifier that collects errors so the caller can fail a batch.
#[derive(Debug, Default)]
pub struct CollectNotifier {
    errors: Mutex<Vec<DocumentError>>,
}

impl CollectNotifier {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether anything was reported.
    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Number of reported errors.
    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// Take all reported errors, leaving the collector empty.
    pub fn take(&self) -> Vec<DocumentError> {
        std::mem::take(&mut self.errors.lock())
    }
}

impl ErrorNotifier for CollectNotifier {
    fn notify(&self, error: DocumentError) {
        self.errors.lock().push(error);
    }
}
