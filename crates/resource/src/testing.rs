//! Testing utilities for host integrations
//!
//! [`RecordingProvider`] hands out numbered in-memory arenas and records
//! every open and dispose, so tests can assert exactly-once behaviour
//! without touching the filesystem. [`RecordingSink`] captures dispose
//! failures instead of logging them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::provider::{DisposeError, Provider};
use crate::scope::{InstanceId, ScopeKind};
use crate::sink::DiagnosticSink;

/// In-memory arena produced by [`RecordingProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestArena {
    /// Sequence number, starting at 1
    pub id: u64,
    /// Directory the arena was opened against
    pub base_dir: PathBuf,
}

/// One provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// `open` produced the arena with this id
    Open {
        /// Arena id
        id: u64,
        /// Requested base directory
        base_dir: PathBuf,
    },
    /// `dispose` was called for the arena with this id
    Dispose {
        /// Arena id
        id: u64,
    },
}

/// Provider that records calls and can be told to fail disposals.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    next_id: AtomicU64,
    fail_dispose: AtomicBool,
    calls: Mutex<Vec<ProviderCall>>,
}

impl RecordingProvider {
    /// Create a provider with an empty call log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent dispose report an error (after recording it).
    pub fn fail_disposals(&self, fail: bool) {
        self.fail_dispose.store(fail, Ordering::SeqCst);
    }

    /// Every call so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    /// Number of arenas opened
    #[must_use]
    pub fn opens(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ProviderCall::Open { .. }))
            .count()
    }

    /// Number of dispose calls for arena `id`
    #[must_use]
    pub fn disposals_of(&self, id: u64) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ProviderCall::Dispose { id: d } if *d == id))
            .count()
    }

    /// Number of dispose calls overall
    #[must_use]
    pub fn total_disposals(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ProviderCall::Dispose { .. }))
            .count()
    }
}

impl Provider for RecordingProvider {
    type Handle = TestArena;

    fn open(&self, base_dir: &Path) -> TestArena {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.lock().push(ProviderCall::Open {
            id,
            base_dir: base_dir.to_path_buf(),
        });
        TestArena {
            id,
            base_dir: base_dir.to_path_buf(),
        }
    }

    fn dispose(&self, handle: &TestArena) -> Result<(), DisposeError> {
        self.calls.lock().push(ProviderCall::Dispose { id: handle.id });
        if self.fail_dispose.load(Ordering::SeqCst) {
            return Err(DisposeError::new(format!(
                "could not delete {}",
                handle.base_dir.display()
            )));
        }
        Ok(())
    }
}

/// A dispose failure captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFailure {
    /// Scope kind of the failed arena
    pub kind: ScopeKind,
    /// Owning instance
    pub instance: InstanceId,
    /// Rendered error
    pub message: String,
}

/// Sink that keeps failures for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    failures: Mutex<Vec<RecordedFailure>>,
}

impl RecordingSink {
    /// Failures captured so far
    #[must_use]
    pub fn failures(&self) -> Vec<RecordedFailure> {
        self.failures.lock().clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn dispose_failed(&self, kind: ScopeKind, instance: &InstanceId, error: &DisposeError) {
        self.failures.lock().push(RecordedFailure {
            kind,
            instance: instance.clone(),
            message: error.to_string(),
        });
    }
}
