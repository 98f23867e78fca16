//! The arena provider seam and the shared open/dispose plumbing.
//!
//! A [`Provider`] knows how to open a temp-file arena rooted at a base
//! directory and how to dispose of it. Everything else in this crate decides
//! *when* those two calls happen.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use thiserror::Error;

use crate::scope::{InstanceId, ScopeKind};
use crate::sink::DiagnosticSink;
use crate::stats::Stats;

/// Failure reported by [`Provider::dispose`].
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DisposeError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DisposeError {
    /// Create a dispose error with a message
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a dispose error wrapping an underlying cause
    pub fn with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The failure message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for DisposeError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source("Error deleting temporary files", err)
    }
}

/// External collaborator that creates and destroys arenas.
///
/// `dispose` is not expected to be idempotent; the binders guarantee it runs
/// at most once per opened handle.
///
/// Neither call runs under a binder's map lock, so a provider may read other
/// arenas through the registry. A session arena is reopened and disposed
/// under its own session's lock, so those calls must not touch that same
/// session.
pub trait Provider: Send + Sync + 'static {
    /// The opaque arena handle.
    type Handle: Send + Sync + 'static;

    /// Open a fresh arena rooted at `base_dir`.
    fn open(&self, base_dir: &Path) -> Self::Handle;

    /// Dispose of an arena previously returned by [`open`](Self::open).
    fn dispose(&self, handle: &Self::Handle) -> Result<(), DisposeError>;
}

/// A provider together with the deployment's default temp directory, the
/// diagnostic sink and the counters every binder shares.
pub struct ScopedProvider<P: Provider> {
    provider: Arc<P>,
    temp_dir: Arc<Path>,
    sink: Arc<dyn DiagnosticSink>,
    stats: Arc<Stats>,
}

impl<P: Provider> Clone for ScopedProvider<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            temp_dir: Arc::clone(&self.temp_dir),
            sink: Arc::clone(&self.sink),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<P: Provider> std::fmt::Debug for ScopedProvider<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedProvider")
            .field("temp_dir", &self.temp_dir)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl<P: Provider> ScopedProvider<P> {
    /// Wrap `provider`, opening arenas under `temp_dir` unless an event
    /// names another base directory.
    pub fn new(
        provider: Arc<P>,
        temp_dir: impl Into<PathBuf>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            provider,
            temp_dir: Arc::from(temp_dir.into()),
            sink,
            stats: Arc::new(Stats::default()),
        }
    }

    /// The wrapped provider
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The default base directory
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Shared counters
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// `base_dir` if the host supplied one, the default temp directory
    /// otherwise.
    #[must_use]
    pub fn resolve<'a>(&'a self, base_dir: Option<&'a Path>) -> &'a Path {
        base_dir.unwrap_or(&*self.temp_dir)
    }

    pub(crate) fn open(
        &self,
        kind: ScopeKind,
        instance: &InstanceId,
        base_dir: &Path,
    ) -> Arc<P::Handle> {
        let handle = self.provider.open(base_dir);
        self.stats.opened.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            scope = %kind,
            %instance,
            base_dir = %base_dir.display(),
            "Opened arena"
        );
        Arc::new(handle)
    }

    /// Dispose `handle`, routing any failure to the sink. Never fails.
    pub(crate) fn dispose(&self, kind: ScopeKind, instance: &InstanceId, handle: &P::Handle) {
        self.stats.disposed.fetch_add(1, Ordering::Relaxed);
        match self.provider.dispose(handle) {
            Ok(()) => tracing::debug!(scope = %kind, %instance, "Disposed arena"),
            Err(err) => {
                self.stats.dispose_failures.fetch_add(1, Ordering::Relaxed);
                self.sink.dispose_failed(kind, instance, &err);
            }
        }
    }
}
