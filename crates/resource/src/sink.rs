//! Operator-facing diagnostics.
//!
//! Dispose failures are never propagated to the host: an end-of-scope
//! callback that raised could abort cleanup of sibling scopes. They go to a
//! [`DiagnosticSink`] instead, which by default logs through `tracing`.

use crate::provider::DisposeError;
use crate::scope::{InstanceId, ScopeKind};

/// Receives failures that are reported but not propagated.
pub trait DiagnosticSink: Send + Sync {
    /// An arena could not be disposed. Leftover files are expected to be
    /// removed by an external sweep of stale temp directories.
    fn dispose_failed(&self, kind: ScopeKind, instance: &InstanceId, error: &DisposeError);
}

/// Sink that logs via `tracing::error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn dispose_failed(&self, kind: ScopeKind, instance: &InstanceId, error: &DisposeError) {
        tracing::error!(
            scope = %kind,
            %instance,
            error = %error,
            source = ?std::error::Error::source(error).map(ToString::to_string),
            "Error deleting temporary files"
        );
    }
}

impl<F> DiagnosticSink for F
where
    F: Fn(ScopeKind, &InstanceId, &DisposeError) + Send + Sync,
{
    fn dispose_failed(&self, kind: ScopeKind, instance: &InstanceId, error: &DisposeError) {
        self(kind, instance, error);
    }
}
