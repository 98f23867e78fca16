//! Error types for scope-bound arenas
use thiserror::Error;

use crate::scope::{InstanceId, ScopeKind};

/// Result type for binding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the host or to application code.
///
/// Dispose failures are not represented here: they are reported through
/// [`DiagnosticSink`](crate::sink::DiagnosticSink) and never propagated.
#[derive(Error, Debug)]
pub enum Error {
    /// No arena is bound for the queried scope instance, either because the
    /// binder for this scope kind was never registered or because the
    /// instance never started (or already ended).
    #[error("No {kind} arena bound for '{instance}'; is the {kind} binder registered?")]
    NotBound {
        /// The queried scope kind
        kind: ScopeKind,
        /// The queried instance
        instance: InstanceId,
    },

    /// The session arena exists but is passivated.
    #[error("Session '{session}' arena is not initialized (passivated)")]
    Uninitialized {
        /// The session identifier
        session: InstanceId,
    },

    /// A transition was invoked out of order.
    #[error("Protocol violation in {kind} scope '{instance}': {reason}")]
    Protocol {
        /// The scope kind the transition targeted
        kind: ScopeKind,
        /// The instance the transition targeted
        instance: InstanceId,
        /// What went wrong
        reason: String,
    },

    /// Wiring configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a not-bound error
    pub fn not_bound(kind: ScopeKind, instance: impl Into<InstanceId>) -> Self {
        Self::NotBound {
            kind,
            instance: instance.into(),
        }
    }

    /// Create a protocol violation
    pub fn protocol(
        kind: ScopeKind,
        instance: impl Into<InstanceId>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Protocol {
            kind,
            instance: instance.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// None of these errors go away by retrying: they are wiring faults or
    /// integration bugs.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Scope kind associated with this error (if any)
    #[must_use]
    pub fn kind(&self) -> Option<ScopeKind> {
        match self {
            Self::NotBound { kind, .. } | Self::Protocol { kind, .. } => Some(*kind),
            Self::Uninitialized { .. } => Some(ScopeKind::Session),
            Self::Configuration { .. } => None,
        }
    }

    /// Instance associated with this error (if any)
    #[must_use]
    pub fn instance(&self) -> Option<&InstanceId> {
        match self {
            Self::NotBound { instance, .. } | Self::Protocol { instance, .. } => Some(instance),
            Self::Uninitialized { session } => Some(session),
            Self::Configuration { .. } => None,
        }
    }
}
