//! Scope kinds and instance identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three nested lifetimes the host container tracks.
///
/// Ordered from broadest to narrowest: a process outlives every session,
/// and a session outlives each request made on its behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// Process-wide scope, one instance per process run
    Singleton,
    /// Client session scope; may be passivated and reactivated
    Session,
    /// One inbound operation
    Request,
}

impl ScopeKind {
    /// Every scope kind, broadest first.
    pub const ALL: [Self; 3] = [Self::Singleton, Self::Session, Self::Request];

    /// Get the scope hierarchy level (lower numbers = broader scope)
    #[must_use]
    pub fn hierarchy_level(self) -> u8 {
        match self {
            Self::Singleton => 0,
            Self::Session => 1,
            Self::Request => 2,
        }
    }

    /// Check if this scope is broader than another scope
    #[must_use]
    pub fn is_broader_than(self, other: Self) -> bool {
        self.hierarchy_level() < other.hierarchy_level()
    }

    /// Whether instances of this kind may be serialized by the host.
    #[must_use]
    pub fn is_passivatable(self) -> bool {
        matches!(self, Self::Session)
    }

    /// Lowercase name, as used in configuration and log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Singleton => "singleton",
            Self::Session => "session",
            Self::Request => "request",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-assigned identifier of one scope instance (a process run, an
/// in-flight request, a live session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create an instance identifier. Any string the host uses is accepted,
    /// the empty string included.
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier (UUID v4).
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&InstanceId> for InstanceId {
    fn from(id: &InstanceId) -> Self {
        id.clone()
    }
}
