//! Host lifecycle events.
//!
//! The host container delivers one event per lifecycle occurrence. Each scope
//! kind has a single transition function consuming its event type:
//! [`SingletonBinder::handle`], [`RequestBinder::handle`] and
//! [`SessionBinder::handle`].
//!
//! [`SingletonBinder::handle`]: crate::binder::SingletonBinder::handle
//! [`RequestBinder::handle`]: crate::binder::RequestBinder::handle
//! [`SessionBinder::handle`]: crate::session::SessionBinder::handle

use std::path::PathBuf;

use crate::scope::{InstanceId, ScopeKind};

// ---------------------------------------------------------------------------
// ScopeEvent
// ---------------------------------------------------------------------------

/// Start/end of a process run or of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEvent {
    /// The instance began.
    Started {
        /// The instance that began.
        instance: InstanceId,
        /// Directory to root the arena in; the configured temp directory
        /// when `None`.
        base_dir: Option<PathBuf>,
    },
    /// The instance ended.
    Ended {
        /// The instance that ended.
        instance: InstanceId,
    },
}

impl ScopeEvent {
    /// Instance started, arena rooted in the default temp directory
    pub fn started(instance: impl Into<InstanceId>) -> Self {
        Self::Started {
            instance: instance.into(),
            base_dir: None,
        }
    }

    /// Instance started, arena rooted in `base_dir`
    pub fn started_in(instance: impl Into<InstanceId>, base_dir: impl Into<PathBuf>) -> Self {
        Self::Started {
            instance: instance.into(),
            base_dir: Some(base_dir.into()),
        }
    }

    /// Instance ended
    pub fn ended(instance: impl Into<InstanceId>) -> Self {
        Self::Ended {
            instance: instance.into(),
        }
    }

    /// The instance this event concerns
    #[must_use]
    pub fn instance(&self) -> &InstanceId {
        match self {
            Self::Started { instance, .. } | Self::Ended { instance } => instance,
        }
    }

    /// Whether this event releases an arena rather than creating one.
    #[must_use]
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// Session lifecycle, delivered in order per session: `Created` first,
/// `Destroyed` last, any number of `WillPassivate`/`DidActivate` pairs in
/// between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session was created.
    Created {
        /// The new session.
        session: InstanceId,
        /// Directory to root the arena in; the configured temp directory
        /// when `None`.
        base_dir: Option<PathBuf>,
    },
    /// The host is about to serialize the session.
    WillPassivate {
        /// The session being passivated.
        session: InstanceId,
    },
    /// The host has just deserialized the session, possibly on another node.
    DidActivate {
        /// The reactivated session.
        session: InstanceId,
        /// This node's directory to root the new arena in; the configured
        /// temp directory when `None`.
        base_dir: Option<PathBuf>,
    },
    /// The session ended or expired.
    Destroyed {
        /// The ended session.
        session: InstanceId,
    },
}

impl SessionEvent {
    /// Session created, arena rooted in the default temp directory
    pub fn created(session: impl Into<InstanceId>) -> Self {
        Self::Created {
            session: session.into(),
            base_dir: None,
        }
    }

    /// Session created, arena rooted in `base_dir`
    pub fn created_in(session: impl Into<InstanceId>, base_dir: impl Into<PathBuf>) -> Self {
        Self::Created {
            session: session.into(),
            base_dir: Some(base_dir.into()),
        }
    }

    /// Session about to be serialized
    pub fn will_passivate(session: impl Into<InstanceId>) -> Self {
        Self::WillPassivate {
            session: session.into(),
        }
    }

    /// Session reactivated, arena rooted in the default temp directory
    pub fn did_activate(session: impl Into<InstanceId>) -> Self {
        Self::DidActivate {
            session: session.into(),
            base_dir: None,
        }
    }

    /// Session reactivated, arena rooted in `base_dir`
    pub fn did_activate_in(session: impl Into<InstanceId>, base_dir: impl Into<PathBuf>) -> Self {
        Self::DidActivate {
            session: session.into(),
            base_dir: Some(base_dir.into()),
        }
    }

    /// Session ended
    pub fn destroyed(session: impl Into<InstanceId>) -> Self {
        Self::Destroyed {
            session: session.into(),
        }
    }

    /// The session this event concerns
    #[must_use]
    pub fn session(&self) -> &InstanceId {
        match self {
            Self::Created { session, .. }
            | Self::WillPassivate { session }
            | Self::DidActivate { session, .. }
            | Self::Destroyed { session } => session,
        }
    }

    /// Whether this event releases an arena rather than creating one.
    #[must_use]
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::WillPassivate { .. } | Self::Destroyed { .. })
    }
}

// ---------------------------------------------------------------------------
// HostEvent
// ---------------------------------------------------------------------------

/// Any lifecycle event the host delivers, tagged by scope kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Process start/stop
    Singleton(ScopeEvent),
    /// Request start/end
    Request(ScopeEvent),
    /// Session lifecycle
    Session(SessionEvent),
}

impl HostEvent {
    /// The scope kind this event targets
    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        match self {
            Self::Singleton(_) => ScopeKind::Singleton,
            Self::Request(_) => ScopeKind::Request,
            Self::Session(_) => ScopeKind::Session,
        }
    }

    /// The instance this event concerns
    #[must_use]
    pub fn instance(&self) -> &InstanceId {
        match self {
            Self::Singleton(ev) | Self::Request(ev) => ev.instance(),
            Self::Session(ev) => ev.session(),
        }
    }

    /// Whether this event releases an arena rather than creating one.
    #[must_use]
    pub fn is_teardown(&self) -> bool {
        match self {
            Self::Singleton(ev) | Self::Request(ev) => ev.is_teardown(),
            Self::Session(ev) => ev.is_teardown(),
        }
    }
}

impl std::fmt::Display for HostEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Singleton(ev) | Self::Request(ev) => match ev {
                ScopeEvent::Started { .. } => "started",
                ScopeEvent::Ended { .. } => "ended",
            },
            Self::Session(ev) => match ev {
                SessionEvent::Created { .. } => "created",
                SessionEvent::WillPassivate { .. } => "will-passivate",
                SessionEvent::DidActivate { .. } => "did-activate",
                SessionEvent::Destroyed { .. } => "destroyed",
            },
        };
        write!(f, "{} {name} '{}'", self.kind(), self.instance())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_events() {
        assert!(ScopeEvent::ended("r").is_teardown());
        assert!(!ScopeEvent::started("r").is_teardown());
        assert!(SessionEvent::will_passivate("s").is_teardown());
        assert!(SessionEvent::destroyed("s").is_teardown());
        assert!(!SessionEvent::did_activate("s").is_teardown());
        assert!(!SessionEvent::created("s").is_teardown());
    }

    #[test]
    fn host_event_reports_kind_and_instance() {
        let ev = HostEvent::Session(SessionEvent::did_activate_in("s-1", "/tmp/node-b"));
        assert_eq!(ev.kind(), ScopeKind::Session);
        assert_eq!(ev.instance().as_str(), "s-1");
        assert_eq!(ev.to_string(), "session did-activate 's-1'");
    }

    #[test]
    fn started_in_carries_directory() {
        let ScopeEvent::Started { base_dir, .. } = ScopeEvent::started_in("app", "/tmp/app") else {
            panic!("expected Started");
        };
        assert_eq!(base_dir, Some(PathBuf::from("/tmp/app")));
    }
}
