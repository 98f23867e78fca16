//! Registry facade: the host-facing dispatch point and the application-facing
//! lookup.
//!
//! A [`Registry`] is wired once, at deployment time, with one binder per
//! scope kind the deployment enables. The host feeds it [`HostEvent`]s;
//! application code asks it for the arena of a scope instance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::binder::{RequestBinder, SingletonBinder};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::HostEvent;
use crate::provider::{Provider, ScopedProvider};
use crate::scope::{InstanceId, ScopeKind};
use crate::session::SessionBinder;
use crate::sink::{DiagnosticSink, TracingSink};
use crate::stats::StatsSnapshot;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Scope-kind → binder wiring for one deployment.
pub struct Registry<P: Provider> {
    scoped: ScopedProvider<P>,
    singleton: Option<SingletonBinder<P>>,
    request: Option<RequestBinder<P>>,
    session: Option<SessionBinder<P>>,
}

impl<P: Provider> Registry<P> {
    /// Start wiring a registry around `provider`.
    pub fn builder(provider: P) -> RegistryBuilder<P> {
        RegistryBuilder::new(provider)
    }

    /// Wire a registry from a validated [`Config`].
    pub fn from_config(provider: P, config: &Config) -> Result<Self> {
        config.validate()?;
        config
            .enabled_scopes()
            .into_iter()
            .fold(
                Self::builder(provider).temp_dir(config.temp_dir.clone()),
                RegistryBuilder::bind,
            )
            .build()
    }

    /// Deliver one host lifecycle event.
    ///
    /// Teardown events never fail. Start events for a scope kind with no
    /// registered binder fail with [`Error::NotBound`].
    pub fn dispatch(&self, event: HostEvent) -> Result<()> {
        tracing::trace!(%event, "Dispatching host event");
        let kind = event.kind();
        let result = match event {
            HostEvent::Singleton(ev) => match &self.singleton {
                Some(binder) => binder.handle(ev),
                None => Self::unbound(kind, ev.instance(), ev.is_teardown()),
            },
            HostEvent::Request(ev) => match &self.request {
                Some(binder) => binder.handle(ev),
                None => Self::unbound(kind, ev.instance(), ev.is_teardown()),
            },
            HostEvent::Session(ev) => match &self.session {
                Some(binder) => binder.handle(ev),
                None => Self::unbound(kind, ev.session(), ev.is_teardown()),
            },
        };
        if let Err(err) = &result {
            tracing::warn!(scope = %kind, error = %err, "Host event rejected");
        }
        result
    }

    /// The arena bound to `instance` of scope `kind`.
    pub fn get(&self, kind: ScopeKind, instance: &InstanceId) -> Result<Arc<P::Handle>> {
        let unbound = || Error::not_bound(kind, instance);
        match kind {
            ScopeKind::Singleton => self.singleton.as_ref().ok_or_else(unbound)?.get(instance),
            ScopeKind::Request => self.request.as_ref().ok_or_else(unbound)?.get(instance),
            ScopeKind::Session => self.session.as_ref().ok_or_else(unbound)?.get(instance),
        }
    }

    /// Whether a binder is registered for `kind`
    #[must_use]
    pub fn is_bound(&self, kind: ScopeKind) -> bool {
        match kind {
            ScopeKind::Singleton => self.singleton.is_some(),
            ScopeKind::Request => self.request.is_some(),
            ScopeKind::Session => self.session.is_some(),
        }
    }

    /// The process-scope binder
    pub fn singleton_binder(&self) -> Result<&SingletonBinder<P>> {
        self.singleton
            .as_ref()
            .ok_or_else(|| Self::missing(ScopeKind::Singleton))
    }

    /// The request-scope binder
    pub fn request_binder(&self) -> Result<&RequestBinder<P>> {
        self.request
            .as_ref()
            .ok_or_else(|| Self::missing(ScopeKind::Request))
    }

    /// The session-scope binder, for [`detach`](SessionBinder::detach) and
    /// [`restore`](SessionBinder::restore) during migration.
    pub fn session_binder(&self) -> Result<&SessionBinder<P>> {
        self.session
            .as_ref()
            .ok_or_else(|| Self::missing(ScopeKind::Session))
    }

    /// The wrapped arena provider
    #[must_use]
    pub fn provider(&self) -> &P {
        self.scoped.provider()
    }

    /// Default base directory for arenas
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        self.scoped.temp_dir()
    }

    /// Counters plus live-instance counts
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            live_requests: self.request.as_ref().map_or(0, RequestBinder::live),
            live_sessions: self.session.as_ref().map_or(0, SessionBinder::live),
            singleton_bound: self
                .singleton
                .as_ref()
                .is_some_and(SingletonBinder::is_bound),
            ..self.scoped.stats().snapshot()
        }
    }

    /// Dispose every live arena: sessions first, then requests, then the
    /// process arena last. Safe to call more than once.
    pub fn shutdown(&self) {
        tracing::debug!(stats = ?self.stats(), "Shutting down arena registry");
        if let Some(binder) = &self.session {
            binder.shutdown();
        }
        if let Some(binder) = &self.request {
            binder.shutdown();
        }
        if let Some(binder) = &self.singleton {
            binder.shutdown();
        }
    }

    fn unbound(kind: ScopeKind, instance: &InstanceId, teardown: bool) -> Result<()> {
        if teardown {
            tracing::debug!(scope = %kind, %instance, "Teardown for unregistered scope ignored");
            Ok(())
        } else {
            Err(Error::not_bound(kind, instance))
        }
    }

    fn missing(kind: ScopeKind) -> Error {
        Error::configuration(format!("no {kind} binder registered"))
    }
}

impl<P: Provider> std::fmt::Debug for Registry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("temp_dir", &self.scoped.temp_dir())
            .field("singleton", &self.singleton)
            .field("request", &self.request)
            .field("session", &self.session)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Registry`]. Each scope kind may be bound at most once.
pub struct RegistryBuilder<P: Provider> {
    provider: P,
    temp_dir: PathBuf,
    sink: Arc<dyn DiagnosticSink>,
    scopes: Vec<ScopeKind>,
}

impl<P: Provider> RegistryBuilder<P> {
    fn new(provider: P) -> Self {
        Self {
            provider,
            temp_dir: std::env::temp_dir(),
            sink: Arc::new(TracingSink),
            scopes: Vec::new(),
        }
    }

    /// Default base directory for arenas
    pub fn temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// Where dispose failures are reported
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register the binder for `kind`
    pub fn bind(mut self, kind: ScopeKind) -> Self {
        self.scopes.push(kind);
        self
    }

    /// Register binders for every scope kind
    pub fn bind_all(self) -> Self {
        ScopeKind::ALL.into_iter().fold(self, Self::bind)
    }

    /// Finish wiring.
    ///
    /// Fails if a scope kind was bound twice, no scope was bound, or the
    /// temp directory is empty.
    pub fn build(self) -> Result<Registry<P>> {
        if self.temp_dir.as_os_str().is_empty() {
            return Err(Error::configuration("temp_dir must not be empty"));
        }
        if self.scopes.is_empty() {
            return Err(Error::configuration("no scope is bound"));
        }
        for (i, kind) in self.scopes.iter().enumerate() {
            if self.scopes[..i].contains(kind) {
                return Err(Error::configuration(format!("{kind} binder registered twice")));
            }
        }

        let scoped = ScopedProvider::new(Arc::new(self.provider), self.temp_dir, self.sink);
        let has = |kind| self.scopes.contains(&kind);
        let registry = Registry {
            singleton: has(ScopeKind::Singleton)
                .then(|| SingletonBinder::new(scoped.clone())),
            request: has(ScopeKind::Request).then(|| RequestBinder::new(scoped.clone())),
            session: has(ScopeKind::Session).then(|| SessionBinder::new(scoped.clone())),
            scoped,
        };
        tracing::debug!(
            scopes = ?self.scopes,
            temp_dir = %registry.temp_dir().display(),
            "Arena registry wired"
        );
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ScopeEvent, SessionEvent};
    use crate::testing::RecordingProvider;

    fn registry() -> Registry<RecordingProvider> {
        Registry::builder(RecordingProvider::new())
            .temp_dir("/tmp/app")
            .bind_all()
            .build()
            .unwrap()
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let err = Registry::builder(RecordingProvider::new())
            .bind(ScopeKind::Request)
            .bind(ScopeKind::Request)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("request binder registered twice"));
    }

    #[test]
    fn empty_wiring_is_rejected() {
        assert!(Registry::builder(RecordingProvider::new()).build().is_err());
    }

    #[test]
    fn unregistered_kind_is_not_bound() {
        let registry = Registry::builder(RecordingProvider::new())
            .bind(ScopeKind::Singleton)
            .build()
            .unwrap();
        let req = InstanceId::new("r");

        let err = registry
            .dispatch(HostEvent::Request(ScopeEvent::started("r")))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotBound {
                kind: ScopeKind::Request,
                ..
            }
        ));
        assert!(matches!(
            registry.get(ScopeKind::Request, &req),
            Err(Error::NotBound { .. })
        ));
        assert!(!registry.is_bound(ScopeKind::Request));

        // teardown for an unregistered kind is tolerated
        registry
            .dispatch(HostEvent::Request(ScopeEvent::ended("r")))
            .unwrap();
    }

    #[test]
    fn request_arena_defaults_to_temp_dir() {
        let registry = registry();
        let req = InstanceId::new("r");
        registry
            .dispatch(HostEvent::Request(ScopeEvent::started("r")))
            .unwrap();
        let arena = registry.get(ScopeKind::Request, &req).unwrap();
        assert_eq!(arena.base_dir, Path::new("/tmp/app"));
    }

    #[test]
    fn stats_track_live_instances() {
        let registry = registry();
        registry
            .dispatch(HostEvent::Singleton(ScopeEvent::started("app")))
            .unwrap();
        registry
            .dispatch(HostEvent::Request(ScopeEvent::started("r")))
            .unwrap();
        registry
            .dispatch(HostEvent::Session(SessionEvent::created("s")))
            .unwrap();

        let stats = registry.stats();
        assert_eq!(stats.opened, 3);
        assert_eq!(stats.live_requests, 1);
        assert_eq!(stats.live_sessions, 1);
        assert!(stats.singleton_bound);
    }

    #[test]
    fn shutdown_disposes_everything_once() {
        let registry = registry();
        registry
            .dispatch(HostEvent::Singleton(ScopeEvent::started("app")))
            .unwrap();
        registry
            .dispatch(HostEvent::Request(ScopeEvent::started("r")))
            .unwrap();
        registry
            .dispatch(HostEvent::Session(SessionEvent::created("s")))
            .unwrap();

        registry.shutdown();
        registry.shutdown();

        let stats = registry.stats();
        assert_eq!(stats.disposed, 3);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.live_requests, 0);
        assert_eq!(stats.live_sessions, 0);
        assert!(!stats.singleton_bound);
    }

    #[test]
    fn from_config_binds_enabled_scopes_only() {
        let config = Config {
            temp_dir: "/srv/tmp".into(),
            session: false,
            ..Config::default()
        };
        let registry = Registry::from_config(RecordingProvider::new(), &config).unwrap();
        assert!(registry.is_bound(ScopeKind::Singleton));
        assert!(registry.is_bound(ScopeKind::Request));
        assert!(!registry.is_bound(ScopeKind::Session));
        assert_eq!(registry.temp_dir(), Path::new("/srv/tmp"));
    }
}
