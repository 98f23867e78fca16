//! Session-scoped arenas that survive passivation.
//!
//! A session can be serialized by the host at any time between requests and
//! brought back later, possibly on another node. The arena handle is never
//! part of that serialized form: [`SessionArena`] serializes as its session
//! id only, releases the arena before passivation, and opens a fresh one
//! against the *current* node's directory after activation.
//!
//! ```text
//!   construct ──► Active ──will_passivate──► Passivated
//!                  ▲  │                          │
//!                  │  └──────end─────┐           │
//!                  └──did_activate───┼───────────┘
//!                                    ▼
//!                                  Ended ◄──end── Passivated
//! ```
//!
//! A passivated arena handed to the host for migration becomes `Detached`
//! on this node and can no longer be activated here.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::provider::{Provider, ScopedProvider};
use crate::scope::{InstanceId, ScopeKind};
use crate::slot::Slot;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Observable state of a [`SessionArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// An arena is open and accessible.
    Active,
    /// No arena; the session is (or is about to be) serialized.
    Passivated,
    /// Handed to the host for migration; never activated on this node again.
    Detached,
    /// The session ended. Terminal.
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Passivated => write!(f, "Passivated"),
            Self::Detached => write!(f, "Detached"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionArena
// ---------------------------------------------------------------------------

struct Inner<H> {
    slot: Slot<H>,
    detached: bool,
    ended: bool,
}

// Deserialized arenas start here: no handle, not ended.
impl<H> Default for Inner<H> {
    fn default() -> Self {
        Self {
            slot: Slot::empty(),
            detached: false,
            ended: false,
        }
    }
}

impl<H> Inner<H> {
    fn state(&self) -> SessionState {
        if self.ended {
            SessionState::Ended
        } else if self.detached {
            SessionState::Detached
        } else if self.slot.is_bound() {
            SessionState::Active
        } else {
            SessionState::Passivated
        }
    }
}

/// The arena holder stored in a session.
///
/// All transitions on one arena are serialized by a per-session lock, and
/// disposal happens while that lock is held, so an in-flight
/// [`access`](Self::access) can never observe a handle that is being torn
/// down.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct SessionArena<H> {
    session: InstanceId,
    #[serde(skip)]
    inner: Mutex<Inner<H>>,
}

impl<H: Send + Sync + 'static> SessionArena<H> {
    /// Open the session's first arena under `base_dir`.
    pub fn construct<P>(scoped: &ScopedProvider<P>, session: InstanceId, base_dir: &Path) -> Self
    where
        P: Provider<Handle = H>,
    {
        let handle = scoped.open(ScopeKind::Session, &session, base_dir);
        Self {
            session,
            inner: Mutex::new(Inner {
                slot: Slot::bound(handle),
                detached: false,
                ended: false,
            }),
        }
    }

    /// A passivated arena for `session`, as if just deserialized.
    #[must_use]
    pub fn passivated(session: InstanceId) -> Self {
        Self {
            session,
            inner: Mutex::default(),
        }
    }

    /// The owning session
    #[must_use]
    pub fn session(&self) -> &InstanceId {
        &self.session
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.lock().state()
    }

    /// Release the arena ahead of serialization. Idempotent.
    pub fn will_passivate<P>(&self, scoped: &ScopedProvider<P>)
    where
        P: Provider<Handle = H>,
    {
        let mut inner = self.inner.lock();
        match inner.slot.take() {
            Some(handle) => scoped.dispose(ScopeKind::Session, &self.session, &handle),
            None => tracing::debug!(
                session = %self.session,
                state = %inner.state(),
                "Passivate without arena ignored"
            ),
        }
    }

    /// Open a fresh arena under `base_dir` after deserialization.
    ///
    /// `base_dir` is this node's directory; files of the arena that existed
    /// before passivation are not recovered. Already-active arenas are left
    /// alone. Fails for detached and ended arenas.
    pub fn did_activate<P>(&self, scoped: &ScopedProvider<P>, base_dir: &Path) -> Result<()>
    where
        P: Provider<Handle = H>,
    {
        let mut inner = self.inner.lock();
        match inner.state() {
            SessionState::Ended => Err(Error::protocol(
                ScopeKind::Session,
                &self.session,
                "activated after end",
            )),
            SessionState::Detached => Err(Error::protocol(
                ScopeKind::Session,
                &self.session,
                "activated after detach",
            )),
            SessionState::Active => {
                tracing::warn!(session = %self.session, "Activate on active session ignored");
                Ok(())
            }
            SessionState::Passivated => {
                let handle = scoped.open(ScopeKind::Session, &self.session, base_dir);
                // state() just reported the slot empty and we still hold the lock
                let _ = inner.slot.bind(handle);
                Ok(())
            }
        }
    }

    /// The session's arena.
    ///
    /// Fails with [`Error::Uninitialized`] while passivated and with
    /// [`Error::Protocol`] once the session has ended.
    pub fn access(&self) -> Result<Arc<H>> {
        let inner = self.inner.lock();
        if inner.ended {
            return Err(Error::protocol(
                ScopeKind::Session,
                &self.session,
                "accessed after end",
            ));
        }
        inner
            .slot
            .get()
            .cloned()
            .ok_or_else(|| Error::Uninitialized {
                session: self.session.clone(),
            })
    }

    // Only a passivated arena may leave the node; the check and the mark
    // happen under one lock so a concurrent activation cannot slip between.
    fn mark_detached(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state() {
            SessionState::Passivated => {
                inner.detached = true;
                Ok(())
            }
            state => Err(Error::protocol(
                ScopeKind::Session,
                &self.session,
                format!("detached while {state}; passivate first"),
            )),
        }
    }

    /// Dispose the arena (if any) and mark the session ended. Repeated calls
    /// are no-ops.
    pub fn end<P>(&self, scoped: &ScopedProvider<P>)
    where
        P: Provider<Handle = H>,
    {
        let mut inner = self.inner.lock();
        if inner.ended {
            tracing::debug!(session = %self.session, "Duplicate session end ignored");
            return;
        }
        inner.ended = true;
        if let Some(handle) = inner.slot.take() {
            scoped.dispose(ScopeKind::Session, &self.session, &handle);
        }
    }
}

impl<H> fmt::Debug for SessionArena<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionArena")
            .field("session", &self.session)
            .field("state", &self.inner.lock().state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionBinder
// ---------------------------------------------------------------------------

/// Routes host session events to the arenas of sessions living on this node.
pub struct SessionBinder<P: Provider> {
    scoped: ScopedProvider<P>,
    sessions: DashMap<InstanceId, Arc<SessionArena<P::Handle>>>,
}

impl<P: Provider> SessionBinder<P> {
    /// Create a binder tracking no sessions
    pub fn new(scoped: ScopedProvider<P>) -> Self {
        Self {
            scoped,
            sessions: DashMap::new(),
        }
    }

    /// Apply one host event.
    ///
    /// Teardown events (`WillPassivate`, `Destroyed`) never fail.
    pub fn handle(&self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::Created { session, base_dir } => {
                self.on_created(session, self.scoped.resolve(base_dir.as_deref()))
            }
            SessionEvent::WillPassivate { session } => {
                self.on_will_passivate(&session);
                Ok(())
            }
            SessionEvent::DidActivate { session, base_dir } => {
                self.on_did_activate(&session, self.scoped.resolve(base_dir.as_deref()))
            }
            SessionEvent::Destroyed { session } => {
                self.on_destroyed(&session);
                Ok(())
            }
        }
    }

    /// Attach a new arena to a freshly created session.
    ///
    /// The arena is opened before the session map is locked. If a racing
    /// `Created` for the same session wins, the fresh arena is disposed.
    pub fn on_created(&self, session: InstanceId, base_dir: &Path) -> Result<()> {
        if self.sessions.contains_key(&session) {
            return Err(Self::created_twice(&session));
        }
        let arena = SessionArena::construct(&self.scoped, session.clone(), base_dir);
        match self.sessions.entry(session) {
            Entry::Occupied(occupied) => {
                let err = Self::created_twice(occupied.key());
                drop(occupied);
                arena.end(&self.scoped);
                Err(err)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(arena));
                Ok(())
            }
        }
    }

    /// Release the session's arena ahead of serialization.
    pub fn on_will_passivate(&self, session: &InstanceId) {
        match self.lookup(session) {
            Some(arena) => arena.will_passivate(&self.scoped),
            None => tracing::debug!(%session, "Passivate for unknown session ignored"),
        }
    }

    /// Reopen the session's arena under `base_dir`.
    ///
    /// A session migrated from another node must be [`restore`](Self::restore)d
    /// first.
    pub fn on_did_activate(&self, session: &InstanceId, base_dir: &Path) -> Result<()> {
        let arena = self.lookup(session).ok_or_else(|| {
            Error::protocol(ScopeKind::Session, session, "activated before create or restore")
        })?;
        arena.did_activate(&self.scoped, base_dir)
    }

    /// End the session, disposing its arena, and stop tracking it.
    pub fn on_destroyed(&self, session: &InstanceId) {
        match self.sessions.remove(session) {
            Some((_, arena)) => arena.end(&self.scoped),
            None => tracing::debug!(%session, "Destroy for unknown session ignored"),
        }
    }

    /// The session's arena holder.
    pub fn arena(&self, session: &InstanceId) -> Result<Arc<SessionArena<P::Handle>>> {
        self.lookup(session)
            .ok_or_else(|| Error::not_bound(ScopeKind::Session, session))
    }

    /// The session's open arena.
    pub fn get(&self, session: &InstanceId) -> Result<Arc<P::Handle>> {
        self.arena(session)?.access()
    }

    /// Stop tracking a passivated session so the host can move it to
    /// another node. The returned holder serializes without its arena.
    ///
    /// The holder is marked detached first, so an activation racing this
    /// call fails instead of reopening an arena nobody would dispose.
    pub fn detach(&self, session: &InstanceId) -> Result<Arc<SessionArena<P::Handle>>> {
        let arena = self
            .lookup(session)
            .ok_or_else(|| Error::not_bound(ScopeKind::Session, session))?;
        arena.mark_detached()?;
        // a concurrent destroy may have removed it already
        self.sessions
            .remove_if(session, |_, tracked| Arc::ptr_eq(tracked, &arena))
            .map(|(_, arena)| arena)
            .ok_or_else(|| Error::not_bound(ScopeKind::Session, session))
    }

    /// Track a session deserialized on (or detached back to) this node. It
    /// stays passivated until the host delivers `DidActivate`.
    pub fn restore(&self, mut arena: SessionArena<P::Handle>) -> Result<()> {
        let state = arena.state();
        if !matches!(state, SessionState::Passivated | SessionState::Detached) {
            return Err(Error::protocol(
                ScopeKind::Session,
                arena.session(),
                format!("restored in state {state}"),
            ));
        }
        arena.inner.get_mut().detached = false;
        match self.sessions.entry(arena.session().clone()) {
            Entry::Occupied(occupied) => Err(Error::protocol(
                ScopeKind::Session,
                occupied.key(),
                "restored over a live session",
            )),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(arena));
                Ok(())
            }
        }
    }

    /// Number of sessions tracked on this node
    #[must_use]
    pub fn live(&self) -> usize {
        self.sessions.len()
    }

    /// End every tracked session. Used on process shutdown.
    pub fn shutdown(&self) {
        let live: Vec<InstanceId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for session in &live {
            self.on_destroyed(session);
        }
    }

    fn created_twice(session: &InstanceId) -> Error {
        Error::protocol(ScopeKind::Session, session, "session created twice")
    }

    // Clone the Arc out so no map shard stays locked during a transition.
    fn lookup(&self, session: &InstanceId) -> Option<Arc<SessionArena<P::Handle>>> {
        self.sessions.get(session).map(|e| Arc::clone(e.value()))
    }
}

impl<P: Provider> fmt::Debug for SessionBinder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBinder")
            .field("live", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TracingSink;
    use crate::testing::{RecordingProvider, TestArena};
    use std::path::PathBuf;

    fn scoped(provider: &Arc<RecordingProvider>) -> ScopedProvider<RecordingProvider> {
        ScopedProvider::new(Arc::clone(provider), "/tmp/default", Arc::new(TracingSink))
    }

    fn arena(scoped: &ScopedProvider<RecordingProvider>, dir: &str) -> SessionArena<TestArena> {
        SessionArena::construct(scoped, InstanceId::new("s"), Path::new(dir))
    }

    #[test]
    fn construct_is_active() {
        let provider = Arc::new(RecordingProvider::new());
        let scoped = scoped(&provider);
        let arena = arena(&scoped, "/tmp/node-a");

        assert_eq!(arena.state(), SessionState::Active);
        let handle = arena.access().unwrap();
        assert_eq!(handle.base_dir, PathBuf::from("/tmp/node-a"));
        assert!(Arc::ptr_eq(&handle, &arena.access().unwrap()));
    }

    #[test]
    fn passivated_access_is_uninitialized() {
        let provider = Arc::new(RecordingProvider::new());
        let scoped = scoped(&provider);
        let arena = arena(&scoped, "/tmp/node-a");

        arena.will_passivate(&scoped);
        assert_eq!(arena.state(), SessionState::Passivated);
        assert!(matches!(arena.access(), Err(Error::Uninitialized { .. })));
    }

    #[test]
    fn double_passivate_disposes_once() {
        let provider = Arc::new(RecordingProvider::new());
        let scoped = scoped(&provider);
        let arena = arena(&scoped, "/tmp/node-a");
        let id = arena.access().unwrap().id;

        arena.will_passivate(&scoped);
        arena.will_passivate(&scoped);
        assert_eq!(provider.disposals_of(id), 1);
    }

    #[test]
    fn activate_uses_new_directory() {
        let provider = Arc::new(RecordingProvider::new());
        let scoped = scoped(&provider);
        let arena = arena(&scoped, "/tmp/node-a");
        let before = arena.access().unwrap();

        arena.will_passivate(&scoped);
        arena.did_activate(&scoped, Path::new("/tmp/node-b")).unwrap();
        let after = arena.access().unwrap();
        assert_ne!(before.id, after.id);
        assert_eq!(after.base_dir, PathBuf::from("/tmp/node-b"));
    }

    #[test]
    fn activate_on_active_keeps_handle() {
        let provider = Arc::new(RecordingProvider::new());
        let scoped = scoped(&provider);
        let arena = arena(&scoped, "/tmp/node-a");
        let before = arena.access().unwrap();

        arena.did_activate(&scoped, Path::new("/tmp/node-b")).unwrap();
        assert!(Arc::ptr_eq(&before, &arena.access().unwrap()));
        assert_eq!(provider.opens(), 1);
    }

    #[test]
    fn end_is_terminal() {
        let provider = Arc::new(RecordingProvider::new());
        let scoped = scoped(&provider);
        let arena = arena(&scoped, "/tmp/node-a");
        let id = arena.access().unwrap().id;

        arena.end(&scoped);
        arena.end(&scoped);
        assert_eq!(arena.state(), SessionState::Ended);
        assert_eq!(provider.disposals_of(id), 1);
        assert!(matches!(arena.access(), Err(Error::Protocol { .. })));
        assert!(matches!(
            arena.did_activate(&scoped, Path::new("/tmp")),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn end_while_passivated_disposes_nothing() {
        let provider = Arc::new(RecordingProvider::new());
        let scoped = scoped(&provider);
        let arena = arena(&scoped, "/tmp/node-a");

        arena.will_passivate(&scoped);
        arena.end(&scoped);
        assert_eq!(provider.total_disposals(), 1);
        assert_eq!(arena.state(), SessionState::Ended);
    }

    #[test]
    fn serializes_without_the_handle() {
        let provider = Arc::new(RecordingProvider::new());
        let scoped = scoped(&provider);
        let arena = arena(&scoped, "/tmp/node-a");

        arena.will_passivate(&scoped);
        let json = serde_json::to_string(&arena).unwrap();
        assert_eq!(json, r#"{"session":"s"}"#);

        let restored: SessionArena<TestArena> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.session().as_str(), "s");
        assert_eq!(restored.state(), SessionState::Passivated);
    }

    #[test]
    fn binder_rejects_duplicate_create() {
        let provider = Arc::new(RecordingProvider::new());
        let binder = SessionBinder::new(scoped(&provider));

        binder.handle(SessionEvent::created("s")).unwrap();
        let err = binder.handle(SessionEvent::created("s")).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(provider.opens(), 1);
    }

    #[test]
    fn binder_rejects_activate_for_unknown_session() {
        let provider = Arc::new(RecordingProvider::new());
        let binder = SessionBinder::new(scoped(&provider));
        let err = binder.handle(SessionEvent::did_activate("ghost")).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(provider.opens(), 0);
    }

    #[test]
    fn destroyed_session_is_not_bound() {
        let provider = Arc::new(RecordingProvider::new());
        let binder = SessionBinder::new(scoped(&provider));
        let s = InstanceId::new("s");

        binder.handle(SessionEvent::created("s")).unwrap();
        binder.handle(SessionEvent::destroyed("s")).unwrap();
        binder.handle(SessionEvent::destroyed("s")).unwrap();
        assert!(matches!(binder.get(&s), Err(Error::NotBound { .. })));
        assert_eq!(provider.total_disposals(), 1);
        assert_eq!(binder.live(), 0);
    }

    #[test]
    fn detach_requires_passivation() {
        let provider = Arc::new(RecordingProvider::new());
        let binder = SessionBinder::new(scoped(&provider));
        let s = InstanceId::new("s");

        binder.handle(SessionEvent::created("s")).unwrap();
        assert!(matches!(binder.detach(&s), Err(Error::Protocol { .. })));

        binder.handle(SessionEvent::will_passivate("s")).unwrap();
        let detached = binder.detach(&s).unwrap();
        assert_eq!(detached.state(), SessionState::Detached);
        assert_eq!(binder.live(), 0);
        assert!(matches!(binder.detach(&s), Err(Error::NotBound { .. })));
    }

    #[test]
    fn restore_then_activate() {
        let provider = Arc::new(RecordingProvider::new());
        let binder = SessionBinder::new(scoped(&provider));
        let s = InstanceId::new("s");

        binder.restore(SessionArena::passivated(s.clone())).unwrap();
        assert!(matches!(binder.get(&s), Err(Error::Uninitialized { .. })));

        binder
            .handle(SessionEvent::did_activate_in("s", "/tmp/node-b"))
            .unwrap();
        assert_eq!(binder.get(&s).unwrap().base_dir, PathBuf::from("/tmp/node-b"));
    }

    #[test]
    fn activation_holding_a_stale_arena_fails_after_detach() {
        let provider = Arc::new(RecordingProvider::new());
        let scoped = scoped(&provider);
        let binder = SessionBinder::new(scoped.clone());
        let s = InstanceId::new("s");

        binder.handle(SessionEvent::created("s")).unwrap();
        binder.handle(SessionEvent::will_passivate("s")).unwrap();
        // what an in-flight DidActivate holds after its lookup
        let stale = binder.arena(&s).unwrap();

        let detached = binder.detach(&s).unwrap();
        let err = stale
            .did_activate(&scoped, Path::new("/tmp/node-a"))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }), "{err}");
        assert_eq!(provider.opens(), 1);
        assert_eq!(detached.state(), SessionState::Detached);
        assert!(matches!(detached.access(), Err(Error::Uninitialized { .. })));
    }

    #[test]
    fn detached_arena_can_be_restored_in_process() {
        let provider = Arc::new(RecordingProvider::new());
        let binder = SessionBinder::new(scoped(&provider));
        let s = InstanceId::new("s");

        binder.handle(SessionEvent::created("s")).unwrap();
        binder.handle(SessionEvent::will_passivate("s")).unwrap();
        let detached = binder.detach(&s).unwrap();
        let owned = Arc::try_unwrap(detached).unwrap();

        binder.restore(owned).unwrap();
        assert_eq!(binder.arena(&s).unwrap().state(), SessionState::Passivated);
        binder.handle(SessionEvent::did_activate("s")).unwrap();
        assert!(binder.get(&s).is_ok());
    }

    #[test]
    fn restore_over_live_session_is_rejected() {
        let provider = Arc::new(RecordingProvider::new());
        let binder = SessionBinder::new(scoped(&provider));

        binder.handle(SessionEvent::created("s")).unwrap();
        let err = binder
            .restore(SessionArena::passivated(InstanceId::new("s")))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }
}
