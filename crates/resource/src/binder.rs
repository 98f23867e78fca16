//! Binders for the process-wide and per-request scopes.
//!
//! Both react to start/end events the same way: start opens an arena and
//! binds it to the instance, end disposes it and clears the binding. They
//! differ only in how the binding is stored.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{Error, Result};
use crate::events::ScopeEvent;
use crate::provider::{Provider, ScopedProvider};
use crate::scope::{InstanceId, ScopeKind};
use crate::slot::Slot;

// ---------------------------------------------------------------------------
// SingletonBinder
// ---------------------------------------------------------------------------

struct Published<H> {
    instance: InstanceId,
    handle: Arc<H>,
}

/// Binds one arena to the process run.
///
/// Start and stop are single-writer (the host serializes its own startup and
/// shutdown); readers may call [`get`](Self::get) from any number of threads
/// and always see either nothing or the fully published arena.
pub struct SingletonBinder<P: Provider> {
    scoped: ScopedProvider<P>,
    slot: ArcSwapOption<Published<P::Handle>>,
}

impl<P: Provider> SingletonBinder<P> {
    /// Create an unbound binder
    pub fn new(scoped: ScopedProvider<P>) -> Self {
        Self {
            scoped,
            slot: ArcSwapOption::empty(),
        }
    }

    /// Apply one host event.
    pub fn handle(&self, event: ScopeEvent) -> Result<()> {
        match event {
            ScopeEvent::Started { instance, base_dir } => {
                self.on_start(&instance, self.scoped.resolve(base_dir.as_deref()))
            }
            ScopeEvent::Ended { instance } => {
                self.on_end(&instance);
                Ok(())
            }
        }
    }

    /// Open the process arena under `base_dir` and publish it.
    ///
    /// Fails without opening anything if an arena is already published. Of
    /// two overlapping starts exactly one publishes; the loser disposes the
    /// arena it opened.
    pub fn on_start(&self, instance: &InstanceId, base_dir: &Path) -> Result<()> {
        if let Some(current) = &*self.slot.load() {
            return Err(Self::already_bound(instance, current));
        }
        let handle = self.scoped.open(ScopeKind::Singleton, instance, base_dir);
        let published = Arc::new(Published {
            instance: instance.clone(),
            handle,
        });
        let empty: Option<Arc<Published<P::Handle>>> = None;
        let previous = self
            .slot
            .compare_and_swap(&empty, Some(Arc::clone(&published)));
        match &*previous {
            None => Ok(()),
            Some(current) => {
                self.scoped
                    .dispose(ScopeKind::Singleton, instance, &published.handle);
                Err(Self::already_bound(instance, current))
            }
        }
    }

    /// Unpublish and dispose the process arena. No-op if nothing is bound
    /// to `instance`.
    pub fn on_end(&self, instance: &InstanceId) {
        let matches = match &*self.slot.load() {
            Some(current) => current.instance == *instance,
            None => false,
        };
        if !matches {
            tracing::debug!(scope = "singleton", %instance, "End for unbound instance ignored");
            return;
        }
        self.release();
    }

    /// The arena bound to `instance`.
    pub fn get(&self, instance: &InstanceId) -> Result<Arc<P::Handle>> {
        match &*self.slot.load() {
            Some(current) if current.instance == *instance => Ok(Arc::clone(&current.handle)),
            _ => Err(Error::not_bound(ScopeKind::Singleton, instance)),
        }
    }

    /// The published arena, whichever instance owns it.
    #[must_use]
    pub fn current(&self) -> Option<Arc<P::Handle>> {
        (*self.slot.load())
            .as_ref()
            .map(|current| Arc::clone(&current.handle))
    }

    /// Whether an arena is published
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.slot.load().is_some()
    }

    /// Dispose whatever is published. Used on process shutdown.
    pub fn shutdown(&self) {
        self.release();
    }

    fn already_bound(instance: &InstanceId, current: &Published<P::Handle>) -> Error {
        Error::protocol(
            ScopeKind::Singleton,
            instance,
            format!("arena already bound to '{}'", current.instance),
        )
    }

    fn release(&self) {
        // swap makes the take atomic, so concurrent ends dispose once
        if let Some(published) = self.slot.swap(None) {
            self.scoped.dispose(
                ScopeKind::Singleton,
                &published.instance,
                &published.handle,
            );
        }
    }
}

impl<P: Provider> std::fmt::Debug for SingletonBinder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.slot.load();
        f.debug_struct("SingletonBinder")
            .field("instance", &(*guard).as_ref().map(|p| p.instance.clone()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RequestBinder
// ---------------------------------------------------------------------------

/// Binds one arena to each in-flight request.
pub struct RequestBinder<P: Provider> {
    scoped: ScopedProvider<P>,
    slots: DashMap<InstanceId, Slot<P::Handle>>,
}

impl<P: Provider> RequestBinder<P> {
    /// Create a binder with no live requests
    pub fn new(scoped: ScopedProvider<P>) -> Self {
        Self {
            scoped,
            slots: DashMap::new(),
        }
    }

    /// Apply one host event.
    pub fn handle(&self, event: ScopeEvent) -> Result<()> {
        match event {
            ScopeEvent::Started { instance, base_dir } => {
                self.on_start(&instance, self.scoped.resolve(base_dir.as_deref()))
            }
            ScopeEvent::Ended { instance } => {
                self.on_end(&instance);
                Ok(())
            }
        }
    }

    /// Open an arena for `instance` under `base_dir`.
    ///
    /// Fails without opening anything if the request already has one. The
    /// arena is opened before the map is locked, so the provider may read
    /// other arenas; a racing start that loses disposes its arena.
    pub fn on_start(&self, instance: &InstanceId, base_dir: &Path) -> Result<()> {
        if self.slots.contains_key(instance) {
            return Err(Self::already_bound(instance));
        }
        let handle = self.scoped.open(ScopeKind::Request, instance, base_dir);
        match self.slots.entry(instance.clone()) {
            Entry::Occupied(occupied) => {
                drop(occupied);
                self.scoped.dispose(ScopeKind::Request, instance, &handle);
                Err(Self::already_bound(instance))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::bound(handle));
                Ok(())
            }
        }
    }

    /// Dispose the request's arena and forget the request. No-op for a
    /// request that never started or already ended.
    pub fn on_end(&self, instance: &InstanceId) {
        let Some((_, mut slot)) = self.slots.remove(instance) else {
            tracing::debug!(scope = "request", %instance, "End for unbound instance ignored");
            return;
        };
        if let Some(handle) = slot.take() {
            self.scoped.dispose(ScopeKind::Request, instance, &handle);
        }
    }

    /// The arena bound to `instance`.
    pub fn get(&self, instance: &InstanceId) -> Result<Arc<P::Handle>> {
        self.slots
            .get(instance)
            .and_then(|slot| slot.value().get().cloned())
            .ok_or_else(|| Error::not_bound(ScopeKind::Request, instance))
    }

    fn already_bound(instance: &InstanceId) -> Error {
        Error::protocol(ScopeKind::Request, instance, "arena already bound")
    }

    /// Number of requests holding an arena
    #[must_use]
    pub fn live(&self) -> usize {
        self.slots.len()
    }

    /// End every live request. Used on process shutdown.
    pub fn shutdown(&self) {
        let live: Vec<InstanceId> = self.slots.iter().map(|e| e.key().clone()).collect();
        for instance in &live {
            self.on_end(instance);
        }
    }
}

impl<P: Provider> std::fmt::Debug for RequestBinder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBinder")
            .field("live", &self.slots.len())
            .finish()
    }
}
