//! # Tempscope Resource
//!
//! Binds a disposable temp-file arena to the scopes of a request-processing
//! host: one arena per process run, one per in-flight request, and one per
//! client session. Sessions may be passivated (serialized) and reactivated,
//! possibly on another node; their arena is released before passivation and
//! reopened against the current node's directory afterwards.
//!
//! The host drives everything through [`Registry::dispatch`]; application
//! code reads arenas through [`Registry::get`]. Arena creation and deletion
//! are delegated to a [`Provider`].
//!
//! ```
//! use std::path::{Path, PathBuf};
//! use tempscope_resource::{
//!     DisposeError, HostEvent, InstanceId, Provider, Registry, ScopeEvent, ScopeKind,
//! };
//!
//! struct Dirs;
//!
//! impl Provider for Dirs {
//!     type Handle = PathBuf;
//!     fn open(&self, base_dir: &Path) -> PathBuf {
//!         base_dir.join("arena")
//!     }
//!     fn dispose(&self, _handle: &PathBuf) -> Result<(), DisposeError> {
//!         Ok(())
//!     }
//! }
//!
//! let registry = Registry::builder(Dirs).temp_dir("/tmp/app").bind_all().build()?;
//! let req = InstanceId::new("req-1");
//!
//! registry.dispatch(HostEvent::Request(ScopeEvent::started("req-1")))?;
//! let arena = registry.get(ScopeKind::Request, &req)?;
//! assert_eq!(*arena, PathBuf::from("/tmp/app/arena"));
//!
//! registry.dispatch(HostEvent::Request(ScopeEvent::ended("req-1")))?;
//! assert!(registry.get(ScopeKind::Request, &req).is_err());
//! # Ok::<(), tempscope_resource::Error>(())
//! ```

pub mod binder;
pub mod config;
pub mod error;
pub mod events;
pub mod provider;
pub mod registry;
pub mod scope;
pub mod session;
pub mod sink;
pub mod slot;
pub mod stats;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use binder::{RequestBinder, SingletonBinder};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{HostEvent, ScopeEvent, SessionEvent};
pub use provider::{DisposeError, Provider, ScopedProvider};
pub use registry::{Registry, RegistryBuilder};
pub use scope::{InstanceId, ScopeKind};
pub use session::{SessionArena, SessionBinder, SessionState};
pub use sink::{DiagnosticSink, TracingSink};
pub use slot::Slot;
pub use stats::{Stats, StatsSnapshot};
