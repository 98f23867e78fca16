//! Deployment configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scope::ScopeKind;

/// Which scopes get an arena, and where arenas live by default.
///
/// Every field has a default, so `{}` is a valid configuration binding all
/// three scopes under the system temp directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory for arenas whose host event names none.
    pub temp_dir: PathBuf,
    /// Bind an arena to the process run.
    pub singleton: bool,
    /// Bind an arena to each request.
    pub request: bool,
    /// Bind an arena to each session.
    pub session: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            singleton: true,
            request: true,
            session: true,
        }
    }
}

impl Config {
    /// Parse and validate a JSON configuration blob.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = match serde_json::from_str(json) {
            Ok(config) => config,
            Err(e) => {
                return Err(Error::Configuration {
                    message: "invalid arena configuration".to_string(),
                    source: Some(Box::new(e)),
                });
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.temp_dir.as_os_str().is_empty() {
            return Err(Error::configuration("temp_dir must not be empty"));
        }
        if self.enabled_scopes().is_empty() {
            return Err(Error::configuration("no scope is bound"));
        }
        Ok(())
    }

    /// Scope kinds with binding enabled, broadest first.
    #[must_use]
    pub fn enabled_scopes(&self) -> Vec<ScopeKind> {
        ScopeKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                ScopeKind::Singleton => self.singleton,
                ScopeKind::Session => self.session,
                ScopeKind::Request => self.request,
            })
            .collect()
    }
}
