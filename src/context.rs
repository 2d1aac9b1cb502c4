//! Explicit registry of per-test recorder configuration
//!
//! Tests register a configuration under an identifier and hold the returned
//! guard for as long as the configuration should be visible. Call sites look
//! the configuration up by the same identifier, so no ambient global state is
//! involved and tests running in parallel cannot see each other's setup.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::config::RecorderConfig;
use crate::recorder::{Recorder, RecorderBuilder};
use crate::{RecorderError, Result};

/// Identity of a test: its source file combined with its name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextId {
    file_path: String,
    test_name: String,
    value: String,
}

impl ContextId {
    /// Identifier for `test_name` declared in `file_path` (usually `file!()`)
    pub fn new(file_path: impl Into<String>, test_name: impl Into<String>) -> Self {
        let file_path = file_path.into();
        let test_name = test_name.into();
        let value = Path::new(&file_path)
            .join(&test_name)
            .to_string_lossy()
            .into_owned();
        Self {
            file_path,
            test_name,
            value,
        }
    }

    /// Combined identifier value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Cassette name used when the configuration does not set one:
    /// `<dir>/<file stem>Fixtures/<test name>/<client name>`
    #[must_use]
    pub fn default_interaction_name(&self, client_name: &str) -> String {
        let path = Path::new(&self.file_path);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut name = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
            .join(format!("{stem}Fixtures"))
            .join(&self.test_name);
        if !client_name.is_empty() {
            name = name.join(client_name);
        }
        name.to_string_lossy().replace('\\', "/")
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Concurrent identifier → configuration table with exclusive registration
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    contexts: Arc<DashMap<ContextId, Arc<RecorderConfig>>>,
}

impl ContextRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `config` under `id` until the returned guard is dropped
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::DuplicateContext`] if `id` is already registered
    pub fn register(&self, id: ContextId, config: RecorderConfig) -> Result<ContextGuard> {
        match self.contexts.entry(id.clone()) {
            Entry::Occupied(_) => Err(RecorderError::DuplicateContext {
                identifier: id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(config));
                debug!("Registered recorder context {}", id);
                Ok(ContextGuard {
                    contexts: Arc::clone(&self.contexts),
                    id,
                })
            }
        }
    }

    /// Configuration registered under `id`
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::ContextNotFound`] if nothing is registered
    pub fn lookup(&self, id: &ContextId) -> Result<Arc<RecorderConfig>> {
        self.contexts
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RecorderError::ContextNotFound {
                identifier: id.to_string(),
            })
    }

    /// Recorder builder for a client created while `id` is registered
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::ContextNotFound`] if nothing is registered
    pub fn recorder(&self, id: &ContextId, client_name: &str) -> Result<RecorderBuilder> {
        let config = self.lookup(id)?;
        let default_name = id.default_interaction_name(client_name);
        Ok(Recorder::from_config(default_name, &config))
    }

    /// Number of live registrations
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no registration is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// Keeps a registration alive; removes it on drop
#[derive(Debug)]
pub struct ContextGuard {
    contexts: Arc<DashMap<ContextId, Arc<RecorderConfig>>>,
    id: ContextId,
}

impl ContextGuard {
    /// The registered identifier
    #[must_use]
    pub fn id(&self) -> &ContextId {
        &self.id
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.contexts.remove(&self.id);
        debug!("Released recorder context {}", self.id);
    }
}
