//! Durable cassette storage
//!
//! Repositories are keyed by logical cassette name only. How a name maps to a
//! physical location is up to each implementation.

mod file;
pub mod har;
mod memory;

pub use file::HarFileRepository;
pub use memory::InMemoryRepository;

use async_trait::async_trait;

use crate::message::Interaction;
use crate::{RecorderError, Result};

/// Maximum cassette name length in bytes
pub const MAX_NAME_LEN: usize = 1024;

/// Persists and loads interactions by name
#[async_trait]
pub trait InteractionRepository: Send + Sync + std::fmt::Debug {
    /// Whether a cassette with this name exists
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be queried
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Load the named cassette
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::StorageMissing`] if it does not exist and
    /// [`RecorderError::StorageCorrupt`] if it cannot be parsed
    async fn load(&self, name: &str) -> Result<Interaction>;

    /// Replace the cassette named after `interaction` with its full contents
    ///
    /// # Errors
    ///
    /// Returns error if the cassette cannot be written
    async fn store(&self, interaction: &Interaction) -> Result<()>;
}

/// Validate a cassette name
///
/// Names may contain `/` to address nested fixture folders but must stay
/// relative and free of `..` segments.
///
/// # Errors
///
/// Returns error if the name is empty, too long, absolute, or escapes the root
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RecorderError::InvalidName(
            "Cassette name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(RecorderError::InvalidName(format!(
            "Cassette name too long: {} > {MAX_NAME_LEN}",
            name.len()
        )));
    }

    if name.contains('\0') {
        return Err(RecorderError::InvalidName(
            "Cassette name cannot contain null bytes".to_string(),
        ));
    }

    if name.starts_with('/') || name.starts_with('\\') || name.get(1..2) == Some(":") {
        return Err(RecorderError::InvalidName(format!(
            "Cassette name must be relative: {name}"
        )));
    }

    if name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(RecorderError::InvalidName(format!(
            "Cassette name cannot contain '..': {name}"
        )));
    }

    Ok(())
}
