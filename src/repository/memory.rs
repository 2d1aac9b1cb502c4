//! In-memory repository

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::InteractionRepository;
use crate::message::Interaction;
use crate::{RecorderError, Result};

/// Keeps cassettes in a concurrent map; nothing touches the disk
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    cassettes: DashMap<String, Interaction>,
    stores: AtomicUsize,
}

impl InMemoryRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored cassette
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Interaction> {
        self.cassettes.get(name).map(|entry| entry.value().clone())
    }

    /// Seed a cassette without counting it as a store
    pub fn insert(&self, interaction: Interaction) {
        self.cassettes
            .insert(interaction.name().to_string(), interaction);
    }

    /// Number of `store` calls so far
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InteractionRepository for InMemoryRepository {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.cassettes.contains_key(name))
    }

    async fn load(&self, name: &str) -> Result<Interaction> {
        self.get(name).ok_or_else(|| RecorderError::StorageMissing {
            name: name.to_string(),
        })
    }

    async fn store(&self, interaction: &Interaction) -> Result<()> {
        self.cassettes
            .insert(interaction.name().to_string(), interaction.clone());
        self.stores.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
