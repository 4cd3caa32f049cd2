//! Release persistence.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::StoreError;
use crate::release::Release;

/// Storage for the current release of each repository.
pub trait ReleaseStore: Send + Sync {
    /// Returns the current release of `repository`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find(&self, repository: &str) -> Result<Option<Release>, StoreError>;

    /// Stores `release` as the current release of its repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn save(&self, release: Release) -> Result<(), StoreError>;
}

/// A process-local store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    releases: RwLock<HashMap<String, Release>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReleaseStore for InMemoryStore {
    fn find(&self, repository: &str) -> Result<Option<Release>, StoreError> {
        let releases = self.releases.read().unwrap_or_else(PoisonError::into_inner);
        Ok(releases.get(repository).cloned())
    }

    fn save(&self, release: Release) -> Result<(), StoreError> {
        let mut releases = self.releases.write().unwrap_or_else(PoisonError::into_inner);
        releases.insert(release.repository.clone(), release);
        Ok(())
    }
}
