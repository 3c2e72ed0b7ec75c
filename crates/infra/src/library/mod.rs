//! Unit registry ("library"): resolves names to executable units and
//! records new manifests.

use std::sync::Arc;

use thiserror::Error;

use hatchery_core::{CoreError, UnitManifest};

use crate::artifact::MaterializeError;
use crate::unit::ExecutableUnit;

pub mod fs;
pub mod in_memory;

pub use fs::FsLibrary;
pub use in_memory::InMemoryLibrary;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unit '{0}' does not exist")]
    UnitNotFound(String),

    #[error(transparent)]
    InvalidManifest(#[from] CoreError),

    #[error(transparent)]
    ArtifactUnavailable(#[from] MaterializeError),

    #[error("failed to persist manifest for '{unit}': {reason}")]
    PersistenceFailure { unit: String, reason: String },

    #[error("stored manifest for '{unit}' is unreadable: {reason}")]
    CorruptManifest { unit: String, reason: String },
}

impl RegistryError {
    pub fn persistence(unit: &str, reason: impl std::fmt::Display) -> Self {
        Self::PersistenceFailure {
            unit: unit.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Collection of registered units.
///
/// Resolution is side-effect free; registration materializes the artifact
/// and then records the manifest, overwriting any previous one of the same name.
pub trait Library: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<dyn ExecutableUnit>, RegistryError>;

    fn register(&self, manifest: &UnitManifest) -> Result<(), RegistryError>;

    fn manifest(&self, name: &str) -> Result<UnitManifest, RegistryError>;

    /// Registered unit names, sorted.
    fn names(&self) -> Result<Vec<String>, RegistryError>;
}

impl<S> Library for Arc<S>
where
    S: Library + ?Sized,
{
    fn resolve(&self, name: &str) -> Result<Arc<dyn ExecutableUnit>, RegistryError> {
        (**self).resolve(name)
    }

    fn register(&self, manifest: &UnitManifest) -> Result<(), RegistryError> {
        (**self).register(manifest)
    }

    fn manifest(&self, name: &str) -> Result<UnitManifest, RegistryError> {
        (**self).manifest(name)
    }

    fn names(&self) -> Result<Vec<String>, RegistryError> {
        (**self).names()
    }
}
