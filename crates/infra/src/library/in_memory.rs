use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use hatchery_core::UnitManifest;

use crate::artifact::ArtifactMaterializer;
use crate::unit::{ExecutableUnit, UnitFactory};

use super::{Library, RegistryError};

/// In-memory library for tests/dev.
pub struct InMemoryLibrary {
    manifests: RwLock<HashMap<String, UnitManifest>>,
    factory: UnitFactory,
    materializer: Arc<dyn ArtifactMaterializer>,
}

impl InMemoryLibrary {
    pub fn new(factory: UnitFactory, materializer: Arc<dyn ArtifactMaterializer>) -> Self {
        Self {
            manifests: RwLock::new(HashMap::new()),
            factory,
            materializer,
        }
    }
}

impl Library for InMemoryLibrary {
    fn resolve(&self, name: &str) -> Result<Arc<dyn ExecutableUnit>, RegistryError> {
        let manifest = self.manifest(name)?;
        Ok(Arc::new(self.factory.build(&manifest)))
    }

    fn register(&self, manifest: &UnitManifest) -> Result<(), RegistryError> {
        manifest.validate()?;
        self.materializer
            .ensure(&manifest.image, manifest.auth.as_deref())?;

        let mut manifests = self
            .manifests
            .write()
            .map_err(|_| RegistryError::persistence(&manifest.name, "lock poisoned"))?;
        manifests.insert(manifest.name.clone(), manifest.clone());
        info!(unit = %manifest.name, image = %manifest.image, "unit registered");
        Ok(())
    }

    fn manifest(&self, name: &str) -> Result<UnitManifest, RegistryError> {
        let manifests = self
            .manifests
            .read()
            .map_err(|_| RegistryError::persistence(name, "lock poisoned"))?;
        manifests
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnitNotFound(name.to_string()))
    }

    fn names(&self) -> Result<Vec<String>, RegistryError> {
        let manifests = self
            .manifests
            .read()
            .map_err(|_| RegistryError::persistence("*", "lock poisoned"))?;
        let mut names: Vec<String> = manifests.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
