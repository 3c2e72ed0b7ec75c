//! Filesystem-backed library: one JSON manifest per unit under a base directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::info;

use hatchery_core::{CoreError, UnitManifest};

use crate::artifact::ArtifactMaterializer;
use crate::unit::{ExecutableUnit, UnitFactory};

use super::{Library, RegistryError};

const MANIFEST_EXT: &str = "json";

pub struct FsLibrary {
    base_path: PathBuf,
    factory: UnitFactory,
    materializer: Arc<dyn ArtifactMaterializer>,
}

impl std::fmt::Debug for FsLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsLibrary")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

impl FsLibrary {
    /// Open a library rooted at `base_path`, creating the directory if needed.
    pub fn open(
        base_path: impl Into<PathBuf>,
        factory: UnitFactory,
        materializer: Arc<dyn ArtifactMaterializer>,
    ) -> Result<Self, RegistryError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)
            .map_err(|e| RegistryError::persistence("*", format!("{}: {e}", base_path.display())))?;
        Ok(Self {
            base_path,
            factory,
            materializer,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, CoreError> {
        let unsafe_name = name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', '\0']);
        if unsafe_name {
            return Err(CoreError::invalid_manifest(format!(
                "unit name '{name}' cannot be stored as a file"
            )));
        }
        Ok(self.base_path.join(format!("{name}.{MANIFEST_EXT}")))
    }
}

impl Library for FsLibrary {
    fn resolve(&self, name: &str) -> Result<Arc<dyn ExecutableUnit>, RegistryError> {
        let manifest = self.manifest(name)?;
        Ok(Arc::new(self.factory.build(&manifest)))
    }

    fn register(&self, manifest: &UnitManifest) -> Result<(), RegistryError> {
        manifest.validate()?;
        let path = self.path_for(&manifest.name)?;
        self.materializer
            .ensure(&manifest.image, manifest.auth.as_deref())?;

        let encoded = serde_json::to_vec_pretty(manifest)
            .map_err(|e| RegistryError::persistence(&manifest.name, e))?;
        // Each write gets its own temp file so concurrent registrations of
        // one name never rename each other's file away.
        let mut tmp = NamedTempFile::new_in(&self.base_path)
            .map_err(|e| RegistryError::persistence(&manifest.name, e))?;
        tmp.write_all(&encoded)
            .map_err(|e| RegistryError::persistence(&manifest.name, e))?;
        tmp.persist(&path)
            .map_err(|e| RegistryError::persistence(&manifest.name, e.error))?;

        info!(unit = %manifest.name, path = %path.display(), "unit registered");
        Ok(())
    }

    fn manifest(&self, name: &str) -> Result<UnitManifest, RegistryError> {
        // Names that could never have been stored simply do not exist.
        let Ok(path) = self.path_for(name) else {
            return Err(RegistryError::UnitNotFound(name.to_string()));
        };
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RegistryError::UnitNotFound(name.to_string()));
            }
            Err(e) => return Err(RegistryError::persistence(name, e)),
        };
        serde_json::from_slice(&raw).map_err(|e| RegistryError::CorruptManifest {
            unit: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn names(&self) -> Result<Vec<String>, RegistryError> {
        let entries =
            fs::read_dir(&self.base_path).map_err(|e| RegistryError::persistence("*", e))?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| RegistryError::persistence("*", e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
