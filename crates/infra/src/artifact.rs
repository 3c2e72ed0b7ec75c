//! Artifact materialization: making sure a unit's runnable image exists
//! locally before its manifest is accepted.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("artifact '{image}' unavailable: {reason}")]
    Unavailable { image: String, reason: String },
}

impl MaterializeError {
    pub fn unavailable(image: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            image: image.to_string(),
            reason: reason.into(),
        }
    }
}

pub trait ArtifactMaterializer: Send + Sync {
    /// Pull or otherwise validate `image`. `auth` is the manifest's optional
    /// registry credential.
    fn ensure(&self, image: &str, auth: Option<&str>) -> Result<(), MaterializeError>;
}

impl<S> ArtifactMaterializer for Arc<S>
where
    S: ArtifactMaterializer + ?Sized,
{
    fn ensure(&self, image: &str, auth: Option<&str>) -> Result<(), MaterializeError> {
        (**self).ensure(image, auth)
    }
}

/// Accepts every artifact. Pairs with the host executor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMaterializer;

impl ArtifactMaterializer for NoopMaterializer {
    fn ensure(&self, _image: &str, _auth: Option<&str>) -> Result<(), MaterializeError> {
        Ok(())
    }
}
