//! Collaborator wiring: picks heap, executor and library backends from [`Config`].

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use hatchery_core::InMemoryLedger;
use hatchery_infra::Orchestrator;
use hatchery_infra::artifact::{ArtifactMaterializer, NoopMaterializer};
use hatchery_infra::heap::{Heap, HeapError, InMemoryHeap};
use hatchery_infra::library::{FsLibrary, Library, RegistryError};
use hatchery_infra::process::{DockerExecutor, DockerPuller, HostExecutor, ProcessExecutor};
use hatchery_infra::unit::UnitFactory;

use crate::config::{Config, ExecutorKind, IN_MEMORY_HEAP};

/// Orchestrator type served by the HTTP layer.
pub type AppOrchestrator = Orchestrator<InMemoryLedger, Arc<dyn Heap>, Arc<dyn Library>>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to open heap: {0}")]
    Heap(#[from] HeapError),

    #[error("failed to open library: {0}")]
    Library(#[from] RegistryError),

    #[error("heap path '{0}' requires the sqlite feature")]
    SqliteDisabled(String),
}

pub fn build_services(config: &Config) -> Result<Arc<AppOrchestrator>, ServiceError> {
    let heap = open_heap(&config.heap_path)?;

    let (executor, materializer): (Arc<dyn ProcessExecutor>, Arc<dyn ArtifactMaterializer>) =
        match config.executor {
            ExecutorKind::Docker => (Arc::new(DockerExecutor::new()), Arc::new(DockerPuller::new())),
            ExecutorKind::Host => (Arc::new(HostExecutor::new()), Arc::new(NoopMaterializer)),
        };

    let factory = UnitFactory::new(executor)
        .with_credentials(config.credentials.clone())
        .with_timeout(config.exec_timeout);
    let library: Arc<dyn Library> =
        Arc::new(FsLibrary::open(&config.library_path, factory, materializer)?);

    info!(
        heap = %config.heap_path,
        library = %config.library_path.display(),
        executor = ?config.executor,
        bucket = %config.bucket,
        "services wired"
    );

    Ok(Arc::new(Orchestrator::new(
        config.orchestrator(),
        InMemoryLedger::new(),
        heap,
        library,
    )))
}

fn open_heap(path: &str) -> Result<Arc<dyn Heap>, ServiceError> {
    if path == IN_MEMORY_HEAP {
        return Ok(Arc::new(InMemoryHeap::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        Ok(Arc::new(hatchery_infra::heap::SqliteHeap::open(path)?))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        Err(ServiceError::SqliteDisabled(path.to_string()))
    }
}
