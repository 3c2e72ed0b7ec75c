//! Transaction pipeline and recurring-job table.
//!
//! The [`Orchestrator`] owns the ledger, the heap and the library. A
//! submission resolves a unit, runs it, spreads the fields of its JSON
//! output into the heap and appends the raw output to the ledger.
//! Registering a manifest with a `cron` interval also schedules the unit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use thiserror::Error;
use tracing::{debug, info, warn};

use hatchery_core::{CoreError, Ledger, Schedule, Transaction, TransactionId, UnitManifest};

use crate::artifact::MaterializeError;
use crate::heap::{Heap, HeapError};
use crate::jobs::{DrainHandle, JobConfig, JobError, JobStats, RecurringJob};
use crate::library::{Library, RegistryError};
use crate::unit::UnitError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unit '{0}' does not exist")]
    UnitNotFound(String),

    #[error(transparent)]
    InvalidManifest(CoreError),

    #[error(transparent)]
    ArtifactUnavailable(MaterializeError),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error(transparent)]
    ExecutionFailure(UnitError),

    #[error("transaction {0} does not exist")]
    TransactionNotFound(TransactionId),

    #[error("no value for key '{key}' in bucket '{bucket}'")]
    KeyNotFound { bucket: String, key: String },

    #[error("heap storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("failed to start recurring job for '{unit}': {reason}")]
    JobStart { unit: String, reason: String },
}

impl From<RegistryError> for OrchestratorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnitNotFound(name) => Self::UnitNotFound(name),
            RegistryError::InvalidManifest(e) => Self::InvalidManifest(e),
            RegistryError::ArtifactUnavailable(e) => Self::ArtifactUnavailable(e),
            e @ (RegistryError::PersistenceFailure { .. } | RegistryError::CorruptManifest { .. }) => {
                Self::PersistenceFailure(e.to_string())
            }
        }
    }
}

impl From<CoreError> for OrchestratorError {
    fn from(err: CoreError) -> Self {
        Self::InvalidManifest(err)
    }
}

impl From<UnitError> for OrchestratorError {
    fn from(err: UnitError) -> Self {
        Self::ExecutionFailure(err)
    }
}

impl From<HeapError> for OrchestratorError {
    fn from(err: HeapError) -> Self {
        match err {
            HeapError::KeyNotFound { bucket, key } => Self::KeyNotFound { bucket, key },
            HeapError::Storage(reason) => Self::Storage(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Heap partition that derived state is written to.
    pub bucket: String,
    pub job: JobConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bucket: "hatchery".to_string(),
            job: JobConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_job(mut self, job: JobConfig) -> Self {
        self.job = job;
        self
    }
}

/// Result of a heap lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateQuery {
    All(BTreeMap<String, Vec<u8>>),
    One(Vec<u8>),
}

/// Owns the ledger, heap and library, and the table of scheduled units.
pub struct Orchestrator<L, H, R> {
    config: OrchestratorConfig,
    ledger: L,
    heap: H,
    library: R,
    jobs: Mutex<HashMap<String, Arc<RecurringJob>>>,
}

impl<L, H, R> Orchestrator<L, H, R>
where
    L: Ledger,
    H: Heap,
    R: Library,
{
    pub fn new(config: OrchestratorConfig, ledger: L, heap: H, library: R) -> Self {
        Self {
            config,
            ledger,
            heap,
            library,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn heap(&self) -> &H {
        &self.heap
    }

    pub fn library(&self) -> &R {
        &self.library
    }

    /// Run `unit` with `payload`, persist its derived state and append the
    /// output to the ledger.
    ///
    /// Nothing is appended when resolution or execution fails.
    pub fn submit(&self, unit: &str, payload: &[u8]) -> Result<Transaction, OrchestratorError> {
        let executable = self.library.resolve(unit)?;
        let output = executable.execute(payload)?;

        let fields = self.persist_derived_state(unit, &output);

        let txn = Transaction::new(output);
        self.ledger.append(txn.clone());
        info!(
            unit,
            txn_id = %txn.id(),
            bytes = txn.content().len(),
            fields,
            "transaction appended"
        );
        Ok(txn)
    }

    /// Append `payload` as a transaction without running anything.
    pub fn post_raw(&self, payload: &[u8]) -> Transaction {
        let txn = Transaction::new(payload);
        self.ledger.append(txn.clone());
        info!(txn_id = %txn.id(), bytes = payload.len(), "raw transaction appended");
        txn
    }

    /// Write each top-level field of a JSON object output into the heap.
    ///
    /// Values are stored as their JSON text. Output that is not a JSON object
    /// is skipped, and a failed write only skips that field. Returns the
    /// number of fields written.
    fn persist_derived_state(&self, unit: &str, output: &[u8]) -> usize {
        let fields: serde_json::Map<String, serde_json::Value> = match serde_json::from_slice(output) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(unit, error = %e, "unit output is not a JSON object; skipping heap update");
                return 0;
            }
        };

        let bucket = &self.config.bucket;
        let mut written = 0;
        for (key, value) in &fields {
            let encoded = value.to_string();
            match self.heap.put(bucket, key, encoded.as_bytes()) {
                Ok(()) => written += 1,
                Err(e) => warn!(unit, bucket = %bucket, key = %key, error = %e, "heap write failed"),
            }
        }
        debug!(unit, bucket = %bucket, written, "derived state persisted");
        written
    }

    /// Record `manifest` in the library and (re)schedule it.
    ///
    /// A unit already in the job table is stopped and replaced. A manifest
    /// without a `cron` interval removes any existing schedule.
    pub fn register_unit(&self, manifest: &UnitManifest) -> Result<(), OrchestratorError> {
        let schedule = manifest.schedule()?;
        self.library.register(manifest)?;

        let mut jobs = self.jobs();
        if let Some(previous) = jobs.remove(&manifest.name) {
            previous.stop();
            info!(unit = %manifest.name, "stopped previous recurring job");
        }

        let Some(schedule) = schedule else {
            return Ok(());
        };

        let job = self.start_job(&manifest.name, schedule)?;
        jobs.insert(manifest.name.clone(), job);
        Ok(())
    }

    fn start_job(&self, name: &str, schedule: Schedule) -> Result<Arc<RecurringJob>, OrchestratorError> {
        let unit = self.library.resolve(name)?;
        let job = Arc::new(RecurringJob::new(name, schedule, unit, self.config.job));

        // Drains must be consuming before the first tick can fire.
        let _drains = DrainHandle::spawn(&job);

        let runner = Arc::clone(&job);
        thread::Builder::new()
            .name(format!("cron-{name}"))
            .spawn(move || {
                if let Err(e) = runner.run() {
                    debug!(job = %runner.name(), error = %e, "recurring job did not start");
                }
            })
            .map_err(|e| {
                job.stop();
                OrchestratorError::JobStart {
                    unit: name.to_string(),
                    reason: e.to_string(),
                }
            })?;

        info!(unit = name, interval = %schedule, "unit scheduled");
        Ok(job)
    }

    /// Look up a transaction by id.
    pub fn transaction(&self, id: TransactionId) -> Result<Transaction, OrchestratorError> {
        self.ledger
            .find(id)
            .ok_or(OrchestratorError::TransactionNotFound(id))
    }

    /// The earliest transaction in the ledger.
    pub fn head(&self) -> Option<Transaction> {
        self.ledger.head()
    }

    /// Read one key, or the whole bucket when `key` is `None`.
    pub fn query_state(&self, bucket: &str, key: Option<&str>) -> Result<StateQuery, OrchestratorError> {
        Ok(match key {
            Some(key) => StateQuery::One(self.heap.get(bucket, key)?),
            None => StateQuery::All(self.heap.get_all(bucket)?),
        })
    }
}

impl<L, H, R> Orchestrator<L, H, R> {
    fn jobs(&self) -> MutexGuard<'_, HashMap<String, Arc<RecurringJob>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Names of currently scheduled units, sorted.
    pub fn scheduled_units(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn job(&self, unit: &str) -> Option<Arc<RecurringJob>> {
        self.jobs().get(unit).cloned()
    }

    pub fn job_stats(&self) -> BTreeMap<String, JobStats> {
        self.jobs()
            .iter()
            .map(|(name, job)| (name.clone(), job.stats()))
            .collect()
    }

    /// Stop and forget the job for `unit`. Returns whether one existed.
    pub fn stop_unit(&self, unit: &str) -> bool {
        match self.jobs().remove(unit) {
            Some(job) => {
                job.stop();
                info!(unit, "recurring job stopped");
                true
            }
            None => false,
        }
    }

    /// Stop every scheduled job. In-flight executions are not awaited.
    pub fn shutdown(&self) {
        let mut jobs = self.jobs();
        let count = jobs.len();
        for (_, job) in jobs.drain() {
            job.stop();
        }
        info!(jobs = count, "orchestrator shut down");
    }
}

impl<L, H, R> Drop for Orchestrator<L, H, R> {
    fn drop(&mut self) {
        for job in self.jobs().values() {
            job.stop();
        }
    }
}
