//! Runtime configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use hatchery_infra::OrchestratorConfig;
use hatchery_infra::jobs::{JobConfig, OverflowPolicy};
use hatchery_infra::unit::Credentials;

/// Value of `HATCHERY_HEAP_PATH` that selects the in-memory heap.
pub const IN_MEMORY_HEAP: &str = ":memory:";

#[derive(Debug, Error)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

impl ConfigError {
    fn new(var: &'static str, reason: impl Into<String>) -> Self {
        Self { var, reason: reason.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// `docker run` per execution, images pulled on registration.
    Docker,
    /// Commands run directly on the host; images are ignored.
    Host,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub bucket: String,
    pub heap_path: String,
    pub library_path: PathBuf,
    pub executor: ExecutorKind,
    pub exec_timeout: Option<Duration>,
    pub job: JobConfig,
    pub credentials: Credentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            bucket: "hatchery".to_string(),
            heap_path: "hatchery.db".to_string(),
            library_path: PathBuf::from("contracts"),
            executor: ExecutorKind::Docker,
            exec_timeout: None,
            job: JobConfig::default(),
            credentials: Credentials::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("HATCHERY_ADDR") {
            cfg.addr = v
                .parse()
                .map_err(|e| ConfigError::new("HATCHERY_ADDR", format!("{e}")))?;
        }
        if let Some(v) = lookup("HATCHERY_BUCKET") {
            cfg.bucket = v;
        }
        if let Some(v) = lookup("HATCHERY_HEAP_PATH") {
            cfg.heap_path = v;
        }
        if let Some(v) = lookup("HATCHERY_LIBRARY_PATH") {
            cfg.library_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("HATCHERY_EXECUTOR") {
            cfg.executor = match v.trim().to_ascii_lowercase().as_str() {
                "docker" => ExecutorKind::Docker,
                "host" => ExecutorKind::Host,
                other => {
                    return Err(ConfigError::new(
                        "HATCHERY_EXECUTOR",
                        format!("'{other}' (expected docker|host)"),
                    ));
                }
            };
        }
        if let Some(v) = lookup("HATCHERY_EXEC_TIMEOUT") {
            let timeout = humantime::parse_duration(v.trim())
                .map_err(|e| ConfigError::new("HATCHERY_EXEC_TIMEOUT", e.to_string()))?;
            cfg.exec_timeout = Some(timeout);
        }
        if let Some(v) = lookup("HATCHERY_JOB_BUFFER") {
            let buffer = v
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::new("HATCHERY_JOB_BUFFER", e.to_string()))?;
            cfg.job = cfg.job.with_buffer(buffer);
        }
        if let Some(v) = lookup("HATCHERY_JOB_OVERFLOW") {
            let overflow = v
                .parse::<OverflowPolicy>()
                .map_err(|e| ConfigError::new("HATCHERY_JOB_OVERFLOW", e))?;
            cfg.job = cfg.job.with_overflow(overflow);
        }

        cfg.credentials = Credentials {
            auth_key: secret(&lookup, "AUTH_KEY"),
            auth_key_id: secret(&lookup, "AUTH_KEY_ID"),
            chain_id: secret(&lookup, "DRAGONCHAIN_ID"),
        };

        Ok(cfg)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_bucket(self.bucket.clone())
            .with_job(self.job)
    }
}

fn secret(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> String {
    lookup(var).unwrap_or_else(|| {
        warn!(var, "credential not set; units will see an empty value");
        String::new()
    })
}
