//! Executable units: named programs that consume a payload and produce output.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use hatchery_core::UnitManifest;

use crate::process::{ExecError, LaunchSpec, ProcessExecutor, ProcessHandle};

/// Environment keys injected into every unit.
pub const ENV_UNIT_NAME: &str = "SMART_CONTRACT_NAME";
pub const ENV_AUTH_KEY: &str = "AUTH_KEY";
pub const ENV_AUTH_KEY_ID: &str = "AUTH_KEY_ID";
pub const ENV_CHAIN_ID: &str = "DRAGONCHAIN_ID";

const WAIT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum UnitError {
    #[error("execution of unit '{unit}' failed: {source}")]
    ExecutionFailure {
        unit: String,
        #[source]
        source: ExecError,
    },
}

impl UnitError {
    pub fn failed(unit: impl Into<String>, source: ExecError) -> Self {
        Self::ExecutionFailure {
            unit: unit.into(),
            source,
        }
    }

    pub fn unit(&self) -> &str {
        match self {
            UnitError::ExecutionFailure { unit, .. } => unit,
        }
    }
}

/// A named, runnable unit.
pub trait ExecutableUnit: Send + Sync {
    fn name(&self) -> &str;

    /// Run the unit once with `payload` on its input and return everything it wrote to its output.
    fn execute(&self, payload: &[u8]) -> Result<Vec<u8>, UnitError>;
}

/// Credentials handed to every unit through its environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub auth_key: String,
    pub auth_key_id: String,
    pub chain_id: String,
}

/// Unit backed by a [`ProcessExecutor`].
pub struct ContainerUnit {
    name: String,
    spec: LaunchSpec,
    executor: Arc<dyn ProcessExecutor>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for ContainerUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerUnit")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ContainerUnit {
    pub fn new(name: impl Into<String>, spec: LaunchSpec, executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            name: name.into(),
            spec,
            executor,
            timeout: None,
        }
    }

    /// Kill the process and fail with `Timeout` if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    fn drive(&self, handle: &mut dyn ProcessHandle, payload: &[u8]) -> Result<Vec<u8>, ExecError> {
        // The deadline covers the whole exchange, including a blocked write.
        let deadline = self
            .timeout
            .and_then(|timeout| Some((timeout, Instant::now().checked_add(timeout)?)));

        let stdout = spawn_reader("stdout", handle.take_stdout())?;
        let stderr = spawn_reader("stderr", handle.take_stderr())?;
        let stdin = handle
            .take_stdin()
            .ok_or_else(|| ExecError::io("opening stdin", io::ErrorKind::BrokenPipe.into()))?;
        let writer = spawn_writer(stdin, payload.to_vec())?;

        let status = match deadline {
            Some((timeout, at)) => wait_with_deadline(handle, timeout, at)?,
            None => handle.wait()?,
        };

        join_writer(writer)?;
        let output = join_reader(stdout)?;
        if !status.success() {
            let stderr = join_reader(stderr).unwrap_or_default();
            return Err(ExecError::Exit {
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl ExecutableUnit for ContainerUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, payload: &[u8]) -> Result<Vec<u8>, UnitError> {
        let mut handle = self
            .executor
            .launch(&self.spec)
            .map_err(|e| UnitError::failed(&self.name, e))?;

        let result = self.drive(handle.as_mut(), payload);
        if result.is_err() {
            let _ = handle.kill();
        }
        let output = result.map_err(|e| UnitError::failed(&self.name, e))?;
        debug!(unit = %self.name, bytes = output.len(), "unit executed");
        Ok(output)
    }
}

type Reader = Option<JoinHandle<io::Result<Vec<u8>>>>;

fn spawn_reader(stream: &'static str, source: Option<Box<dyn Read + Send>>) -> Result<Reader, ExecError> {
    let Some(mut source) = source else {
        return Ok(None);
    };
    thread::Builder::new()
        .name(format!("unit-{stream}"))
        .spawn(move || {
            let mut buf = Vec::new();
            source.read_to_end(&mut buf).map(|_| buf)
        })
        .map(Some)
        .map_err(|e| ExecError::io("spawning stream reader", e))
}

fn join_reader(reader: Reader) -> Result<Vec<u8>, ExecError> {
    match reader {
        None => Ok(Vec::new()),
        Some(join) => join
            .join()
            .map_err(|_| ExecError::io("reading output", io::Error::other("reader panicked")))?
            .map_err(|e| ExecError::io("reading output", e)),
    }
}

/// Writes the payload and closes the input stream when done.
fn spawn_writer(mut stdin: Box<dyn Write + Send>, payload: Vec<u8>) -> Result<JoinHandle<io::Result<()>>, ExecError> {
    thread::Builder::new()
        .name("unit-stdin".to_string())
        .spawn(move || match stdin.write_all(&payload) {
            // The process exited or closed its input without reading it.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        })
        .map_err(|e| ExecError::io("spawning stdin writer", e))
}

fn join_writer(writer: JoinHandle<io::Result<()>>) -> Result<(), ExecError> {
    writer
        .join()
        .map_err(|_| ExecError::io("writing stdin", io::Error::other("writer panicked")))?
        .map_err(|e| ExecError::io("writing stdin", e))
}

fn wait_with_deadline(
    handle: &mut dyn ProcessHandle,
    timeout: Duration,
    deadline: Instant,
) -> Result<crate::process::ProcessExit, ExecError> {
    loop {
        if let Some(status) = handle.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            handle.kill()?;
            let _ = handle.wait();
            return Err(ExecError::Timeout(timeout));
        }
        thread::sleep(WAIT_POLL);
    }
}

/// Builds [`ContainerUnit`]s from manifests, injecting credentials.
#[derive(Clone)]
pub struct UnitFactory {
    executor: Arc<dyn ProcessExecutor>,
    credentials: Credentials,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for UnitFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitFactory")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl UnitFactory {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            executor,
            credentials: Credentials::default(),
            timeout: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Environment for `manifest`: injected keys first, manifest entries override.
    pub fn environment(&self, manifest: &UnitManifest) -> BTreeMap<String, String> {
        let mut env = BTreeMap::from([
            (ENV_UNIT_NAME.to_string(), manifest.name.clone()),
            (ENV_AUTH_KEY.to_string(), self.credentials.auth_key.clone()),
            (ENV_AUTH_KEY_ID.to_string(), self.credentials.auth_key_id.clone()),
            (ENV_CHAIN_ID.to_string(), self.credentials.chain_id.clone()),
        ]);
        env.extend(manifest.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    pub fn build(&self, manifest: &UnitManifest) -> ContainerUnit {
        let spec = LaunchSpec {
            image: manifest.image.clone(),
            command: manifest.cmd.clone(),
            args: manifest.args.clone(),
            env: self.environment(manifest),
        };
        ContainerUnit::new(manifest.name.clone(), spec, self.executor.clone()).with_timeout(self.timeout)
    }
}
