//! Process executor boundary.
//!
//! An executor launches a runnable artifact with a command, arguments and
//! environment and hands back a [`ProcessHandle`] exposing its standard
//! streams. Units drive the handle; executors only know how to start things.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use thiserror::Error;

pub mod docker;
pub mod host;

pub use docker::{DockerExecutor, DockerPuller};
pub use host::HostExecutor;

/// Everything needed to start one execution of a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    pub image: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Process exit status, independent of the platform representation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl std::fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("termination by signal"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("process io failed while {stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("process failed with {status}: {stderr}")]
    Exit { status: ProcessExit, stderr: String },

    #[error("process did not finish within {0:?}")]
    Timeout(Duration),
}

impl ExecError {
    pub fn io(stage: &'static str, source: io::Error) -> Self {
        Self::Io { stage, source }
    }
}

/// Live process started by a [`ProcessExecutor`].
///
/// Each stream can be taken once; dropping the input stream signals
/// end-of-input to the process.
pub trait ProcessHandle: Send {
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>>;
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>>;
    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> Result<Option<ProcessExit>, ExecError>;

    /// Block until the process exits.
    fn wait(&mut self) -> Result<ProcessExit, ExecError>;

    fn kill(&mut self) -> Result<(), ExecError>;
}

/// Launches runnable artifacts.
pub trait ProcessExecutor: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>, ExecError>;
}

/// [`ProcessHandle`] over a local child process.
#[derive(Debug)]
pub struct ChildHandle {
    child: Child,
}

impl ChildHandle {
    /// Spawn `command` with all three standard streams piped.
    pub fn spawn(mut command: Command) -> Result<Self, ExecError> {
        let program = command.get_program().to_string_lossy().into_owned();
        let child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Launch { program, source })?;
        Ok(Self { child })
    }
}

fn exit_of(status: std::process::ExitStatus) -> ProcessExit {
    ProcessExit {
        code: status.code(),
    }
}

impl ProcessHandle for ChildHandle {
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        self.child
            .stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn Write + Send>)
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>, ExecError> {
        self.child
            .try_wait()
            .map(|status| status.map(exit_of))
            .map_err(|e| ExecError::io("polling for exit", e))
    }

    fn wait(&mut self) -> Result<ProcessExit, ExecError> {
        self.child
            .wait()
            .map(exit_of)
            .map_err(|e| ExecError::io("waiting for exit", e))
    }

    fn kill(&mut self) -> Result<(), ExecError> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            // Already exited.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(ExecError::io("killing process", e)),
        }
    }
}
