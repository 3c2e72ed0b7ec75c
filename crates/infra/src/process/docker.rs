//! Docker CLI adapters: `docker run` for execution, `docker pull` for materialization.

use std::io::{Read, Write};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifact::{ArtifactMaterializer, MaterializeError};

use super::{ChildHandle, ExecError, LaunchSpec, ProcessExecutor, ProcessExit, ProcessHandle};

const DEFAULT_BINARY: &str = "docker";

/// Executes units as `docker run -i --rm` containers.
#[derive(Debug, Clone)]
pub struct DockerExecutor {
    binary: String,
}

impl Default for DockerExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerExecutor {
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
        }
    }

    /// Use a different CLI binary (e.g. `podman`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Arguments passed to the CLI for `spec`, running it as `container`.
    pub fn run_args(spec: &LaunchSpec, container: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-i".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container.to_string(),
        ];
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(spec.image.clone());
        if !spec.command.is_empty() {
            args.push(spec.command.clone());
        }
        args.extend(spec.args.iter().cloned());
        args
    }
}

impl ProcessExecutor for DockerExecutor {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>, ExecError> {
        let container = format!("hatchery-{}", Uuid::now_v7().simple());
        let mut command = Command::new(&self.binary);
        command.args(Self::run_args(spec, &container));
        debug!(image = %spec.image, command = %spec.command, container = %container, "launching container");

        Ok(Box::new(ContainerHandle {
            client: ChildHandle::spawn(command)?,
            binary: self.binary.clone(),
            container,
        }))
    }
}

/// A `docker run` client plus the name of the container it started.
///
/// Killing the client alone leaves the container running, so `kill` also
/// removes the container by name.
#[derive(Debug)]
struct ContainerHandle {
    client: ChildHandle,
    binary: String,
    container: String,
}

impl ProcessHandle for ContainerHandle {
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        self.client.take_stdin()
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.client.take_stdout()
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.client.take_stderr()
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>, ExecError> {
        self.client.try_wait()
    }

    fn wait(&mut self) -> Result<ProcessExit, ExecError> {
        self.client.wait()
    }

    fn kill(&mut self) -> Result<(), ExecError> {
        let killed = Command::new(&self.binary)
            .args(["kill", &self.container])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match killed {
            Ok(status) if status.success() => debug!(container = %self.container, "container killed"),
            // Already exited and removed.
            Ok(status) => debug!(container = %self.container, %status, "container not killed"),
            Err(e) => warn!(container = %self.container, error = %e, "failed to run container kill"),
        }
        self.client.kill()
    }
}

/// Materializes images with `docker pull`, logging in first when the
/// manifest carries a `user:token` credential.
#[derive(Debug, Clone)]
pub struct DockerPuller {
    binary: String,
}

impl Default for DockerPuller {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerPuller {
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn login(&self, image: &str, auth: &str) -> Result<(), MaterializeError> {
        let (user, token) = auth
            .split_once(':')
            .ok_or_else(|| MaterializeError::unavailable(image, "auth must be 'user:token'"))?;

        let mut command = Command::new(&self.binary);
        command.args(["login", "--username", user, "--password-stdin"]);
        if let Some(host) = registry_host(image) {
            command.arg(host);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MaterializeError::unavailable(image, format!("login failed: {e}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(token.as_bytes())
                .map_err(|e| MaterializeError::unavailable(image, format!("login failed: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| MaterializeError::unavailable(image, format!("login failed: {e}")))?;
        if !output.status.success() {
            return Err(MaterializeError::unavailable(
                image,
                format!("login failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
            ));
        }
        Ok(())
    }
}

impl ArtifactMaterializer for DockerPuller {
    fn ensure(&self, image: &str, auth: Option<&str>) -> Result<(), MaterializeError> {
        if let Some(auth) = auth {
            self.login(image, auth)?;
        }

        let output = Command::new(&self.binary)
            .args(["pull", image])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| MaterializeError::unavailable(image, e.to_string()))?;
        if !output.status.success() {
            return Err(MaterializeError::unavailable(
                image,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        info!(image, "image pulled");
        Ok(())
    }
}

/// Registry host of an image reference, when it names one explicitly
/// (`registry.example.com/team/app:1` → `registry.example.com`).
fn registry_host(image: &str) -> Option<&str> {
    let (first, _rest) = image.split_once('/')?;
    if first.contains('.') || first.contains(':') || first == "localhost" {
        Some(first)
    } else {
        None
    }
}
