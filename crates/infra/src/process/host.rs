use std::process::Command;

use super::{ChildHandle, ExecError, LaunchSpec, ProcessExecutor, ProcessHandle};

/// Runs the unit's command directly on the host, ignoring the image.
///
/// Meant for development machines without a container runtime and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostExecutor;

impl HostExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessExecutor for HostExecutor {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>, ExecError> {
        if spec.command.trim().is_empty() {
            return Err(ExecError::Launch {
                program: String::new(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "host execution requires a command",
                ),
            });
        }

        let mut command = Command::new(&spec.command);
        command.args(&spec.args).envs(&spec.env);
        Ok(Box::new(ChildHandle::spawn(command)?))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn pipes_stdin_to_stdout() {
        let spec = LaunchSpec {
            command: "cat".to_string(),
            ..LaunchSpec::default()
        };
        let mut handle = HostExecutor::new().launch(&spec).unwrap();

        let mut stdin = handle.take_stdin().unwrap();
        stdin.write_all(b"hello").unwrap();
        drop(stdin);

        let mut out = String::new();
        handle.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
        assert!(handle.wait().unwrap().success());
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let spec = LaunchSpec {
            command: "/definitely/not/here".to_string(),
            ..LaunchSpec::default()
        };
        assert!(matches!(
            HostExecutor::new().launch(&spec),
            Err(ExecError::Launch { .. })
        ));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            HostExecutor::new().launch(&LaunchSpec::default()),
            Err(ExecError::Launch { .. })
        ));
    }
}
