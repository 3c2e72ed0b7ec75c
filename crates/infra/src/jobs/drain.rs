use std::sync::mpsc::Receiver;
use std::thread;

use tracing::{info, warn};

use super::RecurringJob;

/// Consumer threads for a job's result queues.
///
/// Errors are logged at `warn`, outputs at `info`. The threads exit once the
/// queues close, which happens after the job is dropped and its last
/// in-flight execution has delivered.
#[derive(Debug, Default)]
pub struct DrainHandle {
    threads: Vec<thread::JoinHandle<()>>,
}

impl DrainHandle {
    /// Take both queues from `job` and start draining them. Queues already
    /// taken by someone else are skipped.
    pub fn spawn(job: &RecurringJob) -> Self {
        let name = job.name().to_string();
        let mut threads = Vec::with_capacity(2);

        if let Some(errors) = job.take_errors() {
            let job_name = name.clone();
            push(&mut threads, format!("drain-err-{name}"), move || {
                drain(errors, |err| warn!(job = %job_name, error = %err, "recurring execution failed"))
            });
        }

        if let Some(output) = job.take_output() {
            let job_name = name.clone();
            push(&mut threads, format!("drain-out-{name}"), move || {
                drain(output, |bytes| {
                    info!(
                        job = %job_name,
                        output = %String::from_utf8_lossy(&bytes),
                        "recurring execution produced output"
                    )
                })
            });
        }

        Self { threads }
    }

    /// Wait for both drain threads to finish.
    pub fn join(self) {
        for t in self.threads {
            let _ = t.join();
        }
    }
}

fn push(threads: &mut Vec<thread::JoinHandle<()>>, name: String, f: impl FnOnce() + Send + 'static) {
    match thread::Builder::new().name(name.clone()).spawn(f) {
        Ok(handle) => threads.push(handle),
        Err(e) => warn!(thread = %name, error = %e, "failed to spawn drain thread"),
    }
}

fn drain<T>(rx: Receiver<T>, mut handle: impl FnMut(T)) {
    for item in rx {
        handle(item);
    }
}
