use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use hatchery_core::Schedule;

use crate::unit::{ExecutableUnit, UnitError};

use super::{JobConfig, JobError, JobStats, OverflowPolicy};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    in_flight: AtomicU64,
}

/// State shared with tick threads. The queues close once the job and every
/// tick thread holding a clone of this have gone away.
struct Shared {
    name: String,
    unit: Arc<dyn ExecutableUnit>,
    overflow: OverflowPolicy,
    errors_tx: SyncSender<UnitError>,
    output_tx: SyncSender<Vec<u8>>,
    counters: Counters,
}

/// Executes one unit on a fixed interval until stopped.
///
/// Lifecycle is `Idle -> Running -> Stopped`; a stopped job is never
/// restarted in place.
pub struct RecurringJob {
    schedule: Schedule,
    state: AtomicU8,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: Mutex<Receiver<()>>,
    errors_rx: Mutex<Option<Receiver<UnitError>>>,
    output_rx: Mutex<Option<Receiver<Vec<u8>>>>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RecurringJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurringJob")
            .field("name", &self.shared.name)
            .field("schedule", &self.schedule)
            .field("state", &self.state.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl RecurringJob {
    pub fn new(
        name: impl Into<String>,
        schedule: Schedule,
        unit: Arc<dyn ExecutableUnit>,
        config: JobConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let (errors_tx, errors_rx) = mpsc::sync_channel(config.buffer);
        let (output_tx, output_rx) = mpsc::sync_channel(config.buffer);

        Self {
            schedule,
            state: AtomicU8::new(IDLE),
            shutdown_tx,
            shutdown_rx: Mutex::new(shutdown_rx),
            errors_rx: Mutex::new(Some(errors_rx)),
            output_rx: Mutex::new(Some(output_rx)),
            shared: Arc::new(Shared {
                name: name.into(),
                unit,
                overflow: config.overflow,
                errors_tx,
                output_tx,
                counters: Counters::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Take the error queue. Only the first caller receives it.
    pub fn take_errors(&self) -> Option<Receiver<UnitError>> {
        self.errors_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Take the output queue. Only the first caller receives it.
    pub fn take_output(&self) -> Option<Receiver<Vec<u8>>> {
        self.output_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RUNNING
    }

    /// Fire the unit every interval, blocking the caller until [`stop`](Self::stop).
    ///
    /// Ticks keep a fixed cadence measured from the start of the run and are
    /// never serialized against each other.
    pub fn run(&self) -> Result<(), JobError> {
        if let Err(current) =
            self.state
                .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
        {
            return Err(if current == RUNNING {
                JobError::AlreadyRunning
            } else {
                JobError::Stopped
            });
        }

        let shutdown_rx = self
            .shutdown_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let interval = self.schedule.interval();
        let mut next = Instant::now().checked_add(interval);

        info!(job = %self.shared.name, interval = %self.schedule, "recurring job started");

        loop {
            let Some(deadline) = next else {
                warn!(job = %self.shared.name, "next tick is beyond the clock range; stopping");
                self.state.store(STOPPED, Ordering::SeqCst);
                break;
            };
            let wait = deadline.saturating_duration_since(Instant::now());
            match shutdown_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if !self.is_running() {
                break;
            }

            self.tick();
            next = deadline.checked_add(interval);
        }

        info!(job = %self.shared.name, "recurring job stopped");
        Ok(())
    }

    /// Halt the ticker. Executions already in flight run to completion and
    /// still deliver their results.
    ///
    /// Stopping an idle job retires it, so a `run` that has not begun yet
    /// returns [`JobError::Stopped`] instead of starting.
    pub fn stop(&self) {
        if self.state.swap(STOPPED, Ordering::SeqCst) == RUNNING {
            let _ = self.shutdown_tx.send(());
        }
    }

    pub fn stats(&self) -> JobStats {
        let c = &self.shared.counters;
        JobStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            in_flight: c.in_flight.load(Ordering::Relaxed),
        }
    }

    fn tick(&self) {
        let counters = &self.shared.counters;
        counters.ticks.fetch_add(1, Ordering::Relaxed);
        counters.in_flight.fetch_add(1, Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("job-{}", self.shared.name))
            .spawn(move || shared.execute());

        if let Err(e) = spawned {
            counters.in_flight.fetch_sub(1, Ordering::Relaxed);
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(job = %self.shared.name, error = %e, "failed to spawn tick thread");
        }
    }
}

impl Shared {
    fn execute(&self) {
        let result = self.unit.execute(&[]);
        let counters = &self.counters;

        match result {
            Ok(output) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                if !output.is_empty() {
                    self.deliver(&self.output_tx, output, "output");
                }
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                self.deliver(&self.errors_tx, err, "error");
            }
        }

        counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    fn deliver<T>(&self, tx: &SyncSender<T>, item: T, kind: &'static str) {
        let delivered = match self.overflow {
            OverflowPolicy::DropNewest => match tx.try_send(item) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(job = %self.name, kind, "result queue full; dropping result");
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
            OverflowPolicy::Block => tx.send(item).is_ok(),
        };

        if !delivered {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(job = %self.name, kind, "result not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::jobs::DrainHandle;

    use crate::process::{ExecError, ProcessExit};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl Counting {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail: false, delay: Duration::ZERO })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail: true, delay: Duration::ZERO })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail: false, delay })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ExecutableUnit for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn execute(&self, payload: &[u8]) -> Result<Vec<u8>, UnitError> {
            assert!(payload.is_empty());
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(self.delay);
            if self.fail {
                return Err(UnitError::failed(
                    "counting",
                    ExecError::Exit { status: ProcessExit { code: Some(1) }, stderr: String::new() },
                ));
            }
            Ok(format!("{{\"n\":{n}}}").into_bytes())
        }
    }

    fn every(ms: u64) -> Schedule {
        Schedule::every(Duration::from_millis(ms)).unwrap()
    }

    fn wait_for(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let end = Instant::now() + limit;
        while Instant::now() < end {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn start(job: &Arc<RecurringJob>) -> thread::JoinHandle<Result<(), JobError>> {
        let job = Arc::clone(job);
        thread::spawn(move || job.run())
    }

    #[test]
    fn ticks_on_interval_and_stops_cleanly() {
        let unit = Counting::new();
        let job = Arc::new(RecurringJob::new("counting", every(100), unit.clone(), JobConfig::default()));
        let runner = start(&job);

        thread::sleep(Duration::from_millis(350));
        job.stop();
        runner.join().unwrap().unwrap();
        thread::sleep(Duration::from_millis(50));

        let calls = unit.calls();
        assert!((3..=4).contains(&calls), "expected 3..=4 executions, got {calls}");

        thread::sleep(Duration::from_millis(250));
        assert_eq!(unit.calls(), calls, "no ticks after stop");
        assert!(!job.is_running());
    }

    #[test]
    fn second_run_while_running_is_rejected() {
        let job = Arc::new(RecurringJob::new("counting", every(20), Counting::new(), JobConfig::default()));
        let runner = start(&job);

        while !job.is_running() {
            thread::yield_now();
        }
        assert_eq!(job.run(), Err(JobError::AlreadyRunning));

        job.stop();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn stopped_job_is_not_restarted() {
        let job = Arc::new(RecurringJob::new("counting", every(20), Counting::new(), JobConfig::default()));
        let runner = start(&job);
        while !job.is_running() {
            thread::yield_now();
        }
        job.stop();
        runner.join().unwrap().unwrap();

        assert_eq!(job.run(), Err(JobError::Stopped));
    }

    #[test]
    fn stop_before_run_retires_the_job() {
        let job = RecurringJob::new("counting", every(20), Counting::new(), JobConfig::default());
        job.stop();
        job.stop();
        assert_eq!(job.run(), Err(JobError::Stopped));
        assert_eq!(job.stats(), JobStats::default());
    }

    #[test]
    fn slow_executions_overlap() {
        let unit = Counting::slow(Duration::from_millis(200));
        let job = Arc::new(RecurringJob::new("counting", every(30), unit.clone(), JobConfig::default()));
        let runner = start(&job);

        thread::sleep(Duration::from_millis(130));
        let overlapping = job.stats().in_flight;
        job.stop();
        runner.join().unwrap().unwrap();

        assert!(overlapping >= 2, "expected overlapping executions, saw {overlapping}");
    }

    #[test]
    fn full_queue_drops_without_blocking_ticks() {
        let unit = Counting::failing();
        let config = JobConfig::default().with_buffer(1);
        let job = Arc::new(RecurringJob::new("counting", every(10), unit.clone(), config));
        let runner = start(&job);

        thread::sleep(Duration::from_millis(120));
        job.stop();
        runner.join().unwrap().unwrap();
        thread::sleep(Duration::from_millis(30));

        let stats = job.stats();
        assert!(stats.ticks >= 5);
        assert_eq!(stats.failed, stats.ticks);
        assert_eq!(stats.dropped, stats.ticks - 1);
        assert_eq!(stats.in_flight, 0);

        let errors = job.take_errors().unwrap();
        assert!(errors.try_recv().is_ok());
        assert!(errors.try_recv().is_err());
    }

    #[test]
    fn block_policy_holds_producers_until_drained() {
        let unit = Counting::new();
        let config = JobConfig::default()
            .with_buffer(1)
            .with_overflow(OverflowPolicy::Block);
        let job = Arc::new(RecurringJob::new("counting", every(10), unit.clone(), config));
        let runner = start(&job);

        thread::sleep(Duration::from_millis(100));
        let stalled = job.stats();
        assert!(stalled.in_flight >= 3, "executions should wait on the full queue: {stalled:?}");
        assert_eq!(stalled.dropped, 0);

        let drains = DrainHandle::spawn(&job);
        assert!(
            wait_for(Duration::from_secs(2), || job.stats().in_flight <= 1),
            "draining should release waiting executions"
        );

        job.stop();
        runner.join().unwrap().unwrap();
        assert!(wait_for(Duration::from_secs(2), || job.stats().in_flight == 0));

        let stats = job.stats();
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.succeeded, stats.ticks);
        assert_eq!(unit.calls() as u64, stats.ticks);

        drop(job);
        drains.join();
    }

    #[test]
    fn queues_close_after_job_is_dropped() {
        let job = Arc::new(RecurringJob::new("counting", every(10), Counting::new(), JobConfig::default()));
        let output = job.take_output().unwrap();
        assert!(job.take_output().is_none());

        let runner = start(&job);
        thread::sleep(Duration::from_millis(55));
        job.stop();
        runner.join().unwrap().unwrap();
        drop(job);

        // Ends once every in-flight tick has released its sender.
        let received: Vec<Vec<u8>> = output.iter().collect();
        assert!(!received.is_empty());
    }
}
