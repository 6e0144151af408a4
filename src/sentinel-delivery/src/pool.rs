//! Fixed-size worker pool behind a bounded job queue

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, error, info, warn};

use crate::method::Delivery;
use crate::mqtt::Notifier;

/// Unit of work handed to a worker
pub enum Job {
    /// Upload `file`, then delete it whatever the outcome
    Deliver {
        file: PathBuf,
        target: Arc<dyn Delivery>,
    },
    /// Publish `payload` on `topic`
    Notify {
        notifier: Arc<dyn Notifier>,
        topic: String,
        payload: Vec<u8>,
    },
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Deliver { file, target } => f
                .debug_struct("Deliver")
                .field("file", file)
                .field("target", &target.describe())
                .finish(),
            Job::Notify {
                notifier,
                topic,
                payload,
            } => f
                .debug_struct("Notify")
                .field("notifier", &notifier.describe())
                .field("topic", topic)
                .field("payload_len", &payload.len())
                .finish(),
        }
    }
}

/// A job the pool refused, handed back to the caller
#[derive(Debug)]
pub enum SubmitError {
    /// Every queue slot is taken
    Full(Job),
    /// The pool is shutting down
    Closed(Job),
}

impl SubmitError {
    pub fn into_job(self) -> Job {
        match self {
            SubmitError::Full(job) | SubmitError::Closed(job) => job,
        }
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Full(_) => write!(f, "delivery queue is full"),
            SubmitError::Closed(_) => write!(f, "delivery queue is closed"),
        }
    }
}

impl std::error::Error for SubmitError {}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_size: 32,
        }
    }
}

/// Counters shared between the pool handle and its workers
#[derive(Debug, Default)]
pub struct PoolStats {
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub notified: AtomicU64,
    pub rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub finished: usize,
    pub still_busy: usize,
}

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    exited: Receiver<()>,
    busy: Arc<AtomicUsize>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> io::Result<Self> {
        let workers = config.workers.max(1);
        let (sender, receiver) = bounded::<Job>(config.queue_size.max(1));
        let (exited_tx, exited) = bounded::<()>(workers);
        let busy = Arc::new(AtomicUsize::new(0));
        let stats = Arc::new(PoolStats::default());

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = Worker {
                id,
                jobs: receiver.clone(),
                busy: Arc::clone(&busy),
                stats: Arc::clone(&stats),
                _exit: ExitSignal(exited_tx.clone()),
            };
            let handle = thread::Builder::new()
                .name(format!("deliver-{}", id))
                .spawn(move || worker.run())?;
            handles.push(handle);
        }

        info!(
            "started {} delivery workers (queue size {})",
            workers,
            config.queue_size.max(1)
        );

        Ok(Self {
            sender: Some(sender),
            handles,
            exited,
            busy,
            stats,
        })
    }

    /// Queue a job without blocking
    pub fn try_submit(&self, job: Job) -> Result<(), SubmitError> {
        let Some(sender) = &self.sender else {
            return Err(SubmitError::Closed(job));
        };

        sender.try_send(job).map_err(|e| {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(job) => SubmitError::Full(job),
                TrySendError::Disconnected(job) => SubmitError::Closed(job),
            }
        })
    }

    pub fn queued(&self) -> usize {
        self.sender.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    /// Workers currently running a job
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Close the queue and wait up to `grace` for workers to drain it
    ///
    /// Workers still running after the grace period are left detached.
    pub fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        self.sender.take();

        let total = self.handles.len();
        let deadline = Instant::now() + grace;
        let mut finished = 0;
        while finished < total {
            match self.exited.recv_deadline(deadline) {
                Ok(()) => finished += 1,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    finished = total;
                }
            }
        }

        if finished == total {
            for handle in self.handles.drain(..) {
                if handle.join().is_err() {
                    error!("delivery worker panicked");
                }
            }
            debug!("delivery pool drained");
        } else {
            warn!(
                "{} delivery workers still busy after {:?}, abandoning",
                total - finished,
                grace
            );
        }

        ShutdownReport {
            finished,
            still_busy: total - finished,
        }
    }
}

/// Sends on drop, so a worker that panics still reports its exit
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Removes the local snapshot once the delivery attempt is over
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        match fs::remove_file(&self.0) {
            Ok(()) => debug!("removed {}", self.0.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {}", self.0.display(), e),
        }
    }
}

struct Worker {
    id: usize,
    jobs: Receiver<Job>,
    busy: Arc<AtomicUsize>,
    stats: Arc<PoolStats>,
    _exit: ExitSignal,
}

impl Worker {
    fn run(self) {
        debug!("delivery worker {} started", self.id);
        for job in self.jobs.iter() {
            self.busy.fetch_add(1, Ordering::SeqCst);
            self.execute(job);
            self.busy.fetch_sub(1, Ordering::SeqCst);
        }
        debug!("delivery worker {} exiting", self.id);
    }

    fn execute(&self, job: Job) {
        match job {
            Job::Deliver { file, target } => {
                let file = RemoveOnDrop(file);
                match target.deliver(&file.0) {
                    Ok(()) => {
                        self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                        info!("delivered {} to {}", file.0.display(), target.describe());
                    }
                    Err(e) => {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        error!("delivery of {} failed: {}", file.0.display(), e);
                    }
                }
            }
            Job::Notify {
                notifier,
                topic,
                payload,
            } => match notifier.publish(&topic, &payload) {
                Ok(()) => {
                    self.stats.notified.fetch_add(1, Ordering::Relaxed);
                    debug!("notified {} on {}", notifier.describe(), topic);
                }
                Err(e) => warn!("notification to {} failed: {}", notifier.describe(), e),
            },
        }
    }
}
