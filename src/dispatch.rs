//! Supervised background jobs for work acknowledged before it is done.
//!
//! Webhook deliveries are answered with `200 OK` right away and the actual
//! processing is queued here. A supervisor task spawns every job into a
//! [`JoinSet`], logs failures and panics, and on shutdown stops taking new
//! jobs and waits for queued and running ones to finish.
//!
//! Jobs still die with the process on `SIGKILL`; acknowledgement means
//! "received", not "processed".

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::BotError;

/// Default number of jobs that may wait in the queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct Job {
    name: String,
    work: BoxFuture<'static, Result<(), BotError>>,
}

/// Cloneable handle for submitting jobs.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
}

/// Owns the supervisor task; call [`shutdown`](DispatchWorker::shutdown)
/// to drain it.
pub struct DispatchWorker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    /// Start the supervisor on the current runtime.
    pub fn start(capacity: usize) -> (Dispatcher, DispatchWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(supervise(rx, stop_rx));
        (
            Dispatcher { tx },
            DispatchWorker {
                stop: stop_tx,
                handle,
            },
        )
    }

    /// Queue a job. Returns `false` if the queue is full or shutting down;
    /// the job is dropped in that case.
    pub fn submit<F>(&self, name: impl Into<String>, work: F) -> bool
    where
        F: std::future::Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let job = Job {
            name: name.into(),
            work: Box::pin(work),
        };
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(job = %job.name, "background queue full; dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(job = %job.name, "background queue closed; dropping job");
                false
            }
        }
    }
}

impl DispatchWorker {
    /// Stop accepting jobs, then wait for everything queued or running.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            error!(error = %e, "background supervisor crashed");
        }
    }
}

async fn supervise(mut rx: mpsc::Receiver<Job>, mut stop: oneshot::Receiver<()>) {
    let mut tasks: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut stop => break,
            job = rx.recv() => match job {
                Some(job) => spawn_job(&mut tasks, job),
                None => break,
            },
            Some(result) = tasks.join_next(), if !tasks.is_empty() => log_join(result),
        }
    }

    // Drain: refuse new jobs, run what is already queued, wait for all.
    rx.close();
    while let Some(job) = rx.recv().await {
        spawn_job(&mut tasks, job);
    }
    if !tasks.is_empty() {
        info!(jobs = tasks.len(), "waiting for background jobs to finish");
    }
    while let Some(result) = tasks.join_next().await {
        log_join(result);
    }
    debug!("background supervisor stopped");
}

fn spawn_job(tasks: &mut JoinSet<()>, job: Job) {
    let Job { name, work } = job;
    tasks.spawn(async move {
        if let Err(e) = work.await {
            error!(job = %name, error = %e, "background job failed");
        }
    });
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("background job panicked");
        } else {
            warn!(error = %e, "background job cancelled");
        }
    }
}
