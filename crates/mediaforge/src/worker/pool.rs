use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::broadcast::JobProgressBroadcaster;
use crate::error::WorkerError;
use crate::model::Job;
use crate::pipeline::{BroadcastProgress, NoopProgress, Pipeline, ProgressReporter, RunOutcome};

const IDLE_POLL: Duration = Duration::from_millis(100);

/// Queue item: the job to run plus what progress events need to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: String,
    pub source_url: String,
}

impl From<&Job> for QueuedJob {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            source_url: job.source_url.clone(),
        }
    }
}

/// Fixed set of tokio tasks pulling job ids from a bounded queue.
pub struct WorkerPool {
    job_sender: mpsc::Sender<QueuedJob>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers (at least one). Must be called from
    /// within a tokio runtime.
    pub fn new(
        pipeline: Arc<Pipeline>,
        progress: Option<JobProgressBroadcaster>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = mpsc::channel::<QueuedJob>(queue_capacity.max(1));
        let job_receiver = Arc::new(Mutex::new(job_receiver));
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&job_receiver),
                    Arc::clone(&shutdown),
                    Arc::clone(&pipeline),
                    progress.clone(),
                ))
            })
            .collect();

        info!("Started {} workers", worker_count);

        Self {
            job_sender,
            workers,
            shutdown,
        }
    }

    /// Queues a job. Waits for space when the queue is full.
    pub async fn submit(&self, job: QueuedJob) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .await
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Stops workers after their current job. Queued ids stay pending in
    /// the database.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Closes the queue and waits for every worker to exit. Without a prior
    /// [`shutdown`](Self::shutdown), workers drain the queue first.
    pub async fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    job_receiver: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
    progress: Option<JobProgressBroadcaster>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        let next = {
            let mut receiver = job_receiver.lock().await;
            tokio::time::timeout(IDLE_POLL, receiver.recv()).await
        };

        match next {
            Ok(Some(job)) => {
                debug!("Worker {} processing job {}", worker_id, job.job_id);
                process(&pipeline, progress.as_ref(), &job).await;
            }
            Ok(None) => {
                debug!("Worker {} job channel closed", worker_id);
                break;
            }
            Err(_) => continue,
        }
    }

    debug!("Worker {} stopped", worker_id);
}

async fn process(
    pipeline: &Pipeline,
    broadcaster: Option<&JobProgressBroadcaster>,
    job: &QueuedJob,
) {
    let job_id = job.job_id.as_str();
    let reporter: Box<dyn ProgressReporter> = match broadcaster {
        Some(broadcaster) => Box::new(BroadcastProgress::new(
            broadcaster,
            job_id,
            &job.source_url,
        )),
        None => Box::new(NoopProgress),
    };

    match pipeline.run(job_id, reporter.as_ref()).await {
        Ok(RunOutcome::Completed { entry_id }) => {
            debug!("Job {} published as {}", job_id, entry_id)
        }
        Ok(RunOutcome::Failed { error }) => debug!("Job {} failed: {}", job_id, error),
        Ok(RunOutcome::Interrupted) => debug!("Job {} interrupted", job_id),
        // Deleted or already picked up by another run.
        Err(e) => warn!("Skipping job {}: {}", job_id, e),
    }
}
