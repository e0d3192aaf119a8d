use crate::domain::{DeleteJob, RunOutcome};
use crate::error::RegistryError;
use crate::registry::Registry;
use crate::retention::RetentionPolicy;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

type JobQueue = Arc<Mutex<mpsc::Receiver<DeleteJob>>>;

#[derive(Debug, Default)]
struct WorkerTally {
    attempted: usize,
    succeeded: usize,
    failed: usize,
}

/// Evaluates the retention policy across repositories and deletes the losing
/// manifests with a fixed pool of workers.
///
/// The producer and the workers run concurrently and meet at a bounded
/// channel. Dropping the producer's sender closes the queue, and the run is
/// complete once every worker has drained it and exited.
pub struct DeletionPipeline {
    registry: Arc<dyn Registry>,
    policy: RetentionPolicy,
    workers: usize,
}

impl DeletionPipeline {
    pub fn new(registry: Arc<dyn Registry>, policy: RetentionPolicy, workers: usize) -> Self {
        Self {
            registry,
            policy,
            workers: workers.max(1),
        }
    }

    /// Runs one sweep over `repositories`.
    ///
    /// After `cancel` fires no new job is dispatched; deletes already in
    /// flight are allowed to finish.
    pub async fn run(&self, repositories: Vec<String>, cancel: &CancellationToken) -> RunOutcome {
        let (tx, rx) = mpsc::channel(self.workers);
        let queue: JobQueue = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            workers.spawn(worker(
                id,
                self.registry.clone(),
                queue.clone(),
                cancel.clone(),
            ));
        }
        drop(queue);

        let mut outcome = self.produce(repositories, tx, cancel).await;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(tally) => {
                    outcome.attempted += tally.attempted;
                    outcome.succeeded += tally.succeeded;
                    outcome.failed += tally.failed;
                }
                Err(e) => error!("deletion worker aborted: {e}"),
            }
        }
        outcome
    }

    // Consumes the sender so the queue closes when production ends.
    async fn produce(
        &self,
        repositories: Vec<String>,
        jobs: mpsc::Sender<DeleteJob>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        for repo in repositories {
            if cancel.is_cancelled() {
                break;
            }
            match self
                .policy
                .emit_jobs(self.registry.as_ref(), &repo, &jobs, cancel)
                .await
            {
                Ok(report) => {
                    outcome.repositories += 1;
                    outcome.vanished += report.vanished;
                    outcome.unresolved += report.unresolved;
                }
                Err(RegistryError::Cancelled) => break,
                Err(e) => {
                    warn!(repo = %repo, "tags: {e}");
                    outcome.skipped_repositories += 1;
                }
            }
        }
        outcome
    }
}

async fn worker(
    id: usize,
    registry: Arc<dyn Registry>,
    queue: JobQueue,
    cancel: CancellationToken,
) -> WorkerTally {
    let mut tally = WorkerTally::default();
    // never cancelled: a dispatched delete runs to completion
    let in_flight = CancellationToken::new();
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            job = async { queue.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };

        tally.attempted += 1;
        match registry
            .delete_manifest(&job.repository, &job.digest, &in_flight)
            .await
        {
            Ok(()) => {
                tally.succeeded += 1;
                debug!(worker = id, repo = %job.repository, tag = %job.tag, "deleted");
            }
            Err(e) => {
                tally.failed += 1;
                warn!(repo = %job.repository, tag = %job.tag, "delete: {e}");
            }
        }
    }
    tally
}
