use crate::domain::RunOutcome;
use crate::pipeline::DeletionPipeline;
use crate::reclaim::ReclamationTrigger;
use crate::registry::Registry;
use crate::retention::RetentionPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Runs retention, deletion and reclamation as one sequence.
pub struct Orchestrator {
    registry: Arc<dyn Registry>,
    policy: RetentionPolicy,
    pipeline: DeletionPipeline,
    trigger: Arc<ReclamationTrigger>,
    /// Without credentials only reclamation runs.
    authenticated: bool,
    in_progress: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn Registry>,
        policy: RetentionPolicy,
        workers: usize,
        trigger: Arc<ReclamationTrigger>,
        authenticated: bool,
    ) -> Self {
        Self {
            pipeline: DeletionPipeline::new(registry.clone(), policy, workers),
            registry,
            policy,
            trigger,
            authenticated,
            in_progress: Mutex::new(()),
        }
    }

    /// Runs one prune + GC pass.
    ///
    /// Returns `None` without doing anything if another pass is already in
    /// progress.
    pub async fn prune(&self, cancel: &CancellationToken) -> Option<RunOutcome> {
        let Ok(_in_progress) = self.in_progress.try_lock() else {
            info!("prune already in progress, skipping");
            return None;
        };
        let span = info_span!("prune", run = %Uuid::new_v4());
        Some(self.run(cancel).instrument(span).await)
    }

    async fn run(&self, cancel: &CancellationToken) -> RunOutcome {
        let start = Instant::now();
        let mut outcome = if self.policy.is_disabled() {
            info!("prune disabled (KEEP_N<=0)");
            RunOutcome::default()
        } else if !self.authenticated {
            warn!("prune skipped: REGISTRY_USER/PASS not set");
            RunOutcome::default()
        } else {
            self.prune_tags(cancel).await
        };

        outcome.reclaimed = self.trigger.run(cancel).await;
        info!(
            repositories = outcome.repositories,
            skipped = outcome.skipped_repositories,
            deleted = outcome.succeeded,
            failed = outcome.failed,
            reclaimed = outcome.reclaimed,
            "prune+GC finished in {:?}",
            start.elapsed()
        );
        outcome
    }

    async fn prune_tags(&self, cancel: &CancellationToken) -> RunOutcome {
        match self.registry.list_repositories(cancel).await {
            Ok(repositories) => {
                info!("catalog: {} repos", repositories.len());
                self.pipeline.run(repositories, cancel).await
            }
            Err(e) => {
                warn!("prune: {e}");
                RunOutcome::default()
            }
        }
    }
}

/// Fires [`Orchestrator::prune`] on a fixed period.
///
/// Each run is awaited inside the tick loop, so runs never overlap; ticks
/// missed while a run is in progress are dropped.
pub struct PeriodicScheduler {
    period: Duration,
    orchestrator: Arc<Orchestrator>,
}

impl PeriodicScheduler {
    pub fn new(period: Duration, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            period,
            orchestrator,
        }
    }

    /// Spawns the tick loop. A zero period disables it and returns `None`.
    pub fn spawn(self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.period.is_zero() {
            info!("periodic prune disabled");
            return None;
        }
        Some(tokio::spawn(async move { self.run(cancel).await }))
    }

    async fn run(&self, cancel: CancellationToken) {
        info!(period = ?self.period, "periodic prune scheduled");
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.orchestrator.prune(&cancel).await.is_none() {
                debug!("tick skipped: a manual prune is running");
            }
        }
        debug!("periodic prune stopped");
    }
}
