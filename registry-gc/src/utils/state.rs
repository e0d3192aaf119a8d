use crate::config::Config;
use crate::debounce::Coalescer;
use crate::reclaim::{ReclamationTrigger, Reclaimer};
use crate::registry::Registry;
use crate::retention::RetentionPolicy;
use crate::scheduler::Orchestrator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything the HTTP handlers and the scheduler share.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub trigger: Arc<ReclamationTrigger>,
    pub coalescer: Arc<Coalescer>,
    pub orchestrator: Arc<Orchestrator>,
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<dyn Registry>,
        reclaimer: Arc<dyn Reclaimer>,
        cancel: CancellationToken,
    ) -> Self {
        let trigger = Arc::new(ReclamationTrigger::new(reclaimer));
        let coalescer = Arc::new(Coalescer::new(
            config.debounce,
            trigger.clone(),
            cancel.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            registry,
            RetentionPolicy::new(config.keep_n),
            config.workers,
            trigger.clone(),
            config.credentials.is_some(),
        ));

        AppState {
            config: Arc::new(config),
            trigger,
            coalescer,
            orchestrator,
            cancel,
        }
    }
}
