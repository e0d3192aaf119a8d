use crate::reclaim::ReclamationTrigger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

/// Collapses bursts of delete notifications into one delayed reclamation.
///
/// The first notification arms a timer for `window`; notifications arriving
/// while it is armed, or while the reclamation it started is still running,
/// are absorbed. The window is measured from the first notification and is
/// never extended.
pub struct Coalescer {
    pending: Arc<Mutex<bool>>,
    window: Duration,
    trigger: Arc<ReclamationTrigger>,
    cancel: CancellationToken,
}

impl Coalescer {
    pub fn new(
        window: Duration,
        trigger: Arc<ReclamationTrigger>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pending: Arc::new(Mutex::new(false)),
            window,
            trigger,
            cancel,
        }
    }

    /// Returns `true` if this call armed a new timer.
    pub async fn notify(&self) -> bool {
        {
            let mut pending = self.pending.lock().await;
            if *pending {
                return false;
            }
            *pending = true;
        }

        info!("[hook] GC in {:?}", self.window);
        let pending = self.pending.clone();
        let trigger = self.trigger.clone();
        let cancel = self.cancel.clone();
        let window = self.window;
        let span = info_span!("debounced_gc", run = %Uuid::new_v4());
        tokio::spawn(
            async move {
                tokio::select! {
                    _ = tokio::time::sleep(window) => {
                        trigger.run(&cancel).await;
                    }
                    _ = cancel.cancelled() => debug!("scheduled GC abandoned"),
                }
                *pending.lock().await = false;
            }
            .instrument(span),
        );
        true
    }

    pub async fn is_pending(&self) -> bool {
        *self.pending.lock().await
    }
}
