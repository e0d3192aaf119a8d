use crate::config::Config;
use crate::error::ReclaimError;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The registry's storage-level garbage collection.
#[async_trait::async_trait]
pub trait Reclaimer: Send + Sync {
    /// Runs one collection and returns its diagnostic output.
    async fn reclaim(&self, cancel: &CancellationToken) -> Result<String, ReclaimError>;
}

/// Runs `registry garbage-collect` against the registry's storage volume.
#[derive(Clone, Debug)]
pub struct CommandReclaimer {
    program: String,
    args: Vec<String>,
}

impl CommandReclaimer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn garbage_collect(
        program: impl Into<String>,
        registry_config: &Path,
        delete_untagged: bool,
    ) -> Self {
        let mut args = vec!["garbage-collect".to_string()];
        if delete_untagged {
            args.push("--delete-untagged".to_string());
        }
        args.push(registry_config.display().to_string());
        Self::new(program, args)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::garbage_collect(
            config.gc_command.clone(),
            &config.registry_config,
            config.delete_untagged,
        )
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait::async_trait]
impl Reclaimer for CommandReclaimer {
    async fn reclaim(&self, cancel: &CancellationToken) -> Result<String, ReclaimError> {
        // dropping the future kills the child
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReclaimError::Cancelled),
            output = child => output.map_err(|source| ReclaimError::Spawn {
                program: self.program.clone(),
                source,
            })?,
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            Ok(text)
        } else {
            Err(ReclaimError::Failed {
                status: output.status.to_string(),
                output: text,
            })
        }
    }
}

/// Single entry point to reclamation for every caller.
///
/// Invocations are serialized: a caller arriving while a collection runs
/// waits for it to finish and then runs its own. Failures are logged and
/// never retried here.
pub struct ReclamationTrigger {
    reclaimer: Arc<dyn Reclaimer>,
    running: Mutex<()>,
}

impl ReclamationTrigger {
    pub fn new(reclaimer: Arc<dyn Reclaimer>) -> Self {
        Self {
            reclaimer,
            running: Mutex::new(()),
        }
    }

    /// Returns whether the collection ran and succeeded.
    pub async fn run(&self, cancel: &CancellationToken) -> bool {
        let _running = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("GC skipped: shutting down");
                return false;
            }
            guard = self.running.lock() => guard,
        };

        info!("GC start");
        let start = Instant::now();
        match self.reclaimer.reclaim(cancel).await {
            Ok(output) => {
                info!(elapsed = ?start.elapsed(), "GC done");
                if !output.is_empty() {
                    debug!("GC output:\n{output}");
                }
                true
            }
            Err(ReclaimError::Cancelled) => {
                warn!("GC interrupted by shutdown");
                false
            }
            Err(e) => {
                error!("GC error: {e}");
                if let Some(output) = e.output() {
                    debug!("GC output:\n{output}");
                }
                false
            }
        }
    }
}
