use clap::Parser;
use registry_gc::api;
use registry_gc::config::Config;
use registry_gc::reclaim::CommandReclaimer;
use registry_gc::registry::HttpRegistry;
use registry_gc::scheduler::PeriodicScheduler;
use registry_gc::utils::cli::Args;
use registry_gc::utils::state::AppState;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);
    let config = Config::from_args(&args)?;
    info!(
        registry = %config.registry_url,
        keep_n = config.keep_n,
        workers = config.workers,
        interval = ?config.prune_interval,
        debounce = ?config.debounce,
        "starting registry-gc"
    );

    let cancel = CancellationToken::new();
    let registry = Arc::new(HttpRegistry::new(
        config.registry_url.clone(),
        config.credentials.clone(),
        config.request_timeout,
        config.catalog_page_size,
    )?);
    let reclaimer = Arc::new(CommandReclaimer::from_config(&config));
    let state = Arc::new(AppState::new(
        config,
        registry,
        reclaimer,
        cancel.clone(),
    ));

    let scheduler = PeriodicScheduler::new(
        state.config.prune_interval,
        state.orchestrator.clone(),
    )
    .spawn(cancel.clone());
    tokio::spawn(shutdown_signal(cancel.clone()));

    let listener =
        tokio::net::TcpListener::bind((state.config.host.as_str(), state.config.port)).await?;
    info!("listener on {}", listener.local_addr()?);

    let app = api::create_router(state);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await;

    cancel.cancel();
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            error!("scheduler task failed: {e}");
        }
    }
    info!("stopped");
    served?;
    Ok(())
}

fn init_tracing(log_level: &str) {
    let level = LevelFilter::from_str(log_level).unwrap_or_else(|_| {
        eprintln!("WARNING: LOG_LEVEL `{log_level}` is not a valid level. Use default value: info");
        LevelFilter::INFO
    });
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => return,
    }

    info!("shutdown requested");
    cancel.cancel();
}
