use crate::utils::duration::parse_duration;
use clap::{ArgAction, Parser};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Listener host for the webhook and manual endpoints
    #[arg(long, env = "LISTEN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listener port
    #[arg(short, long, env = "LISTEN_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Base URL of the registry HTTP API
    #[arg(
        long,
        env = "REGISTRY_URL",
        default_value = "http://registry-server:5000"
    )]
    pub registry_url: String,

    /// How many of the newest tags to keep per repository (<= 0 disables pruning)
    #[arg(long, env = "KEEP_N", default_value_t = 10, allow_negative_numbers = true)]
    pub keep_n: i64,

    /// Interval between periodic prune runs (0 disables them)
    #[arg(long, env = "PRUNE_INTERVAL", default_value = "24h", value_parser = parse_duration)]
    pub prune_interval: Duration,

    /// Number of concurrent manifest-deletion workers
    #[arg(short, long, env = "WORKERS", default_value_t = 8)]
    pub workers: usize,

    /// Basic-auth user for the registry API (pruning is skipped without it)
    #[arg(long, env = "REGISTRY_USER")]
    pub registry_user: Option<String>,

    /// Basic-auth password for the registry API
    #[arg(long, env = "REGISTRY_PASS", hide_env_values = true)]
    pub registry_pass: Option<String>,

    /// Delay between the first delete notification and garbage collection
    #[arg(long, env = "DEBOUNCE", default_value = "60s", value_parser = parse_duration)]
    pub debounce: Duration,

    /// Per-request timeout for registry API calls
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "15s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// Page size requested from the registry catalog
    #[arg(long, env = "CATALOG_PAGE_SIZE", default_value_t = 10000)]
    pub catalog_page_size: usize,

    /// Registry binary that implements `garbage-collect`
    #[arg(long, env = "GC_COMMAND", default_value = "registry")]
    pub gc_command: String,

    /// Registry configuration file handed to `garbage-collect`
    #[arg(
        long,
        env = "REGISTRY_CONFIG",
        default_value = "/etc/docker/registry/config.yml"
    )]
    pub registry_config: String,

    /// Pass `--delete-untagged` to `garbage-collect`
    #[arg(
        long,
        env = "GC_DELETE_UNTAGGED",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub delete_untagged: bool,

    /// Log verbosity (overridden by RUST_LOG)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
