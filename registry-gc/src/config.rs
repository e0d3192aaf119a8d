use crate::utils::cli::Args;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub registry_url: String,
    /// Zero disables tag pruning.
    pub keep_n: usize,
    /// Zero disables the periodic run.
    pub prune_interval: Duration,
    pub workers: usize,
    pub credentials: Option<Credentials>,
    pub debounce: Duration,
    pub request_timeout: Duration,
    pub catalog_page_size: usize,
    pub gc_command: String,
    pub registry_config: PathBuf,
    pub delete_untagged: bool,
    pub log_level: String,
}

impl Config {
    pub fn from_args(args: &Args) -> anyhow::Result<Config> {
        let mut validation_errors = Vec::new();

        if let Err(e) = reqwest::Url::parse(&args.registry_url) {
            validation_errors.push(format!(
                "REGISTRY_URL `{}` is not a valid URL: {e}",
                args.registry_url,
            ));
        }
        if args.workers == 0 {
            validation_errors.push("WORKERS must be at least 1".to_string());
        }
        if args.gc_command.trim().is_empty() {
            validation_errors.push("GC_COMMAND must not be empty".to_string());
        }
        if args.request_timeout.is_zero() {
            validation_errors.push("REQUEST_TIMEOUT must be greater than zero".to_string());
        }
        if args.catalog_page_size == 0 {
            validation_errors.push("CATALOG_PAGE_SIZE must be at least 1".to_string());
        }

        if !validation_errors.is_empty() {
            anyhow::bail!(validation_errors.join("\n"));
        }

        let credentials = args
            .registry_user
            .as_deref()
            .filter(|user| !user.is_empty())
            .map(|user| Credentials {
                username: user.to_string(),
                password: args.registry_pass.clone().unwrap_or_default(),
            });

        Ok(Config {
            host: args.host.clone(),
            port: args.port,
            registry_url: args.registry_url.trim_end_matches('/').to_string(),
            keep_n: usize::try_from(args.keep_n.max(0)).unwrap_or(usize::MAX),
            prune_interval: args.prune_interval,
            workers: args.workers,
            credentials,
            debounce: args.debounce,
            request_timeout: args.request_timeout,
            catalog_page_size: args.catalog_page_size,
            gc_command: args.gc_command.clone(),
            registry_config: PathBuf::from(&args.registry_config),
            delete_untagged: args.delete_untagged,
            log_level: args.log_level.clone(),
        })
    }
}
