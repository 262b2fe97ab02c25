use crate::services::gateway_service::DEFAULT_CACHE_CONTROL;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Number of worker processes the supervisor keeps alive.
    pub workers: usize,
    pub default_cache_control: String,
    pub store: StoreConfig,
    pub log: LogConfig,
}

/// Object store connection settings.
#[derive(Clone, Default)]
pub struct StoreConfig {
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
    pub bucket: String,
    pub force_path_style: bool,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
    pub service_name: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Object gateway with on-demand image variants")]
pub struct Args {
    /// Host to bind to (overrides LISTEN)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Worker process count (overrides THREADS)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Cache-Control sent when an object has none (overrides DEFAULT_CACHE)
    #[arg(long)]
    pub default_cache_control: Option<String>,

    /// Bucket holding originals and variants (overrides S3_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge parsed arguments over values looked up by environment name.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        // --- Environment fallback ---
        let env_port = match var("PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            None => 3000,
        };
        let env_workers = match var("THREADS") {
            Some(value) => value
                .parse::<usize>()
                .with_context(|| format!("parsing THREADS value `{}`", value))?,
            None => 1,
        };

        // --- Merge ---
        let workers = args.workers.unwrap_or(env_workers);
        if workers == 0 {
            bail!("worker count must be at least 1");
        }

        let Some(bucket) = args.bucket.or_else(|| var("S3_BUCKET")) else {
            bail!("no bucket configured: set S3_BUCKET or pass --bucket");
        };

        let store = StoreConfig {
            endpoint_url: var("S3_ENDPOINT_URL"),
            access_key_id: var("S3_ACCESS_KEY_ID"),
            secret_access_key: var("S3_SECRET_ACCESS_KEY"),
            region: var("S3_REGION"),
            bucket,
            force_path_style: var("S3_FORCE_PATH_STYLE").as_deref() == Some("YES"),
        };

        let log = LogConfig {
            level: var("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            format: match var("LOG_TYPE") {
                Some(kind) if kind.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            service_name: var("SERVICE_NAME").unwrap_or_else(|| "image-gateway".into()),
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| var("LISTEN"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            workers,
            default_cache_control: args
                .default_cache_control
                .or_else(|| var("DEFAULT_CACHE"))
                .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.into()),
            store,
            log,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
