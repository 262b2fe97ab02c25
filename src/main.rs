use anyhow::Result;
use image_gateway::{
    config::{self, LogFormat},
    runtime::{
        supervisor::{Supervisor, worker_slot_from_env},
        worker,
    },
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // --- .env file, if any ---
    dotenvy::dotenv().ok();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log.level));
    match cfg.log.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    match worker_slot_from_env() {
        Some(slot) => worker::run(cfg, slot).await,
        None => {
            tracing::info!(
                service = %cfg.log.service_name,
                "Starting supervisor with config: {:?}",
                cfg
            );
            Supervisor::for_current_exe(cfg.workers)?.run().await
        }
    }
}
