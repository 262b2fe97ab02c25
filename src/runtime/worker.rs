//! A single worker process: one listener, one gateway, one drain controller.

use crate::{
    config::AppConfig,
    handlers::gateway_handlers::AppState,
    routes::routes,
    runtime::{
        drain::{DRAIN_DEADLINE, DrainController, arm_deadline},
        signals::TerminationSignals,
    },
    services::{
        gateway_service::GatewayService, image_transformer::ImageTransformer, s3_store::S3Store,
    },
};
use anyhow::{Context, Result};
use std::{io::ErrorKind, net::SocketAddr, sync::Arc};
use tokio::net::{TcpListener, TcpSocket};
use tracing::{info, warn};

/// Serve requests until drained.
pub async fn run(cfg: AppConfig, slot: usize) -> Result<()> {
    let store = S3Store::connect(&cfg.store).await;
    let gateway = GatewayService::new(
        Arc::new(store),
        ImageTransformer::new(),
        cfg.default_cache_control.clone(),
    );
    let drain = DrainController::new();
    let app = routes::routes().with_state(AppState::new(gateway, drain.clone()));

    let listener = bind(&cfg).await?;
    info!(
        service = %cfg.log.service_name,
        slot,
        pid = std::process::id(),
        addr = %listener.local_addr()?,
        "worker is running"
    );

    let signals = TerminationSignals::install()?;
    tokio::spawn(drain_on_signal(signals, drain.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(drain.draining())
        .await?;

    drain.mark_terminated();
    info!(slot, pid = std::process::id(), "worker drained");
    Ok(())
}

async fn drain_on_signal(mut signals: TerminationSignals, drain: DrainController) {
    let signal = signals.recv().await;
    info!(%signal, pid = std::process::id(), "draining worker");
    if drain.begin_drain() {
        arm_deadline(DRAIN_DEADLINE, || std::process::exit(0));
    }
}

/// Bind the shared listen address; every worker binds it with port reuse.
async fn bind(cfg: &AppConfig) -> Result<TcpListener> {
    let addr = resolve(&cfg.addr()).await?;
    match bind_reusable(addr) {
        Ok(listener) => Ok(listener),
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback = SocketAddr::from(([127, 0, 0, 1], cfg.port));
            warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr, err, fallback
            );
            Ok(bind_reusable(fallback)?)
        }
        Err(err) => Err(err).with_context(|| format!("binding {}", addr)),
    }
}

async fn resolve(addr: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("resolving {}", addr))?
        .next()
        .with_context(|| format!("{} resolved to no address", addr))
}

fn bind_reusable(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}
