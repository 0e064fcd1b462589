//! Entry point for the nestbox-agent daemon.

use std::sync::Arc;
use std::time::Duration;

use nestbox_agent::{create_router, AgentConfig, AgentState};
use tracing::info;

/// How long in-flight requests get to drain after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = AgentConfig::from_env();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        firecracker = %config.vmm.firecracker_bin.display(),
        "nestbox-agent starting"
    );

    let state = Arc::new(AgentState::new(config));
    let app = create_router(Arc::clone(&state));

    let listener = match tokio::net::TcpListener::bind(state.config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %state.config.listen_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(addr = %state.config.listen_addr, "agent listening");

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    });

    // Let the graceful drain run, but bound it before tearing the VMs down.
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server error");
            }
        }
        () = drain_deadline(signalled_rx) => {
            tracing::warn!("shutdown grace expired with requests in flight");
        }
    }

    state.stop_all().await;
    info!("nestbox-agent stopped");
}

async fn drain_deadline(signalled: tokio::sync::oneshot::Receiver<()>) {
    let _ = signalled.await;
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}
