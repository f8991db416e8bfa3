//! Ephemera daemon: serves the control plane and tears down the session on exit.

use anyhow::Context;
use ephemera_kernel::host::WorkspaceHost;
use ephemera_kernel::infrastructure::{audit, config::Settings, server, telemetry::TelemetryBuilder};
use ephemera_kernel::session::StopOutcome;
use ephemera_kernel::ws::BroadcastMessage;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Settings::new().context("Failed to load configuration")?;

    let _telemetry = TelemetryBuilder::from_settings(&config.telemetry, env!("CARGO_PKG_VERSION"))
        .init()
        .context("Failed to initialize telemetry")?;

    info!("Ephemera Starting...");
    audit::log_audit(&audit::AuditEvent::SystemStartup {
        component: "Kernel".into(),
    });

    let host = Arc::new(WorkspaceHost::from_settings(&config)?);
    let manager = Arc::clone(host.manager());

    // Residue of a previous process that died mid-session.
    match manager.recover().await {
        Ok(report) if report.warning_count() > 0 => {
            warn!(warnings = ?report.warnings(), "Recovery left warnings");
        }
        Ok(_) => info!("No residue from a previous run"),
        Err(e) => error!(error = %e, "Recovery failed"),
    }

    let (stop_server, server_stopped) = oneshot::channel::<()>();
    let server_config = config.clone();
    let server_host = Arc::clone(&host);
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = server_stopped.await;
        };
        if let Err(e) = server::run_server(&server_config, server_host, shutdown).await {
            error!("Control Plane failed: {:?}", e);
        }
    });

    info!("Ephemera Initialized. Waiting for shutdown signal...");

    shutdown_signal().await;

    info!("Shutdown signal received, cleaning up...");
    match manager.stop_session().await {
        Ok(StopOutcome::Completed(report)) => info!(summary = %report.summary(), "Session torn down"),
        Ok(StopOutcome::NotRunning) => {}
        Err(e) => error!(error = %e, "Teardown at shutdown failed"),
    }

    let _ = manager.broadcaster().broadcast(BroadcastMessage::Shutdown);
    let _ = stop_server.send(());
    if let Err(e) = server.await {
        error!(error = %e, "Control Plane task failed");
    }

    audit::log_audit(&audit::AuditEvent::SystemShutdown {
        reason: "Signal received".into(),
    });

    info!("Ephemera Shutdown Complete.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
