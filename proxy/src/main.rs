// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # keybridge Proxy Daemon
//!
//! Entry point for the `keybridge-proxy` binary. Parses CLI arguments,
//! initializes logging, loads the long-term keys, builds the TLS client
//! configuration, and hands everything to the supervisor.
//!
//! Error policy, enforced right here and nowhere else:
//!
//! - **Startup-fatal**: bad flags, unreadable or unparseable key files, a
//!   broken TLS configuration, a port that won't bind. The process exits
//!   non-zero with one error line.
//! - **Session-fatal**: everything after the listener is up. The supervisor
//!   logs it and keeps accepting; a long-running daemon does not fall over
//!   because one workload misbehaved.

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;

use keybridge_protocol::crypto::keys::LongTermKeys;
use keybridge_protocol::net::supervisor::{Supervisor, SupervisorConfig};
use keybridge_protocol::net::tls::{TlsClient, TlsClientOptions};

use cli::ProxyCli;
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ProxyCli::parse();

    // --- 1. Logging ---
    if !cli::validate_log_level(&args.log_level) {
        anyhow::bail!(
            "invalid --log-level '{}': expected trace|debug|info|warn|error",
            args.log_level
        );
    }
    let log_filter = format!(
        "keybridge_proxy={level},keybridge_protocol={level}",
        level = args.log_level
    );
    logging::init_logging(&log_filter, LogFormat::from_str_lossy(&args.log_format));

    tracing::info!(
        local_port = args.local_port,
        remote = %format!("{}:{}", args.remote_ip, args.remote_port),
        maxconn = args.session_limit(),
        mtls = args.client_cert.is_some(),
        "starting keybridge-proxy"
    );

    // --- 2. Long-term keys ---
    let keys = LongTermKeys::load(&args.private, &args.public)
        .context("failed to load long-term keys")?;
    tracing::info!(
        identity = %keys.identity.public_key().fingerprint(),
        workload = %keys.peer.fingerprint(),
        "long-term keys loaded"
    );

    // --- 3. Outbound TLS configuration ---
    let tls = TlsClient::new(&TlsClientOptions {
        remote_host: args.remote_ip.clone(),
        remote_port: args.remote_port,
        ca_path: args.ca_path.clone(),
        client_cert: args.client_cert.clone(),
        client_key: args.client_key.clone(),
    })
    .context("failed to build the TLS client configuration")?;

    // --- 4. Supervisor + shutdown handler ---
    let supervisor = Supervisor::new(
        SupervisorConfig {
            listen_port: args.local_port,
            maxconn: args.session_limit(),
        },
        keys,
        tls,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    supervisor
        .serve(shutdown_rx)
        .await
        .with_context(|| format!("failed to listen on port {}", args.local_port))?;

    tracing::info!("keybridge-proxy stopped");
    Ok(())
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
