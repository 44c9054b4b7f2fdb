//! # Acceptor / Session Supervisor
//!
//! Owns everything that outlives a session: the listener, the long-term
//! keys, the TLS client configuration, and the connection count. Accepts
//! one workload connection at a time and runs its session to completion —
//! the peer pre-forks on its side, so the proxy gains nothing from serving
//! sessions in parallel, and exclusive ownership of per-session state stays
//! trivially true.
//!
//! A session that dies takes nothing with it: the supervisor logs the
//! terminal error and goes back to `accept`. Only startup problems (a port
//! that won't bind) propagate out of here.

use std::net::Ipv4Addr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::session;
use crate::crypto::keys::LongTermKeys;
use crate::net::tls::TlsClient;

/// Supervisor knobs, as handed down from the CLI.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Local TCP port for inbound workload connections.
    pub listen_port: u16,
    /// Stop after this many sessions have been torn down. Zero means run
    /// forever. Failed sessions count: each one was accepted, served, and
    /// torn down, which is what the limit is for.
    pub maxconn: u64,
}

/// The accept loop and the read-only state it shares with every session.
pub struct Supervisor {
    config: SupervisorConfig,
    keys: LongTermKeys,
    tls: TlsClient,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, keys: LongTermKeys, tls: TlsClient) -> Self {
        Self { config, keys, tls }
    }

    /// Bind the configured port. Split out from [`serve_on`](Self::serve_on)
    /// so the caller can treat a bind failure as startup-fatal and so tests
    /// can bind port 0 and learn the real one.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        let listener =
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.config.listen_port)).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            remote = %self.tls.remote_addr(),
            "listening for workload connections"
        );
        Ok(listener)
    }

    /// Bind and serve until shutdown or the connection limit.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = self.bind().await?;
        self.serve_on(listener, shutdown).await;
        Ok(())
    }

    /// Serve sessions from an already-bound listener.
    ///
    /// Returns when the shutdown signal fires (including mid-session: the
    /// session future is dropped, which closes its sockets) or when
    /// `maxconn` sessions have been torn down.
    pub async fn serve_on(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        let mut completed = 0u64;

        loop {
            if self.config.maxconn > 0 && completed >= self.config.maxconn {
                tracing::info!(sessions = completed, "session limit reached, exiting");
                return;
            }

            let (socket, peer) = tokio::select! {
                res = listener.accept() => match res {
                    Ok(conn) => conn,
                    Err(e) => {
                        // Transient accept failures (EMFILE and friends)
                        // must not kill a long-running daemon.
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                },
                _ = shutdown.changed() => {
                    tracing::info!("shutdown signal received");
                    return;
                }
            };

            let _ = socket.set_nodelay(true);
            tracing::info!(%peer, session = completed + 1, "workload connected");

            let served = tokio::select! {
                res = self.serve_session(socket) => Some(res),
                _ = shutdown.changed() => None,
            };

            match served {
                Some(Ok(stats)) => {
                    tracing::info!(
                        %peer,
                        to_remote = stats.to_remote,
                        to_workload = stats.to_workload,
                        "session completed"
                    );
                }
                Some(Err(e)) => {
                    // One line, kind and cause; payload contents never
                    // appear here.
                    tracing::warn!(%peer, error = %e, "session terminated");
                }
                None => {
                    tracing::info!(%peer, "shutdown during active session");
                    return;
                }
            }
            completed += 1;
        }
    }

    async fn serve_session(
        &self,
        socket: TcpStream,
    ) -> Result<session::SessionStats, session::SessionError> {
        session::run(socket, &self.keys, &self.tls).await
    }
}
