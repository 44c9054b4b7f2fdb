//! # Session — Relay Loop & Teardown
//!
//! One accepted connection, start to finish: handshake the inbound channel,
//! dial the remote over TLS, then copy payloads both ways until either side
//! closes or anything at all goes wrong.
//!
//! ## Shape
//!
//! Two directional pumps race inside a `select!`:
//!
//! - **inbound → remote**: receive-and-open one frame, write the plaintext
//!   to the TLS stream. A failed write here is fatal — the inbound frame is
//!   already consumed and cannot be un-committed.
//! - **remote → inbound**: one bounded TLS read, seal-and-send one frame.
//!
//! Each direction performs exactly one bounded read per turn and blocks
//! until it lands; that is the entire backpressure story. There are no
//! queues to fill and no watermarks to tune.
//!
//! Within a turn the inbound direction is polled first — a fairness choice,
//! not a correctness requirement.
//!
//! ## Teardown
//!
//! Every outcome — clean close from either side, relay failure, channel
//! authentication failure — funnels through the same exit: best-effort TLS
//! close-notify, sockets closed on drop, per-session key material already
//! zeroized by its own drop guards. The supervisor outlives all of it.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use zeroize::Zeroizing;

use crate::config::MAX_PLAINTEXT_LEN;
use crate::crypto::channel::{ChannelError, SecureReader, SecureWriter};
use crate::crypto::handshake::{self, HandshakeError};
use crate::crypto::keys::LongTermKeys;
use crate::net::tls::{TlsClient, TlsError};

/// Terminal session failures, each mapping to one operator-visible kind.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("inbound handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("outbound TLS failed: {0}")]
    Tls(#[from] TlsError),

    #[error("inbound channel failed: {0}")]
    Channel(#[from] ChannelError),

    #[error("relay write to the TLS side failed: {0}")]
    RelayWrite(#[source] io::Error),

    #[error("relay read from the TLS side failed: {0}")]
    RelayRead(#[source] io::Error),
}

/// Byte accounting for one completed session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    /// Plaintext bytes relayed workload → key server.
    pub to_remote: u64,
    /// Plaintext bytes relayed key server → workload.
    pub to_workload: u64,
}

/// Which side ended a session that ended well.
#[derive(Debug)]
enum CloseReason {
    WorkloadClosed,
    RemoteClosed,
}

/// Run one session to completion on an accepted inbound socket.
///
/// The TLS dial happens only after the workload has authenticated — an
/// unauthenticated connection never costs the key server a handshake.
pub async fn run(
    mut inbound: TcpStream,
    keys: &LongTermKeys,
    tls: &TlsClient,
) -> Result<SessionStats, SessionError> {
    let crypto = handshake::respond(&mut inbound, &keys.identity, &keys.peer).await?;
    tracing::debug!("inbound handshake complete");

    let tls_stream = tls.connect().await?;
    tracing::debug!(remote = %tls.remote_addr(), "outbound TLS established");

    let (in_read, in_write) = inbound.into_split();
    let mut rx = SecureReader::new(in_read, crypto.open);
    let mut tx = SecureWriter::new(in_write, crypto.seal);
    let (mut tls_read, mut tls_write) = tokio::io::split(tls_stream);

    let mut to_remote = 0u64;
    let mut to_workload = 0u64;

    let outcome = tokio::select! {
        biased;
        r = pump_to_remote(&mut rx, &mut tls_write, &mut to_remote) => r,
        r = pump_to_workload(&mut tls_read, &mut tx, &mut to_workload) => r,
    };

    // Lifecycle gateway. Close-notify is best-effort; the sockets and the
    // directional keys drop with this scope. In-flight data in the losing
    // pump is lost, which is the documented cancellation contract.
    let _ = tls_write.shutdown().await;

    let stats = SessionStats {
        to_remote,
        to_workload,
    };
    match outcome {
        Ok(reason) => {
            tracing::debug!(?reason, "session closed cleanly");
            Ok(stats)
        }
        Err(e) => Err(e),
    }
}

/// Inbound direction: open sealed frames, forward plaintext to TLS.
async fn pump_to_remote<R, W>(
    rx: &mut SecureReader<R>,
    tls_write: &mut W,
    relayed: &mut u64,
) -> Result<CloseReason, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        // Zeroizing: this buffer holds relayed plaintext.
        let payload = match rx.recv().await {
            Ok(Some(p)) => Zeroizing::new(p),
            Ok(None) => return Ok(CloseReason::WorkloadClosed),
            Err(e) => return Err(e.into()),
        };
        tls_write
            .write_all(&payload)
            .await
            .map_err(SessionError::RelayWrite)?;
        tls_write.flush().await.map_err(SessionError::RelayWrite)?;
        *relayed += payload.len() as u64;
    }
}

/// Outbound direction: bounded TLS reads, sealed back to the workload.
async fn pump_to_workload<R, W>(
    tls_read: &mut R,
    tx: &mut SecureWriter<W>,
    relayed: &mut u64,
) -> Result<CloseReason, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Zeroizing::new(vec![0u8; MAX_PLAINTEXT_LEN]);
    loop {
        let n = tls_read
            .read(&mut buf)
            .await
            .map_err(SessionError::RelayRead)?;
        if n == 0 {
            tracing::debug!("key server closed the connection");
            return Ok(CloseReason::RemoteClosed);
        }
        tx.send(&buf[..n]).await?;
        *relayed += n as u64;
    }
}
