//! # ECDHE Handshake
//!
//! Establishes the per-session AEAD key on a freshly accepted socket. Both
//! ends hold long-term Ed25519 identities (see [`super::keys`]); forward
//! secrecy comes from fresh X25519 keypairs generated per session and
//! destroyed the moment the shared secret exists.
//!
//! ## Protocol Flow
//!
//! From the proxy's perspective (the responder):
//!
//! 1. Read the workload's contribution frame (32-byte X25519 public key).
//! 2. Read the workload's signature frame (64-byte Ed25519 signature over
//!    the raw contribution bytes).
//! 3. Verify the signature under the pre-provisioned workload key. On
//!    failure the handshake stops dead — not one more byte is read from or
//!    written to that socket.
//! 4. Generate our own ephemeral keypair, sign our contribution with the
//!    long-term identity key, send contribution frame then signature frame.
//! 5. Compute the shared secret (consuming the ephemeral secret — X25519's
//!    `EphemeralSecret` enforces single use at the type level) and derive
//!    the session key.
//!
//! The workload side ([`initiate`]) runs the mirror order: send first, read
//! second.
//!
//! ## Key Derivation
//!
//! The raw Diffie-Hellman output is NOT used directly as an encryption key —
//! curve points have algebraic structure, not uniform randomness. The
//! session key is BLAKE3's `derive_key` mode over the shared secret and both
//! public contributions:
//!
//! ```text
//! session_key = BLAKE3-derive-key(
//!     context = "keybridge v1 relay session key",
//!     input   = shared_secret || min(contrib_a, contrib_b)
//!                             || max(contrib_a, contrib_b)
//! )
//! ```
//!
//! Including both contributions binds the key to this exact exchange, so an
//! attacker substituting a contribution cannot end up with matching keys on
//! both sides. The contributions are fed in canonical (lexicographic) order
//! so initiator and responder derive identically.

use std::fmt;

use rand::rngs::OsRng;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::channel::SessionCrypto;
use super::keys::{IdentityKeypair, PeerPublicKey, Signature};
use crate::config::{AES_KEY_LENGTH, CONTRIBUTION_LENGTH, SESSION_KDF_CONTEXT, SIGNATURE_LENGTH};
use crate::net::frame::{self, FrameError};

/// Errors during the ECDHE exchange. All terminal: a session whose
/// handshake failed holds no key material and transmits nothing.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("peer closed the connection during the handshake")]
    PeerClosed,

    #[error("peer contribution is not a {CONTRIBUTION_LENGTH}-byte curve point")]
    BadContribution,

    #[error("peer signature blob is not {SIGNATURE_LENGTH} bytes")]
    BadSignature,

    /// The contribution signature did not verify under the provisioned peer
    /// key. Somebody on this socket is not who they claim to be.
    #[error("peer signature verification failed")]
    SignatureRejected,
}

/// The derived 256-bit session key. Zeroized on drop; lives only long
/// enough to construct the two directional ciphers.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; AES_KEY_LENGTH]);

impl SessionKey {
    /// Wrap raw key bytes. Exists for tests and for peers implementing the
    /// workload side out-of-process; production keys come from [`derive`].
    pub fn from_bytes(bytes: [u8; AES_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The one thing this type must never do is print itself.
        write!(f, "SessionKey(..)")
    }
}

/// One side's ephemeral X25519 state, alive only for the handshake.
///
/// The secret half is consumed by [`derive`](Self::derive) — the type system
/// will not let it produce two shared secrets, and dalek zeroizes it on the
/// way out.
pub struct EphemeralExchange {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralExchange {
    /// Generate a fresh ephemeral keypair from the OS RNG.
    pub fn new() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Our public contribution, ready for the wire.
    pub fn contribution(&self) -> [u8; CONTRIBUTION_LENGTH] {
        self.public.to_bytes()
    }

    /// Complete the exchange: compute the shared secret against the peer's
    /// contribution and derive the session key. Consumes the ephemeral
    /// secret.
    pub fn derive(
        self,
        peer_contribution: &[u8; CONTRIBUTION_LENGTH],
    ) -> Result<SessionKey, HandshakeError> {
        let ours = self.public.to_bytes();
        let peer_point = X25519PublicKey::from(*peer_contribution);
        let shared = self.secret.diffie_hellman(&peer_point);
        // A low-order peer point collapses the shared secret to zero; that
        // is not a key exchange, it's a downgrade.
        if !shared.was_contributory() {
            return Err(HandshakeError::BadContribution);
        }
        Ok(derive_session_key(
            shared.as_bytes(),
            &ours,
            peer_contribution,
        ))
    }
}

impl Default for EphemeralExchange {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive the session key from the shared secret and both contributions.
///
/// The contributions are sorted into canonical order first — without this,
/// the initiator would compute KDF(secret, A, B) while the responder
/// computes KDF(secret, B, A), and the two sides would disagree forever.
fn derive_session_key(
    shared_secret: &[u8; 32],
    ours: &[u8; CONTRIBUTION_LENGTH],
    peer: &[u8; CONTRIBUTION_LENGTH],
) -> SessionKey {
    let mut hasher = blake3::Hasher::new_derive_key(SESSION_KDF_CONTEXT);
    hasher.update(shared_secret);

    let (first, second) = if ours <= peer { (ours, peer) } else { (peer, ours) };
    hasher.update(first);
    hasher.update(second);

    let mut key = [0u8; AES_KEY_LENGTH];
    hasher.finalize_xof().fill(&mut key);
    SessionKey(key)
}

// ---------------------------------------------------------------------------
// Wire drivers
// ---------------------------------------------------------------------------

/// Run the responder (proxy) side of the handshake on an accepted stream.
///
/// Reads the peer's signed contribution, verifies it, answers with our own,
/// and returns the established channel halves with both counters at zero.
pub async fn respond<S>(
    stream: &mut S,
    identity: &IdentityKeypair,
    peer: &PeerPublicKey,
) -> Result<SessionCrypto, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (peer_contribution, peer_signature) = read_signed_contribution(stream).await?;
    if !peer.verify(&peer_contribution, &peer_signature) {
        return Err(HandshakeError::SignatureRejected);
    }

    let exchange = EphemeralExchange::new();
    send_signed_contribution(stream, &exchange, identity).await?;

    let key = exchange.derive(&peer_contribution)?;
    Ok(SessionCrypto::responder(&key))
}

/// Run the initiator (workload) side: send our signed contribution first,
/// then read and verify the peer's.
///
/// The proxy itself never initiates; this is the other half of the wire
/// protocol, used by the workload and by every test that plays one.
pub async fn initiate<S>(
    stream: &mut S,
    identity: &IdentityKeypair,
    peer: &PeerPublicKey,
) -> Result<SessionCrypto, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exchange = EphemeralExchange::new();
    send_signed_contribution(stream, &exchange, identity).await?;

    let (peer_contribution, peer_signature) = read_signed_contribution(stream).await?;
    if !peer.verify(&peer_contribution, &peer_signature) {
        return Err(HandshakeError::SignatureRejected);
    }

    let key = exchange.derive(&peer_contribution)?;
    Ok(SessionCrypto::initiator(&key))
}

/// Read the two handshake frames: contribution, then signature.
async fn read_signed_contribution<S>(
    stream: &mut S,
) -> Result<([u8; CONTRIBUTION_LENGTH], Signature), HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let body = frame::read_frame(stream)
        .await?
        .ok_or(HandshakeError::PeerClosed)?;
    let contribution: [u8; CONTRIBUTION_LENGTH] = body
        .as_slice()
        .try_into()
        .map_err(|_| HandshakeError::BadContribution)?;

    let body = frame::read_frame(stream)
        .await?
        .ok_or(HandshakeError::PeerClosed)?;
    let signature =
        Signature::try_from_slice(&body).map_err(|_| HandshakeError::BadSignature)?;

    Ok((contribution, signature))
}

/// Write our two handshake frames: contribution, then signature over it.
async fn send_signed_contribution<S>(
    stream: &mut S,
    exchange: &EphemeralExchange,
    identity: &IdentityKeypair,
) -> Result<(), HandshakeError>
where
    S: AsyncWrite + Unpin,
{
    let contribution = exchange.contribution();
    let signature = identity.sign(&contribution);
    frame::write_frame(stream, &contribution).await?;
    frame::write_frame(stream, signature.as_bytes()).await?;
    Ok(())
}
