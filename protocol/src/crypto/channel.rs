//! # AEAD Channel
//!
//! Post-handshake protection for the inbound channel. Every relayed payload
//! is sealed with AES-256-GCM under the session key before it becomes a
//! frame body, and every received frame body must open cleanly before a
//! single byte of it goes anywhere.
//!
//! ## Nonce discipline
//!
//! GCM is notoriously unforgiving about nonce reuse: two messages under the
//! same (key, nonce) and an attacker recovers plaintext XOR *and* can forge
//! tags. Game over. The construction here makes reuse structurally
//! impossible for the lifetime of a key:
//!
//! - each 96-bit nonce is `direction tag (4 bytes) || counter (8 bytes)`,
//!   both big-endian;
//! - the counter increments by exactly one per sealed frame and refuses to
//!   wrap — exhaustion kills the session instead;
//! - the two directions carry distinct tags, so even aligned counters never
//!   collide, and a frame reflected back at its sender never authenticates.
//!
//! Both sides run the same counters in lockstep; there is no nonce on the
//! wire. A lost or reordered frame therefore shows up as an authentication
//! failure — which is fatal, never retried, because after tampering or
//! desynchronization there is nothing left worth saving.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use zeroize::Zeroize;

use super::handshake::SessionKey;
use crate::config::{
    AES_NONCE_LENGTH, AES_TAG_LENGTH, DIR_PROXY_TO_WORKLOAD, DIR_WORKLOAD_TO_PROXY,
    MAX_PLAINTEXT_LEN,
};
use crate::net::frame::{self, FrameError};

/// Errors on the sealed channel. Every one of them ends the session.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The frame did not authenticate. Tampering, truncation past the codec,
    /// or counter desynchronization — we don't distinguish, on purpose.
    #[error("frame failed authentication")]
    AuthFailure,

    #[error("nonce counter exhausted for this session key")]
    NonceExhausted,

    #[error("payload of {len} bytes exceeds the {MAX_PLAINTEXT_LEN}-byte frame limit")]
    Oversize { len: usize },

    #[error("payload sealing failed")]
    SealFailed,
}

/// Composes the 96-bit nonce from a direction tag and a frame counter.
fn compose_nonce(tag: u32, counter: u64) -> [u8; AES_NONCE_LENGTH] {
    let mut nonce = [0u8; AES_NONCE_LENGTH];
    nonce[..4].copy_from_slice(&tag.to_be_bytes());
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// The sealing half of a direction: cipher, direction tag, send counter.
pub struct SealKey {
    cipher: Aes256Gcm,
    tag: u32,
    counter: u64,
}

impl SealKey {
    fn new(key: &SessionKey, tag: u32) -> Self {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .expect("session key length is fixed at 32 bytes");
        Self {
            cipher,
            tag,
            counter: 0,
        }
    }

    /// Seal one payload into a frame body and advance the counter.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(ChannelError::Oversize {
                len: plaintext.len(),
            });
        }
        // Refuse the last counter value rather than use it and poison the
        // next call — no (key, direction, counter) triple is ever reused.
        let next = self
            .counter
            .checked_add(1)
            .ok_or(ChannelError::NonceExhausted)?;

        let nonce = compose_nonce(self.tag, self.counter);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| ChannelError::SealFailed)?;
        self.counter = next;
        Ok(sealed)
    }

    #[cfg(test)]
    fn set_counter(&mut self, counter: u64) {
        self.counter = counter;
    }
}

/// The opening half of a direction: cipher, the peer's direction tag,
/// receive counter.
pub struct OpenKey {
    cipher: Aes256Gcm,
    tag: u32,
    counter: u64,
}

impl OpenKey {
    fn new(key: &SessionKey, tag: u32) -> Self {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .expect("session key length is fixed at 32 bytes");
        Self {
            cipher,
            tag,
            counter: 0,
        }
    }

    /// Open one frame body under the expected nonce and advance the counter.
    pub fn open(&mut self, sealed: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if sealed.len() < AES_TAG_LENGTH {
            // Too short to even carry a tag; same verdict as a bad tag.
            return Err(ChannelError::AuthFailure);
        }
        let next = self
            .counter
            .checked_add(1)
            .ok_or(ChannelError::NonceExhausted)?;

        let nonce = compose_nonce(self.tag, self.counter);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), sealed)
            .map_err(|_| ChannelError::AuthFailure)?;
        self.counter = next;
        Ok(plaintext)
    }

    #[cfg(test)]
    fn set_counter(&mut self, counter: u64) {
        self.counter = counter;
    }
}

/// Both directions of an established session, as handed out by the
/// handshake: `seal` for what we transmit, `open` for what the peer does.
pub struct SessionCrypto {
    pub seal: SealKey,
    pub open: OpenKey,
}

impl SessionCrypto {
    /// Channel halves for the proxy side (handshake responder).
    pub fn responder(key: &SessionKey) -> Self {
        Self {
            seal: SealKey::new(key, DIR_PROXY_TO_WORKLOAD),
            open: OpenKey::new(key, DIR_WORKLOAD_TO_PROXY),
        }
    }

    /// Channel halves for the workload side (handshake initiator).
    pub fn initiator(key: &SessionKey) -> Self {
        Self {
            seal: SealKey::new(key, DIR_WORKLOAD_TO_PROXY),
            open: OpenKey::new(key, DIR_PROXY_TO_WORKLOAD),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec-integrated halves
// ---------------------------------------------------------------------------

/// Receiving side of the sealed channel over a stream half.
pub struct SecureReader<R> {
    inner: R,
    open: OpenKey,
}

impl<R: AsyncRead + Unpin> SecureReader<R> {
    pub fn new(inner: R, open: OpenKey) -> Self {
        Self { inner, open }
    }

    /// Read one frame and open it. `Ok(None)` means the peer closed cleanly
    /// on a frame boundary.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        let mut sealed = match frame::read_frame(&mut self.inner).await? {
            None => return Ok(None),
            Some(body) => body,
        };
        let result = self.open.open(&sealed);
        sealed.zeroize();
        result.map(Some)
    }
}

/// Sending side of the sealed channel over a stream half.
pub struct SecureWriter<W> {
    inner: W,
    seal: SealKey,
}

impl<W: AsyncWrite + Unpin> SecureWriter<W> {
    pub fn new(inner: W, seal: SealKey) -> Self {
        Self { inner, seal }
    }

    /// Seal one payload and write it as a single frame.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        let sealed = self.seal.seal(payload)?;
        frame::write_frame(&mut self.inner, &sealed).await?;
        Ok(())
    }

    /// The underlying stream half, for shutdown at teardown time.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::handshake::SessionKey;

    fn test_pair() -> (SessionCrypto, SessionCrypto) {
        let key = SessionKey::from_bytes([7u8; 32]);
        (SessionCrypto::responder(&key), SessionCrypto::initiator(&key))
    }

    #[test]
    fn seal_open_roundtrip() {
        let (mut proxy, mut workload) = test_pair();
        let sealed = workload.seal.seal(b"hello").unwrap();
        assert_eq!(proxy.open.open(&sealed).unwrap(), b"hello");
    }

    #[test]
    fn empty_payload_roundtrip() {
        let (mut proxy, mut workload) = test_pair();
        let sealed = workload.seal.seal(b"").unwrap();
        assert_eq!(sealed.len(), AES_TAG_LENGTH);
        assert!(proxy.open.open(&sealed).unwrap().is_empty());
    }

    #[test]
    fn any_single_bit_flip_fails_authentication() {
        let (mut proxy, mut workload) = test_pair();
        let sealed = workload.seal.seal(b"sensitive payload").unwrap();

        for byte in 0..sealed.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered[byte] ^= 1 << bit;
                // A fresh opener each time: the victim sees this as frame 0.
                let key = SessionKey::from_bytes([7u8; 32]);
                let mut crypto = SessionCrypto::responder(&key);
                assert!(
                    matches!(crypto.open.open(&tampered), Err(ChannelError::AuthFailure)),
                    "flip at byte {byte} bit {bit} must not authenticate"
                );
            }
        }
        // The untampered frame still opens.
        assert!(proxy.open.open(&sealed).is_ok());
    }

    #[test]
    fn directions_do_not_cross() {
        // A frame sealed proxy→workload must not open as workload→proxy,
        // even at identical counter values: the direction tags differ.
        let (mut proxy_a, _) = test_pair();
        let (mut proxy_b, _) = test_pair();
        let sealed = proxy_a.seal.seal(b"reflected").unwrap();
        assert!(matches!(
            proxy_b.open.open(&sealed),
            Err(ChannelError::AuthFailure)
        ));
    }

    #[test]
    fn counters_advance_in_lockstep() {
        let (mut proxy, mut workload) = test_pair();
        for i in 0u32..16 {
            let msg = i.to_be_bytes();
            let sealed = workload.seal.seal(&msg).unwrap();
            assert_eq!(proxy.open.open(&sealed).unwrap(), msg);
        }
    }

    #[test]
    fn skipped_frame_desynchronizes_fatally() {
        let (mut proxy, mut workload) = test_pair();
        let _lost = workload.seal.seal(b"frame zero, dropped by attacker").unwrap();
        let second = workload.seal.seal(b"frame one").unwrap();
        // The receiver still expects counter 0; the gap must not decrypt.
        assert!(matches!(
            proxy.open.open(&second),
            Err(ChannelError::AuthFailure)
        ));
    }

    #[test]
    fn replayed_frame_fails() {
        let (mut proxy, mut workload) = test_pair();
        let sealed = workload.seal.seal(b"pay the invoice").unwrap();
        assert!(proxy.open.open(&sealed).is_ok());
        // Same bytes again: receiver counter has moved on.
        assert!(matches!(
            proxy.open.open(&sealed),
            Err(ChannelError::AuthFailure)
        ));
    }

    #[test]
    fn counter_exhaustion_is_fatal_not_wrapping() {
        let (mut proxy, mut workload) = test_pair();
        workload.seal.set_counter(u64::MAX);
        assert!(matches!(
            workload.seal.seal(b"one too many"),
            Err(ChannelError::NonceExhausted)
        ));

        proxy.open.set_counter(u64::MAX);
        assert!(matches!(
            proxy.open.open(&[0u8; 32]),
            Err(ChannelError::NonceExhausted)
        ));
    }

    #[test]
    fn oversize_payload_refused_before_sealing() {
        let (_, mut workload) = test_pair();
        let huge = vec![0u8; MAX_PLAINTEXT_LEN + 1];
        assert!(matches!(
            workload.seal.seal(&huge),
            Err(ChannelError::Oversize { .. })
        ));
    }

    #[test]
    fn short_ciphertext_is_auth_failure() {
        let (mut proxy, _) = test_pair();
        assert!(matches!(
            proxy.open.open(&[0u8; AES_TAG_LENGTH - 1]),
            Err(ChannelError::AuthFailure)
        ));
    }

    #[test]
    fn nonce_composition_is_tag_then_counter() {
        let nonce = compose_nonce(0x01020304, 0x05060708090a0b0c);
        assert_eq!(
            nonce,
            [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c]
        );
    }

    #[tokio::test]
    async fn secure_halves_over_a_socket_pair() {
        let (a, b) = tokio::io::duplex(4096);
        let key = SessionKey::from_bytes([9u8; 32]);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);

        let workload_crypto = SessionCrypto::initiator(&key);
        let proxy_crypto = SessionCrypto::responder(&key);

        let mut workload_tx = SecureWriter::new(a_write, workload_crypto.seal);
        let mut workload_rx = SecureReader::new(a_read, workload_crypto.open);
        let mut proxy_tx = SecureWriter::new(b_write, proxy_crypto.seal);
        let mut proxy_rx = SecureReader::new(b_read, proxy_crypto.open);

        workload_tx.send(b"hello").await.unwrap();
        assert_eq!(proxy_rx.recv().await.unwrap().unwrap(), b"hello");

        proxy_tx.send(b"world").await.unwrap();
        assert_eq!(workload_rx.recv().await.unwrap().unwrap(), b"world");

        drop(workload_tx);
        drop(workload_rx);
        assert!(proxy_rx.recv().await.unwrap().is_none());
    }
}
