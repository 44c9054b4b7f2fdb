//! # Cryptographic Core of keybridge
//!
//! Everything security-relevant on the inbound channel flows through this
//! module: long-term identities, the ephemeral handshake, and the AEAD
//! channel that seals every relayed frame.
//!
//! We deliberately chose boring, well-audited cryptography:
//!
//! - **Ed25519** for contribution signatures — fast, deterministic.
//! - **X25519** for the ephemeral key exchange — same curve, different clothes.
//! - **AES-256-GCM** for frame sealing — AEAD done right.
//! - **BLAKE3** (`derive_key` mode) as the transcript-binding KDF.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. Everything here is a thin, type-safe wrapper around audited
//! implementations, arranged into the relay's session lifecycle. If you're
//! tempted to optimize these functions, please reconsider. Then reconsider
//! again. Then go read about timing attacks and come back when you've lost
//! the urge.

pub mod channel;
pub mod handshake;
pub mod keys;

// Re-export the things people actually need so they don't have to memorize
// our module hierarchy.
pub use channel::{OpenKey, SealKey, SecureReader, SecureWriter, SessionCrypto};
pub use handshake::SessionKey;
pub use keys::{IdentityKeypair, LongTermKeys, PeerPublicKey, Signature};
