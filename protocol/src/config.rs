//! # Protocol Configuration & Constants
//!
//! Every magic number in keybridge lives here. If you're hardcoding a
//! constant somewhere else, you're doing it wrong and you owe the team
//! coffee.
//!
//! Both endpoints of the inbound channel must agree on every value in this
//! file — the wire format has no negotiation, on purpose. Changing a constant
//! here means redeploying the workload side in lockstep.

// ---------------------------------------------------------------------------
// Wire Framing
// ---------------------------------------------------------------------------

/// Length-prefix size on the inbound channel. Every frame starts with an
/// unsigned 64-bit big-endian byte count.
pub const FRAME_PREFIX_LEN: usize = 8;

/// Maximum relayed payload per frame, in plaintext bytes. One TLS read is
/// bounded by the same constant, which is the relay's only backpressure
/// mechanism: one bounded read per direction per loop turn.
pub const MAX_PLAINTEXT_LEN: usize = 64 * 1024;

/// Maximum frame body accepted off the wire. Sealed frames carry the GCM
/// authentication tag on top of the plaintext, so the wire bound is the
/// plaintext bound plus the tag.
pub const MAX_FRAME_LEN: u64 = (MAX_PLAINTEXT_LEN + AES_TAG_LENGTH) as u64;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 signatures authenticate the handshake contributions.
/// Deterministic, compact, and nobody has broken it.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// X25519 for the ephemeral key agreement. Same curve as Ed25519 but in
/// Montgomery form.
pub const KEY_EXCHANGE_ALGORITHM: &str = "X25519";

/// An X25519 public contribution is a 32-byte point encoding.
pub const CONTRIBUTION_LENGTH: usize = 32;

/// AES-256-GCM protects every post-handshake frame. 256-bit keys, 96-bit
/// nonces, 128-bit authentication tags.
pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. 96 bits, the standard GCM size.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Domain-separation context for the session-key derivation. BLAKE3's
/// `derive_key` mode keys its internal IV off this string, so session keys
/// cannot collide with any other BLAKE3 use anywhere.
pub const SESSION_KDF_CONTEXT: &str = "keybridge v1 relay session key";

// ---------------------------------------------------------------------------
// Nonce Direction Tags
// ---------------------------------------------------------------------------
//
// A 96-bit GCM nonce is composed as `tag (4 bytes, BE) || counter (8 bytes,
// BE)`. The two directions use distinct tags so a (key, nonce) pair can never
// repeat across directions even when the counters align, and a frame
// reflected back at its sender can never authenticate.

/// Nonce tag for frames sealed by the workload, opened by the proxy.
pub const DIR_WORKLOAD_TO_PROXY: u32 = 0x4B42_0001; // "KB" + 1

/// Nonce tag for frames sealed by the proxy, opened by the workload.
pub const DIR_PROXY_TO_WORKLOAD: u32 = 0x4B42_0002; // "KB" + 2

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_tags_are_distinct() {
        // If these collide, nonce separation between directions is gone and
        // the whole channel design is void.
        assert_ne!(DIR_WORKLOAD_TO_PROXY, DIR_PROXY_TO_WORKLOAD);
    }

    #[test]
    fn frame_bound_covers_sealed_payload() {
        // A maximum-size plaintext, once sealed, must still fit in a frame.
        assert_eq!(MAX_FRAME_LEN, (MAX_PLAINTEXT_LEN + AES_TAG_LENGTH) as u64);
        assert!(MAX_FRAME_LEN > MAX_PLAINTEXT_LEN as u64);
    }

    #[test]
    fn crypto_parameter_sizes() {
        assert_eq!(SIGNATURE_LENGTH, 64);
        assert_eq!(CONTRIBUTION_LENGTH, 32);
        assert_eq!(AES_KEY_LENGTH, 32);
        assert_eq!(AES_NONCE_LENGTH, 12);
        assert_eq!(AES_TAG_LENGTH, 16);
        // tag (4) + counter (8) must compose exactly one GCM nonce.
        assert_eq!(4 + 8, AES_NONCE_LENGTH);
    }
}
