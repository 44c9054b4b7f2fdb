//! # Long-Term Key Management
//!
//! Ed25519 identities for the two ends of the inbound channel: the proxy's
//! own signing key and the workload's verification key. These are the only
//! long-lived secrets in the process — everything else is per-session and
//! ephemeral.
//!
//! Keys arrive as PEM files provisioned by the operator: PKCS#8 for the
//! private key, SPKI for the peer's public key. Loading happens once at
//! startup; a parse failure there is startup-fatal by policy, so the error
//! kinds carry the offending path (and never the offending bytes).
//!
//! ## Security considerations
//!
//! - Private keys are zeroized on drop (thanks, ed25519-dalek).
//! - Key bytes are never logged. If you add logging to this module,
//!   you will be asked to leave.
//! - Error messages stay vague about *why* parsing failed — leaking
//!   structural details of key material through errors is a classic footgun.

use std::fmt;
use std::path::{Path, PathBuf};

use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::config::SIGNATURE_LENGTH;

/// Errors that can occur while loading or using long-term keys.
///
/// Every variant names the file it came from so the operator can fix the
/// provisioning, and nothing more.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid private key in {path}: not an Ed25519 PKCS#8 PEM")]
    ParsePrivate { path: PathBuf },

    #[error("invalid public key in {path}: not an Ed25519 SPKI PEM")]
    ParsePublic { path: PathBuf },

    #[error("invalid signature bytes: expected {SIGNATURE_LENGTH} bytes")]
    InvalidSignature,
}

/// The proxy's long-term identity: an Ed25519 keypair used solely to sign
/// ephemeral handshake contributions.
///
/// The signing key is the crown jewel of the deployment — whoever holds it
/// can impersonate this proxy to the workload. Guard the PEM file
/// accordingly (0600, no backups in chat channels).
pub struct IdentityKeypair {
    signing_key: SigningKey,
}

/// The public half of an identity, safe to hand to the other side.
///
/// The proxy holds one of these for the workload (pre-provisioned) and the
/// workload holds one for the proxy. It can verify contribution signatures
/// and nothing else.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerPublicKey {
    verifying_key: VerifyingKey,
}

/// An Ed25519 signature over a handshake contribution. Always 64 bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: [u8; SIGNATURE_LENGTH],
}

/// Everything the supervisor shares read-only with every session: our own
/// signing identity plus the expected peer's verification key.
pub struct LongTermKeys {
    pub identity: IdentityKeypair,
    pub peer: PeerPublicKey,
}

impl IdentityKeypair {
    /// Generate a fresh identity using the OS cryptographic RNG.
    ///
    /// Used by tests and provisioning tooling. A deployment normally loads
    /// its identity from disk instead.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    ///
    /// In Ed25519 the 32-byte secret key *is* the seed. Feed this something
    /// from a proper CSPRNG or KDF, or you get a weak key and deserve it.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse a PKCS#8 PEM private key.
    pub fn from_pem(pem: &str) -> Option<Self> {
        let signing_key = SigningKey::from_pkcs8_pem(pem).ok()?;
        Some(Self { signing_key })
    }

    /// Load the proxy's signing key from a PKCS#8 PEM file.
    ///
    /// This is the startup path. Failures carry the path so the operator
    /// knows which flag to fix.
    pub fn from_pem_file(path: &Path) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path).map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_pem(&pem).ok_or_else(|| KeyError::ParsePrivate {
            path: path.to_path_buf(),
        })
    }

    /// Serialize the private key as PKCS#8 PEM.
    ///
    /// The returned string wrapper zeroizes on drop, but once you write it
    /// to disk its protection is the filesystem's problem. Used by tests and
    /// provisioning tooling.
    pub fn to_pem(&self) -> zeroize::Zeroizing<String> {
        self.signing_key
            .to_pkcs8_pem(Default::default())
            .expect("PKCS#8 encoding of a valid Ed25519 key cannot fail")
    }

    /// The public half of this identity, as the peer would hold it.
    pub fn public_key(&self) -> PeerPublicKey {
        PeerPublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Serialize the public half as SPKI PEM, for provisioning the other
    /// side of the channel.
    pub fn public_key_pem(&self) -> String {
        self.signing_key
            .verifying_key()
            .to_public_key_pem(Default::default())
            .expect("SPKI encoding of a valid Ed25519 key cannot fail")
    }

    /// Sign a message (in practice: an ephemeral contribution).
    ///
    /// Ed25519 signatures are deterministic — no nonce management, no
    /// RNG-at-signing-time disasters.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            bytes: self.signing_key.sign(message).to_bytes(),
        }
    }
}

impl Clone for IdentityKeypair {
    /// Cloning a keypair is allowed but should make you uncomfortable.
    /// Every copy of a private key is another thing to protect.
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for IdentityKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material in debug output. Not even
        // "partially" — grepping logs for hex is trivial.
        write!(f, "IdentityKeypair(pub={})", self.public_key().fingerprint())
    }
}

// ---------------------------------------------------------------------------
// PeerPublicKey
// ---------------------------------------------------------------------------

impl PeerPublicKey {
    /// Parse an SPKI PEM public key.
    pub fn from_pem(pem: &str) -> Option<Self> {
        let verifying_key = VerifyingKey::from_public_key_pem(pem).ok()?;
        Some(Self { verifying_key })
    }

    /// Load the expected peer's verification key from an SPKI PEM file.
    pub fn from_pem_file(path: &Path) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path).map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_pem(&pem).ok_or_else(|| KeyError::ParsePublic {
            path: path.to_path_buf(),
        })
    }

    /// Try to build a key from raw bytes.
    ///
    /// Validates that the bytes decode to a curve point — some 32-byte
    /// values don't, and those must not reach the verifier.
    pub fn try_from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes).ok()?;
        Some(Self { verifying_key })
    }

    /// Verify a contribution signature.
    ///
    /// Returns a plain boolean: callers want yes or no, and a detailed
    /// failure oracle helps nobody we like.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let sig = DalekSignature::from_bytes(&signature.bytes);
        self.verifying_key.verify(message, &sig).is_ok()
    }

    /// Raw key bytes (32 bytes). Public material, safe to share.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.verifying_key.as_bytes()
    }

    /// Short hex fingerprint for log lines. Enough to tell identities apart,
    /// not enough to pretend it's a security feature.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.verifying_key.as_bytes()[..4])
    }

    /// Full hex encoding of the key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }
}

impl fmt::Display for PeerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PeerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerPublicKey({})", self.fingerprint())
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

impl Signature {
    /// Build a signature from a wire blob, rejecting anything that isn't
    /// exactly 64 bytes.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; SIGNATURE_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self { bytes })
    }

    /// Raw signature bytes for the wire.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.bytes
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = hex::encode(self.bytes);
        write!(f, "Signature({}...{})", &hex_str[..8], &hex_str[120..])
    }
}

// ---------------------------------------------------------------------------
// LongTermKeys
// ---------------------------------------------------------------------------

impl LongTermKeys {
    /// Load both halves of the trust relationship from their PEM files.
    ///
    /// Either both load or the whole thing fails — there is no useful state
    /// with only one of them.
    pub fn load(private_path: &Path, public_path: &Path) -> Result<Self, KeyError> {
        let identity = IdentityKeypair::from_pem_file(private_path)?;
        let peer = PeerPublicKey::from_pem_file(public_path)?;
        Ok(Self { identity, peer })
    }
}

impl fmt::Debug for LongTermKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongTermKeys")
            .field("identity", &self.identity)
            .field("peer", &self.peer)
            .finish()
    }
}
