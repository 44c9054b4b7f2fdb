//! # TLS Client
//!
//! The outbound leg of the relay: a verifying TLS 1.2+ client for the
//! remote key server, built on rustls.
//!
//! Policy, fixed and not negotiable at runtime:
//!
//! - The server certificate is always verified. There is no insecure mode;
//!   a proxy that shovels key material to an unauthenticated endpoint is
//!   worse than no proxy. (Chain building is bounded inside rustls, so a
//!   hostile chain cannot send the verifier spelunking.)
//! - Trust anchors come from the operator's CA bundle when one is
//!   configured, exclusively; otherwise from the bundled webpki roots.
//! - SNI and hostname verification both bind to the configured remote host.
//! - Client certificate and key are presented for mutual TLS when both are
//!   configured. One without the other is a configuration error.
//!
//! Certificate rejection is surfaced as its own error kind, with the
//! verifier's reason text, because "the key server's cert expired" and "the
//! key server is unreachable" page two different teams.

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Errors building or using the TLS client. Build-time variants are
/// startup-fatal; connect-time variants are session-fatal.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no PEM certificates found in {path}")]
    NoCertificates { path: PathBuf },

    #[error("invalid PEM certificate in {path}")]
    BadCertificate { path: PathBuf },

    #[error("invalid PEM private key in {path}")]
    BadPrivateKey { path: PathBuf },

    #[error("mutual TLS needs both a client key and a client certificate, or neither")]
    ClientAuthConfig,

    #[error("'{host}' is not a valid TLS server name")]
    InvalidServerName { host: String },

    #[error("TLS client configuration rejected: {0}")]
    Config(#[source] rustls::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The server's certificate chain failed verification. Carries the
    /// verifier's reason so the log line says *why* (expired, unknown
    /// issuer, name mismatch, ...).
    #[error("server certificate verification failed: {reason}")]
    CertVerify { reason: String },

    #[error("TLS handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("TLS I/O failed: {0}")]
    Io(#[source] io::Error),
}

/// Everything the operator can configure about the outbound connection.
#[derive(Debug, Clone)]
pub struct TlsClientOptions {
    /// Remote host. Drives DNS resolution, SNI, and hostname verification,
    /// all three from the same string.
    pub remote_host: String,
    pub remote_port: u16,
    /// Trust-anchor bundle (PEM). When set it is the *only* source of
    /// trust; when unset the bundled webpki roots apply.
    pub ca_path: Option<PathBuf>,
    /// Client certificate chain (PEM) for mutual TLS.
    pub client_cert: Option<PathBuf>,
    /// Client private key (PEM) for mutual TLS.
    pub client_key: Option<PathBuf>,
}

/// A ready-to-dial TLS client. Built once at startup, shared read-only by
/// every session.
pub struct TlsClient {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    remote_host: String,
    remote_port: u16,
}

impl TlsClient {
    /// Validate the options and build the client configuration.
    ///
    /// All file I/O and parsing happens here, once — a session never pays
    /// for it and never sees a config-shaped error.
    pub fn new(options: &TlsClientOptions) -> Result<Self, TlsError> {
        let roots = match &options.ca_path {
            Some(path) => {
                let mut roots = RootCertStore::empty();
                for cert in load_certs(path)? {
                    roots.add(cert).map_err(|_| TlsError::BadCertificate {
                        path: path.clone(),
                    })?;
                }
                roots
            }
            None => {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                roots
            }
        };

        // TLS 1.2 is the floor; rustls knows nothing older.
        let builder = ClientConfig::builder_with_protocol_versions(&[
            &rustls::version::TLS13,
            &rustls::version::TLS12,
        ])
        .with_root_certificates(roots);

        let config = match (&options.client_cert, &options.client_key) {
            (Some(cert_path), Some(key_path)) => {
                let certs = load_certs(cert_path)?;
                let key = load_private_key(key_path)?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(TlsError::Config)?
            }
            (None, None) => builder.with_no_client_auth(),
            _ => return Err(TlsError::ClientAuthConfig),
        };

        let server_name = ServerName::try_from(options.remote_host.clone()).map_err(|_| {
            TlsError::InvalidServerName {
                host: options.remote_host.clone(),
            }
        })?;

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
            remote_host: options.remote_host.clone(),
            remote_port: options.remote_port,
        })
    }

    /// Dial the remote endpoint and run the TLS handshake.
    ///
    /// Returns a stream whose `shutdown()` sends close-notify. A zero-byte
    /// read on it means the server closed.
    pub async fn connect(&self) -> Result<TlsStream<TcpStream>, TlsError> {
        let addr = format!("{}:{}", self.remote_host, self.remote_port);
        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|source| TlsError::Connect {
                addr: addr.clone(),
                source,
            })?;
        tcp.set_nodelay(true).map_err(TlsError::Io)?;

        self.connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(classify_handshake_error)
    }

    /// The remote endpoint this client dials, for log lines.
    pub fn remote_addr(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

/// tokio-rustls reports handshake failures as `io::Error` with the rustls
/// error tucked inside. Pull it out so certificate rejection keeps its own
/// kind instead of blurring into "connection problem".
fn classify_handshake_error(err: io::Error) -> TlsError {
    let Some(inner) = err.get_ref() else {
        return TlsError::Io(err);
    };
    let Some(tls_err) = inner.downcast_ref::<rustls::Error>() else {
        return TlsError::Io(err);
    };
    match tls_err {
        rustls::Error::InvalidCertificate(_) => TlsError::CertVerify {
            reason: tls_err.to_string(),
        },
        other => TlsError::Handshake {
            reason: other.to_string(),
        },
    }
}

/// Load every certificate from a PEM file.
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = std::fs::File::open(path).map_err(|source| TlsError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| TlsError::BadCertificate {
            path: path.to_path_buf(),
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

/// Load the first private key from a PEM file (PKCS#8, PKCS#1, or SEC1).
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = std::fs::File::open(path).map_err(|source| TlsError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .ok()
        .flatten()
        .ok_or_else(|| TlsError::BadPrivateKey {
            path: path.to_path_buf(),
        })
}
