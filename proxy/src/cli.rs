//! # CLI Interface
//!
//! Defines the command-line surface of `keybridge-proxy` using `clap`
//! derive. The flag names are a contract with the launcher tooling that
//! starts the proxy next to the workload — change them and somebody's
//! deployment scripts break at 3 a.m.

use clap::Parser;
use std::path::PathBuf;

/// keybridge relay proxy.
///
/// Listens on a local port for a confidential workload's ECDHE-protected
/// connection and relays its payloads to a remote key server over verified
/// TLS. One session at a time, nothing persisted, nothing interpreted.
#[derive(Parser, Debug)]
#[command(name = "keybridge-proxy", about = "keybridge relay proxy", version)]
pub struct ProxyCli {
    /// TCP port to listen on for inbound ECDHE connections.
    #[arg(long, env = "KEYBRIDGE_LOCAL_PORT")]
    pub local_port: u16,

    /// PEM path: the proxy's long-term signing private key (PKCS#8).
    #[arg(long, env = "KEYBRIDGE_PRIVATE")]
    pub private: PathBuf,

    /// PEM path: the workload's long-term public verification key (SPKI).
    #[arg(long, env = "KEYBRIDGE_PUBLIC")]
    pub public: PathBuf,

    /// Remote TLS host. Used for connecting, SNI, and certificate
    /// verification — all three against the same name.
    #[arg(long, env = "KEYBRIDGE_REMOTE_IP")]
    pub remote_ip: String,

    /// Remote TLS port.
    #[arg(long, env = "KEYBRIDGE_REMOTE_PORT")]
    pub remote_port: u16,

    /// Trust-anchor bundle (PEM). When set it replaces the built-in roots
    /// entirely; when omitted the webpki root store applies.
    #[arg(long, env = "KEYBRIDGE_CA_PATH")]
    pub ca_path: Option<PathBuf>,

    /// Client TLS private key, for key servers that require mutual TLS.
    #[arg(long, env = "KEYBRIDGE_CLIENT_KEY", requires = "client_cert")]
    pub client_key: Option<PathBuf>,

    /// Client TLS certificate, for key servers that require mutual TLS.
    #[arg(long, env = "KEYBRIDGE_CLIENT_CERT", requires = "client_key")]
    pub client_cert: Option<PathBuf>,

    /// Exit cleanly after this many sessions. Zero or negative means
    /// unlimited.
    #[arg(
        long,
        env = "KEYBRIDGE_MAXCONN",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub maxconn: i64,

    /// Default log filter when RUST_LOG is not set.
    #[arg(long, env = "KEYBRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "KEYBRIDGE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl ProxyCli {
    /// The session limit as the supervisor wants it: zero-or-negative
    /// collapses to "unlimited".
    pub fn session_limit(&self) -> u64 {
        self.maxconn.try_into().unwrap_or(0)
    }
}

/// Check that a log level string is one tracing will accept as a default
/// directive.
pub fn validate_log_level(level: &str) -> bool {
    matches!(
        level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        ProxyCli::command().debug_assert();
    }

    #[test]
    fn minimal_invocation_parses() {
        let cli = ProxyCli::try_parse_from([
            "keybridge-proxy",
            "--local-port",
            "7000",
            "--private",
            "/etc/keybridge/proxy.key.pem",
            "--public",
            "/etc/keybridge/workload.pub.pem",
            "--remote-ip",
            "keys.internal.example.com",
            "--remote-port",
            "8443",
        ])
        .expect("minimal flags should parse");

        assert_eq!(cli.local_port, 7000);
        assert_eq!(cli.remote_port, 8443);
        assert!(cli.ca_path.is_none());
        assert_eq!(cli.session_limit(), 0);
    }

    #[test]
    fn missing_remote_is_an_error() {
        let res = ProxyCli::try_parse_from([
            "keybridge-proxy",
            "--local-port",
            "7000",
            "--private",
            "a.pem",
            "--public",
            "b.pem",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn client_tls_flags_require_each_other() {
        let res = ProxyCli::try_parse_from([
            "keybridge-proxy",
            "--local-port",
            "7000",
            "--private",
            "a.pem",
            "--public",
            "b.pem",
            "--remote-ip",
            "h",
            "--remote-port",
            "1",
            "--client-key",
            "only-the-key.pem",
        ]);
        assert!(res.is_err(), "client key without cert must be rejected");
    }

    #[test]
    fn negative_maxconn_means_unlimited() {
        let cli = ProxyCli::try_parse_from([
            "keybridge-proxy",
            "--local-port",
            "7000",
            "--private",
            "a.pem",
            "--public",
            "b.pem",
            "--remote-ip",
            "h",
            "--remote-port",
            "1",
            "--maxconn=-5",
        ])
        .expect("negative maxconn parses");
        assert_eq!(cli.session_limit(), 0);

        let cli = ProxyCli::try_parse_from([
            "keybridge-proxy",
            "--local-port",
            "7000",
            "--private",
            "a.pem",
            "--public",
            "b.pem",
            "--remote-ip",
            "h",
            "--remote-port",
            "1",
            "--maxconn",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.session_limit(), 2);
    }

    #[test]
    fn log_level_validation() {
        assert!(validate_log_level("info"));
        assert!(validate_log_level("DEBUG"));
        assert!(!validate_log_level("garbage"));
    }
}
