//! # Networking Layers of keybridge
//!
//! Everything that touches a socket lives here, ordered bottom-up:
//!
//! - **frame** — the length-prefixed codec both handshake and data phases
//!   ride on.
//! - **tls** — the verifying client for the outbound key-server leg.
//! - **session** — one accepted connection, from handshake to teardown.
//! - **supervisor** — the accept loop that owns the long-lived state.

pub mod frame;
pub mod session;
pub mod supervisor;
pub mod tls;

pub use session::{SessionError, SessionStats};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use tls::{TlsClient, TlsClientOptions};
