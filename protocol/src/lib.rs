// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # keybridge Protocol — Core Library
//!
//! keybridge is a relay proxy for workloads that can hold secrets but cannot
//! speak TLS: a confidential-computing enclave opens a length-framed channel
//! protected by a mutually-authenticated ECDHE handshake, and this library
//! carries every payload byte onward to a remote key server over a verifying
//! TLS 1.2+ client connection. The proxy never interprets what it relays.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the life of a session:
//!
//! - **crypto::keys** — Long-term Ed25519 identities. Loaded once, shared by
//!   every session, never logged.
//! - **crypto::handshake** — Ephemeral X25519 exchange with signed
//!   contributions; derives the per-session AEAD key.
//! - **crypto::channel** — AES-256-GCM sealing with direction-tagged counter
//!   nonces. One authentication failure ends the session, full stop.
//! - **net::frame** — The length-prefixed wire codec underneath everything.
//! - **net::tls** — The verifying rustls client for the outbound leg.
//! - **net::session** — The relay loop and the single teardown path.
//! - **net::supervisor** — Accept loop, session isolation, connection limit.
//! - **config** — Protocol constants and wire parameters.
//!
//! ## Design Philosophy
//!
//! 1. Boring, audited cryptography only. Nothing here is novel on purpose.
//! 2. A session either has a fully established key or it has nothing.
//! 3. Every error kind an operator can see is stable and distinguishable.
//! 4. Key material does not outlive the session that owns it.

pub mod config;
pub mod crypto;
pub mod net;
