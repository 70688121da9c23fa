//! Transporter abstraction: the boundary where an exchange leaves Conduit.
//!
//! The [`Transporter`] trait is the contract between the send stage and
//! whatever actually talks to a backend (HTTP, files, a database). Conduit
//! never performs I/O itself; it hands the mapped exchange and the merged
//! service/endpoint options to the service's transporter and takes back the
//! answered exchange.
//!
//! # Implementations
//!
//! | Type | When to use |
//! |------|-------------|
//! | [`MemoryTransporter`] | Tests, the conformance suite, prototyping definitions |
//!
//! Real transporters live with the adapters that need them.
//!
//! [`MemoryTransporter`]: memory::MemoryTransporter

pub mod memory;

use async_trait::async_trait;
use conduit::{Exchange, Options};

/// Carries a mapped exchange to a backend and back.
///
/// Implementations must be `Send + Sync + 'static` so they can be held in an
/// `Arc<dyn Transporter>` shared by every dispatch.
///
/// `send` never fails across this boundary: network errors, rejected
/// requests, and unreadable answers are all reported by resolving the
/// returned exchange with the matching [`Status`](conduit::Status) and an
/// error message. An exchange returned without a status is treated as a bad
/// response by the send stage.
#[async_trait]
pub trait Transporter: Send + Sync + 'static {
    async fn send(&self, exchange: Exchange, options: &Options) -> Exchange;
}
