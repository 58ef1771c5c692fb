//! Error taxonomy for the streaming client.
//!
//! Every failure is handled at the point of detection and logged; none of
//! these errors cross the client's public boundary. Callers observe status
//! through `is_connected()` and the stop-completion callback.

use crate::stream::Phase;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of the connection lifecycle. All are terminal for the current
/// `run()` attempt; no retry is performed.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("name resolution failed: {0}")]
    Resolve(#[source] std::io::Error),

    #[error("no addresses resolved for {0}")]
    NoAddresses(String),

    #[error("transport connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("invalid TLS server name: {0}")]
    ServerName(String),

    #[error("TLS handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("protocol upgrade failed: {0}")]
    Upgrade(#[source] tungstenite::Error),

    #[error("illegal phase transition: {from:?} -> {to:?}")]
    IllegalTransition { from: Phase, to: Phase },
}

impl StreamError {
    /// Static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Resolve(_) => "resolve_failed",
            Self::NoAddresses(_) => "no_addresses",
            Self::Connect(_) => "connect_failed",
            Self::ServerName(_) => "invalid_server_name",
            Self::Tls(_) => "tls_handshake_failed",
            Self::Upgrade(_) => "upgrade_failed",
            Self::IllegalTransition { .. } => "illegal_transition",
        }
    }
}
