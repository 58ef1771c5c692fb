//! pf-collect - point-and-figure market data collection.
//!
//! The heart of the crate is [`stream`], a resilient secure streaming
//! client that maintains a long-lived WebSocket-over-TLS connection to a
//! market data provider, with watchdog timeouts on every blocking phase,
//! a serialized outbound queue, and an externally triggerable shutdown
//! path. Supporting modules cover configuration, provider subscribe
//! frames, and the frame-consuming collector.

pub mod collector;
pub mod config;
pub mod error;
pub mod feed;
pub mod stream;
