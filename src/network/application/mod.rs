//! # Application Layer Protocols
//!
//! Protocols carried over the node's single TCP connection. Each protocol
//! splits into a stateless codec and a session state machine that only
//! produces bytes for the connection to send.

/// MQTT 3.1.1 codec and session.
pub mod mqtt;
