//! hyrp router
//!
//! QUIC-fronted connection router for the game protocol. A client opens
//! a QUIC connection, sends a Connect packet on its first stream, and
//! receives exactly one reply: a ClientReferral steering it to a chosen
//! backend, or a Disconnect with a locale-resolved reason. The router
//! never proxies game traffic; the client reconnects to the referred
//! backend directly.

pub mod config;
pub mod messages;
pub mod server;
pub mod streams;
pub mod tls;
