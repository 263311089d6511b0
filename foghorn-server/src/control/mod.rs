//! The control-plane RPC server (C5, §4.5): one WebSocket per edge node,
//! a `CommandDispatcher` wired to the live connection set, and the wire
//! encoding layer between §6.1's JSON envelope and `foghorn_core`'s typed
//! `Trigger`/`Command`/`Reply`.

pub mod auth;
pub mod connection;
pub mod dispatcher;
pub mod registry;
pub mod wire;
pub mod ws;

pub use connection::Connection;
pub use dispatcher::ControlDispatcher;
pub use registry::ConnectionRegistry;
