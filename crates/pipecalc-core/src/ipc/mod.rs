//! Calculator IPC over a named duplex channel.
//!
//! # Architecture
//!
//! - **Protocol**: fixed-width wire codec shared by both sides
//! - **Transport**: unix-domain socket or Windows named pipe behind a shared name
//! - **Server**: accepts one client and answers requests until closed or cancelled
//! - **Client**: connects once and performs one round trip per call

pub mod client;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::CalculatorClient;
pub use protocol::{Operation, Request};
pub use server::{serve_connection, CalculatorServer, ServerHandle, ServerState, ShutdownReason};
pub use transport::PipeListener;
