//! Pipecalc Core - a calculator service over a named duplex channel.
//!
//! A server accepts one client on a named channel (a unix-domain socket or a
//! Windows named pipe) and answers fixed-width add/subtract requests until
//! the client disconnects or the hosting process cancels it.
//!
//! # Example
//!
//! ```rust,ignore
//! use pipecalc_core::{CalculatorClient, CalculatorServer, CancellationToken, Operation, PipeName};
//!
//! #[tokio::main]
//! async fn main() -> pipecalc_core::Result<()> {
//!     let name = PipeName::default();
//!     let token = CancellationToken::new();
//!     let server = CalculatorServer::with_default_service(name.clone()).spawn(token);
//!
//!     let mut client = CalculatorClient::connect(&name).await?;
//!     assert_eq!(client.send_request(Operation::Add, 10, 5).await?, 15);
//!
//!     server.shutdown_and_wait().await?;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod ipc;
pub mod service;

// Re-export commonly used types
pub use cancel::{with_cancellation, CancellationToken, CancelledError};
pub use config::{DemoConfig, PipeConfig, PipeName};
pub use error::{PipeCalcError, Result};
pub use ipc::{
    CalculatorClient, CalculatorServer, Operation, Request, ServerHandle, ServerState,
    ShutdownReason,
};
pub use service::{ArithmeticService, Calculator};
