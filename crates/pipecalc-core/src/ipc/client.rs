//! Calculator client session.
//!
//! Connects once, then performs one full write/read round trip per call.
//! Calls take `&mut self`, so a session can never have two requests in
//! flight.
//!
//! Any failed round trip leaves the session unusable: the framing position
//! on the channel is unknown, so later calls fail fast instead of reading
//! the tail of an abandoned frame.

use super::protocol::{read_result, write_request, Operation, Request};
use super::transport::{self, ClientStream};
use crate::cancel::{with_cancellation, CancellationToken};
use crate::config::PipeName;
use crate::{PipeCalcError, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Client side of a calculator channel.
#[derive(Debug)]
pub struct CalculatorClient<T = ClientStream> {
    stream: T,
    usable: bool,
}

impl CalculatorClient<ClientStream> {
    /// Connect to the server listening on `name`.
    ///
    /// Fails with `ConnectFailed` if no server is listening.
    pub async fn connect(name: &PipeName) -> Result<Self> {
        let stream = transport::connect(name).await?;
        debug!("Client connected to {}", name);
        Ok(Self::from_stream(stream))
    }
}

impl<T> CalculatorClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected duplex stream.
    pub fn from_stream(stream: T) -> Self {
        Self {
            stream,
            usable: true,
        }
    }

    /// Whether the session can still carry requests.
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    /// Send one request and wait for its result.
    pub async fn send_request(&mut self, operation: Operation, lhs: i32, rhs: i32) -> Result<i32> {
        self.ensure_usable()?;
        let result = self.round_trip(Request::new(operation, lhs, rhs)).await;
        self.settle(result)
    }

    /// Like [`send_request`](Self::send_request), but gives up with
    /// `Cancelled` when `token` fires first.
    pub async fn send_request_cancellable(
        &mut self,
        operation: Operation,
        lhs: i32,
        rhs: i32,
        token: &CancellationToken,
    ) -> Result<i32> {
        self.ensure_usable()?;
        let request = Request::new(operation, lhs, rhs);
        let result = match with_cancellation(self.round_trip(request), token).await {
            Ok(result) => result,
            Err(cancelled) => Err(cancelled.into()),
        };
        self.settle(result)
    }

    /// Shut the channel down.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.usable {
            Ok(())
        } else {
            Err(PipeCalcError::RequestFailed {
                message: "session is closed after an earlier failure".to_string(),
            })
        }
    }

    fn settle(&mut self, result: Result<i32>) -> Result<i32> {
        if let Err(e) = &result {
            debug!("Round trip failed, session no longer usable: {}", e);
            self.usable = false;
        }
        result
    }

    async fn round_trip(&mut self, request: Request) -> Result<i32> {
        write_request(&mut self.stream, &request)
            .await
            .map_err(PipeCalcError::request_failed)?;
        let value = read_result(&mut self.stream).await?;
        debug!(
            "{}({}, {}) -> {}",
            request.operation, request.lhs, request.rhs, value
        );
        Ok(value)
    }
}
