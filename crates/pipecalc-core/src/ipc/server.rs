//! Calculator server loop.
//!
//! Binds the named channel, accepts exactly one client, then answers
//! requests one at a time until the peer disconnects, a frame is malformed
//! or the cancellation token fires.
//!
//! # State machine
//!
//! ```text
//! Idle -> WaitingForConnection -> Connected -> Closed
//!                  |                               ^
//!                  +-------------------------------+
//! ```
//!
//! Every read and write is raced against the token. The accepted connection
//! is owned by [`serve_connection`] and shut down exactly once on the way out.

use super::protocol::{read_args, read_operation, write_result};
use super::transport::PipeListener;
use crate::cancel::{with_cancellation, CancellationToken};
use crate::config::PipeName;
use crate::service::{ArithmeticService, Calculator};
use crate::{PipeCalcError, Result};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle state of a [`CalculatorServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    WaitingForConnection,
    Connected,
    Closed,
}

/// Why the server loop stopped.
#[derive(Debug)]
pub enum ShutdownReason {
    /// The peer closed the channel on a frame boundary.
    PeerDisconnected,
    /// The cancellation token fired at a suspension point.
    Cancelled,
    /// A protocol or transport fault ended the connection.
    Fault(PipeCalcError),
}

impl ShutdownReason {
    pub fn is_fault(&self) -> bool {
        matches!(self, ShutdownReason::Fault(_))
    }
}

/// Server hosting an [`ArithmeticService`] on a named channel.
pub struct CalculatorServer<S = Calculator> {
    name: PipeName,
    service: Arc<S>,
    state_tx: watch::Sender<ServerState>,
}

impl CalculatorServer<Calculator> {
    /// Server for the default [`Calculator`].
    pub fn with_default_service(name: PipeName) -> Self {
        Self::new(name, Arc::new(Calculator))
    }
}

impl<S: ArithmeticService> CalculatorServer<S> {
    pub fn new(name: PipeName, service: Arc<S>) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Idle);
        Self {
            name,
            service,
            state_tx,
        }
    }

    pub fn name(&self) -> &PipeName {
        &self.name
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ServerState) {
        debug!("Server {} -> {:?}", self.name, state);
        self.state_tx.send_replace(state);
    }

    /// Run the server to completion.
    ///
    /// Returns `Err` only if the channel could not be bound. Once the server
    /// is waiting, every way out is reported as a [`ShutdownReason`].
    pub async fn start(self, token: CancellationToken) -> Result<ShutdownReason> {
        let listener = match PipeListener::bind(&self.name) {
            Ok(listener) => listener,
            Err(e) => {
                self.set_state(ServerState::Closed);
                return Err(e);
            }
        };

        self.set_state(ServerState::WaitingForConnection);
        info!("Waiting for client connection on {}", self.name);

        let stream = match with_cancellation(listener.accept(), &token).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("Accept on {} failed: {}", self.name, e);
                self.set_state(ServerState::Closed);
                return Ok(ShutdownReason::Fault(e));
            }
            Err(_) => {
                debug!("Server {} cancelled before a client connected", self.name);
                self.set_state(ServerState::Closed);
                return Ok(ShutdownReason::Cancelled);
            }
        };

        self.set_state(ServerState::Connected);
        info!("Client connected on {}", self.name);

        let reason = serve_connection(stream, &*self.service, &token).await;

        self.set_state(ServerState::Closed);
        info!("Server {} closed ({:?})", self.name, reason);
        Ok(reason)
    }

    /// Run the server in a background task.
    pub fn spawn(self, token: CancellationToken) -> ServerHandle {
        let state_rx = self.subscribe();
        let task = tokio::spawn(self.start(token.clone()));
        ServerHandle {
            token,
            state_rx,
            task: Some(task),
        }
    }
}

/// Handle to a spawned server. Dropping it requests cancellation.
pub struct ServerHandle {
    token: CancellationToken,
    state_rx: watch::Receiver<ServerState>,
    task: Option<JoinHandle<Result<ShutdownReason>>>,
}

impl ServerHandle {
    pub fn state(&self) -> ServerState {
        *self.state_rx.borrow()
    }

    /// Wait until the server reaches `target`, or return the state it ended
    /// in if it closed first.
    pub async fn wait_for_state(&mut self, target: ServerState) -> ServerState {
        match self
            .state_rx
            .wait_for(|s| *s == target || *s == ServerState::Closed)
            .await
        {
            Ok(state) => *state,
            Err(_) => ServerState::Closed,
        }
    }

    /// Signal cancellation. The loop stops at its next suspension point.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Wait for the loop to exit, including closing the channel.
    pub async fn wait(mut self) -> Result<ShutdownReason> {
        let Some(task) = self.task.take() else {
            return Ok(ShutdownReason::Cancelled);
        };
        task.await.map_err(|e| PipeCalcError::Io {
            message: format!("server task failed: {}", e),
            source: None,
        })?
    }

    /// Signal cancellation and wait for the loop to exit.
    pub async fn shutdown_and_wait(self) -> Result<ShutdownReason> {
        self.shutdown();
        self.wait().await
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.token.cancel();
        }
    }
}

/// Service one accepted connection until it ends, then close it.
///
/// Takes ownership of `stream`; it is shut down exactly once before this
/// returns, whichever way the loop exits.
pub async fn serve_connection<T, S>(
    mut stream: T,
    service: &S,
    token: &CancellationToken,
) -> ShutdownReason
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: ArithmeticService + ?Sized,
{
    let reason = match request_loop(&mut stream, service, token).await {
        Ok(()) => {
            debug!("Peer disconnected");
            ShutdownReason::PeerDisconnected
        }
        Err(e) if e.is_cancellation() => {
            debug!("Connection cancelled");
            ShutdownReason::Cancelled
        }
        Err(e) if e.is_protocol_violation() => {
            warn!("Protocol violation, closing connection: {}", e);
            ShutdownReason::Fault(e)
        }
        Err(e) => {
            warn!("Channel failed, closing connection: {}", e);
            ShutdownReason::Fault(e)
        }
    };

    close_connection(stream).await;
    reason
}

async fn close_connection<T: AsyncWrite + Unpin>(mut stream: T) {
    if let Err(e) = stream.shutdown().await {
        debug!("Channel shutdown failed: {}", e);
    }
}

async fn request_loop<T, S>(stream: &mut T, service: &S, token: &CancellationToken) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: ArithmeticService + ?Sized,
{
    loop {
        let Some(operation) = with_cancellation(read_operation(stream), token).await?? else {
            return Ok(());
        };

        let (lhs, rhs) = with_cancellation(read_args(stream), token).await??;
        let result = operation.apply(service, lhs, rhs);
        debug!("{}({}, {}) = {}", operation, lhs, rhs, result);

        with_cancellation(write_result(stream, result), token).await??;
    }
}
