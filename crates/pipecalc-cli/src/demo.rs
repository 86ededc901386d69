//! Scripted demo session.
//!
//! Starts a server in-process, connects one client, issues `A 10 5`,
//! `S 10 5`, idles, issues `S 10 5` again, then cancels the server and waits
//! for it to finish closing the channel.

use anyhow::{Context, Result};
use pipecalc_core::{
    CalculatorClient, CalculatorServer, CancellationToken, DemoConfig, Operation, PipeName,
};
use tracing::{error, info};

pub async fn run(name: PipeName) -> Result<()> {
    let token = CancellationToken::new();
    let server = CalculatorServer::with_default_service(name.clone()).spawn(token.clone());

    tokio::time::sleep(DemoConfig::SERVER_START_DELAY).await;

    // Request failures are reported, not propagated: the server must still
    // be cancelled and awaited. The client stays open until then so the
    // server stops on cancellation rather than on disconnect.
    let session = client_session(&name).await;
    if let Err(e) = &session {
        error!("Error: {:#}", e);
    }

    token.cancel();
    let reason = server.wait().await.context("Server task failed")?;
    info!("Server stopped ({:?})", reason);

    drop(session);
    Ok(())
}

async fn client_session(name: &PipeName) -> Result<CalculatorClient> {
    let mut client = CalculatorClient::connect(name).await?;
    info!("Client connected to server");

    let sum = client.send_request(Operation::Add, 10, 5).await?;
    info!("Result of addition: {}", sum);

    let difference = client.send_request(Operation::Subtract, 10, 5).await?;
    info!("Result of subtraction: {}", difference);

    tokio::time::sleep(DemoConfig::IDLE_INTERVAL).await;

    let difference = client.send_request(Operation::Subtract, 10, 5).await?;
    info!("Result of subtraction: {}", difference);

    Ok(client)
}
