//! Pipecalc - host process for the pipe calculator.
//!
//! Runs the calculator server, sends one-off requests to a running server,
//! or plays the scripted demo session against an in-process server.

mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipecalc_core::{
    CalculatorClient, CalculatorServer, CancellationToken, Operation, PipeName, ShutdownReason,
};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "pipecalc")]
#[command(about = "Calculator service over a named duplex pipe")]
struct Args {
    /// Name of the shared channel
    #[arg(short, long, global = true, default_value = pipecalc_core::PipeConfig::DEFAULT_PIPE_NAME)]
    name: PipeName,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve one client until it disconnects or Ctrl-C is pressed
    Serve,
    /// Send a single request to a running server
    Call {
        /// add | subtract (or the wire tags A | S)
        operation: Operation,
        #[arg(allow_hyphen_values = true)]
        lhs: i32,
        #[arg(allow_hyphen_values = true)]
        rhs: i32,
    },
    /// Start a server, run the scripted client session, then shut down
    Demo,
}

fn init_logging(debug: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact();

    // RUST_LOG takes precedence over --debug when set
    match EnvFilter::try_from_default_env() {
        Ok(filter) => builder.with_env_filter(filter).init(),
        Err(_) => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    match args.command {
        Command::Serve => serve(args.name).await,
        Command::Call {
            operation,
            lhs,
            rhs,
        } => call(args.name, operation, lhs, rhs).await,
        Command::Demo => demo::run(args.name).await,
    }
}

async fn serve(name: PipeName) -> Result<()> {
    let token = CancellationToken::new();

    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let server = CalculatorServer::with_default_service(name);
    let context = format!("Server on {} failed", server.name());
    let reason = server.spawn(token).wait().await.context(context)?;

    report_shutdown(&reason);
    Ok(())
}

async fn call(name: PipeName, operation: Operation, lhs: i32, rhs: i32) -> Result<()> {
    let mut client = CalculatorClient::connect(&name)
        .await
        .with_context(|| format!("Failed to connect to {}", name))?;
    let value = client.send_request(operation, lhs, rhs).await?;
    client.close().await?;

    // Intentional stdout: the result is the command's output
    println!("{}", value);
    Ok(())
}

fn report_shutdown(reason: &ShutdownReason) {
    match reason {
        ShutdownReason::PeerDisconnected => info!("Client disconnected, server stopped"),
        ShutdownReason::Cancelled => info!("Server cancelled"),
        ShutdownReason::Fault(e) => error!("Server stopped on error: {}", e),
    }
}
