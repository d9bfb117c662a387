use std::sync::Arc;
use std::time::Duration;

use clap::builder::NonEmptyStringValueParser;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use sockrpc::config::{DEFAULT_CALL_TIMEOUT_MS, DEFAULT_MAX_RECONNECTS, DEFAULT_RECONNECT_INTERVAL_MS};
use sockrpc::{
    Call, ChannelSink, ClientConfig, ClientError, ConnectionState, EVENT_CLOSE, EVENT_OPEN, EventSink, PrefixFilter, SinkEvent,
    SocketClient,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, timeout_at};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid JSON for {field}: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("--payload must be a JSON object")]
    PayloadNotObject,
    #[error("connection closed before it opened: {0}")]
    ConnectFailed(Value),
    #[error("timed out waiting for `{0}`")]
    Timeout(String),
    #[error("event stream ended")]
    SinkClosed,
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to encode event: {0}")]
    Print(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "sockrpc-cli", about = "JSON-RPC websocket client CLI")]
struct Cli {
    #[arg(long, env = "SOCKRPC_URL")]
    url: String,

    #[arg(long, env = "SOCKRPC_MAX_RECONNECTS", default_value_t = DEFAULT_MAX_RECONNECTS)]
    max_reconnects: u32,

    #[arg(long, env = "SOCKRPC_RECONNECT_INTERVAL_MS", default_value_t = DEFAULT_RECONNECT_INTERVAL_MS)]
    reconnect_interval_ms: u64,

    #[arg(long, env = "SOCKRPC_CALL_TIMEOUT_MS", default_value_t = DEFAULT_CALL_TIMEOUT_MS)]
    call_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one call and print events until its response arrives.
    Call(CallArgs),
    /// Print every event until the duration elapses or the client stops.
    Listen(ListenArgs),
}

#[derive(Args, Debug)]
struct CallArgs {
    method: String,

    #[arg(long, default_value = "{}")]
    params: String,

    #[arg(
        long,
        default_value = "cli/onResponse",
        value_parser = NonEmptyStringValueParser::new(),
        help = "Event name carrying the response"
    )]
    event: String,

    #[arg(long, help = "JSON object merged under the response payload")]
    payload: Option<String>,

    #[arg(long, default_value_t = 10_000)]
    wait_ms: u64,
}

#[derive(Args, Debug)]
struct ListenArgs {
    #[arg(long, help = "Stop after this many seconds; runs until closed otherwise")]
    duration_secs: Option<u64>,

    #[arg(long, default_value_t = false, help = "Only print socket/* lifecycle events")]
    lifecycle_only: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = ClientConfig::new(cli.url)
        .with_max_reconnects(cli.max_reconnects)
        .with_reconnect_interval(Duration::from_millis(cli.reconnect_interval_ms))
        .with_call_timeout(Duration::from_millis(cli.call_timeout_ms));

    match cli.command {
        Command::Call(args) => run_call(config, args).await,
        Command::Listen(args) => run_listen(config, args).await,
    }
}

async fn run_call(config: ClientConfig, args: CallArgs) -> Result<(), CliError> {
    let params = parse_json("--params", &args.params)?;
    let mut call = Call::new(args.method, params).on_response(args.event.as_str());
    if let Some(raw) = &args.payload {
        let Value::Object(payload) = parse_json("--payload", raw)? else {
            return Err(CliError::PayloadNotObject);
        };
        call = call.with_payload(payload);
    }

    let deadline = Instant::now() + Duration::from_millis(args.wait_ms);
    let (sink, mut events) = ChannelSink::new();
    let client = SocketClient::spawn(config, Arc::new(sink));
    client.connect();

    wait_for_open(&mut events, deadline).await?;
    let id = client.emit(call).await?;
    tracing::debug!(id, "call sent");

    loop {
        let event = next_before(&mut events, deadline, &args.event).await?;
        print_event(&event)?;
        if event.name == args.event {
            break;
        }
    }

    shutdown(&client).await;
    Ok(())
}

async fn run_listen(config: ClientConfig, args: ListenArgs) -> Result<(), CliError> {
    let (channel, mut events) = ChannelSink::new();
    let sink: Arc<dyn EventSink> = if args.lifecycle_only {
        Arc::new(PrefixFilter::socket(channel))
    } else {
        Arc::new(channel)
    };
    let client = SocketClient::spawn(config, sink);
    client.connect();

    let deadline = args.duration_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        let received = match deadline {
            Some(deadline) => match timeout_at(deadline, events.recv()).await {
                Ok(received) => received,
                Err(_) => break,
            },
            None => events.recv().await,
        };
        let Some(event) = received else {
            return Err(CliError::SinkClosed);
        };
        print_event(&event)?;
        if event.name == EVENT_CLOSE {
            return Ok(());
        }
    }

    shutdown(&client).await;
    Ok(())
}

async fn wait_for_open(events: &mut UnboundedReceiver<SinkEvent>, deadline: Instant) -> Result<(), CliError> {
    loop {
        let event = next_before(events, deadline, EVENT_OPEN).await?;
        print_event(&event)?;
        match event.name.as_str() {
            EVENT_OPEN => return Ok(()),
            EVENT_CLOSE => return Err(CliError::ConnectFailed(event.payload)),
            _ => {}
        }
    }
}

async fn next_before(
    events: &mut UnboundedReceiver<SinkEvent>,
    deadline: Instant,
    waiting_for: &str,
) -> Result<SinkEvent, CliError> {
    timeout_at(deadline, events.recv())
        .await
        .map_err(|_| CliError::Timeout(waiting_for.to_owned()))?
        .ok_or(CliError::SinkClosed)
}

/// Close deliberately and give the close handshake a moment to finish.
async fn shutdown(client: &SocketClient) {
    client.close();
    let closed = tokio::time::timeout(Duration::from_secs(2), client.wait_for_state(ConnectionState::Closed)).await;
    if closed.is_err() {
        tracing::warn!("socket did not close in time");
    }
}

fn parse_json(field: &'static str, raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|source| CliError::InvalidJson { field, source })
}

fn print_event(event: &SinkEvent) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
