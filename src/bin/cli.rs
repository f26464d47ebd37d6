//! respline CLI
//!
//! Connects to a server, issues the startup commands and prints every reply.

use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;
use respline::{Config, Driver};
use tracing_subscriber::{fmt, EnvFilter};

/// respline client
#[derive(Parser, Debug)]
#[command(name = "respline")]
#[command(about = "Pipelining RESP client with automatic reconnection")]
#[command(version)]
struct Args {
    /// Server host
    host: String,

    /// Server port
    port: u16,

    /// Fixed delay before reconnecting, in milliseconds
    #[arg(long, default_value = "1000")]
    reconnect_delay_ms: u64,

    /// Connect timeout in milliseconds (default: none)
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Command issued once after the first connection (repeatable)
    #[arg(long = "command", default_value = "KEYS *")]
    commands: Vec<String>,

    /// Command issued after every connection, e.g. INFO (repeatable)
    #[arg(long = "on-connect")]
    on_connect: Vec<String>,
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <host> <port>", program);
    std::process::exit(1);
}

fn main() {
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "respline".to_string());

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            // Wrong number of positionals
            ErrorKind::MissingRequiredArgument
            | ErrorKind::UnknownArgument
            | ErrorKind::TooManyValues
            | ErrorKind::WrongNumberOfValues => usage(&program),
            _ => {
                eprint!("{}", err);
                std::process::exit(1);
            }
        },
    };

    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,respline=debug"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    tracing::info!("respline v{}", respline::VERSION);

    // Build config from args
    let config = Config::builder()
        .host(&args.host)
        .port(args.port)
        .reconnect_delay(Duration::from_millis(args.reconnect_delay_ms))
        .connect_timeout(args.connect_timeout_ms.map(Duration::from_millis))
        .initial_commands(args.commands)
        .on_connect_commands(args.on_connect)
        .build();

    let driver = match Driver::new(config) {
        Ok(driver) => driver,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server address: {}", driver.config().addr());

    if let Err(e) = driver.run() {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Event loop stopped");
}
