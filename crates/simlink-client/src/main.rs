//! simlink CLI entry point.

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;

use simlink_client::cli::{Cli, Command, ConfigAction};
use simlink_client::commands::{self, simulate::Script};
use simlink_client::config::ClientConfig;
use simlink_client::error::ClientResult;
use simlink_core::{LogFormat, TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    // Load configuration
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.relay.port = port;
    }

    let mut logging = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::relay()
    };
    if cli.json_logs {
        logging = logging.with_format(LogFormat::Json);
    }
    init_tracing(logging)?;

    match cli.command {
        Command::Serve { bind, once } => {
            if let Some(address) = bind {
                config.relay.bind_address = address;
            }
            config.validate()?;
            commands::serve::run(&config.relay, once).await
        }
        Command::Simulate {
            id,
            host,
            scores,
            completed,
            incomplete,
            stop,
        } => {
            let script = Script::from_args(completed, incomplete, &scores, stop)?;
            let client_id = id.unwrap_or_else(|| config.simulation.client_id.clone());
            let addr = SocketAddr::new(host, config.relay.port);
            commands::simulate::run(
                addr,
                &client_id,
                config.relay.wire_format()?,
                config.simulation.timeout(),
                &script,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, cli.config.as_deref()),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
