//! Command-line interface definition.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// simlink - relay simulation events to the page that launched it
#[derive(Debug, Parser)]
#[command(name = "simlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "SIMLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Relay port (overrides the config file)
    #[arg(long, short, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay in the foreground, printing every event to stdout
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<IpAddr>,

        /// Stop after the first simulation finishes
        #[arg(long)]
        once: bool,
    },

    /// Connect as a simulation and send a scripted run
    Simulate {
        /// Sender id to announce (overrides the config file)
        #[arg(long)]
        id: Option<String>,

        /// Relay host to connect to
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        /// Objective score as OBJECTIVE=SCORE (can be repeated)
        #[arg(long = "score", value_name = "OBJECTIVE=SCORE", action = clap::ArgAction::Append)]
        scores: Vec<String>,

        /// Objective to report complete (can be repeated)
        #[arg(long = "complete", value_name = "OBJECTIVE", action = clap::ArgAction::Append)]
        completed: Vec<String>,

        /// Objective to report incomplete (can be repeated)
        #[arg(long = "incomplete", value_name = "OBJECTIVE", action = clap::ArgAction::Append)]
        incomplete: Vec<String>,

        /// Value of the closing SIMULATION message
        #[arg(long, default_value = simlink_core::values::STOPPED_NORMAL)]
        stop: String,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_simulate() {
        let cli = Cli::try_parse_from([
            "simlink",
            "--port",
            "5000",
            "simulate",
            "--id",
            "sim-1",
            "--score",
            "obj-1=80",
            "--score",
            "obj-2=95",
            "--complete",
            "obj-1",
        ])
        .unwrap();

        assert_eq!(cli.port, Some(5000));
        match cli.command {
            Command::Simulate {
                id,
                scores,
                completed,
                incomplete,
                stop,
                ..
            } => {
                assert_eq!(id.as_deref(), Some("sim-1"));
                assert_eq!(scores, vec!["obj-1=80", "obj-2=95"]);
                assert_eq!(completed, vec!["obj-1"]);
                assert!(incomplete.is_empty());
                assert_eq!(stop, "STOPPED_NORMAL");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["simlink", "serve", "--bind", "0.0.0.0", "--once", "-v"])
            .unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Command::Serve { once: true, bind: Some(_) }));
    }

    #[test]
    fn subcommand_required() {
        assert!(Cli::try_parse_from(["simlink"]).is_err());
    }
}
