//! BusyIndicator CLI — mirror Microsoft Teams presence onto an LED strip.
//!
//! Runs the presence loop by default; `status`, `test` and `config` are
//! one-shot helpers.

use std::path::PathBuf;

use busyindicator_lib::poll::StopSignal;
use clap::{ArgAction, Parser};

mod cli;

#[derive(Parser)]
#[command(
    name = "busyindicator",
    version,
    about = "Mirror Microsoft Teams presence onto a strip of indicator lights"
)]
struct Args {
    /// Output as JSON (for status, config)
    #[arg(long, global = true)]
    json: bool,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Use this config file instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<cli::Command>,
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(args.verbose)),
    )
    .format_timestamp(None)
    .format_target(false)
    .init();

    // First Ctrl+C asks the loop to stop; a second one exits immediately
    // (e.g. while waiting on sign-in).
    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if handler_stop.is_stopped() {
            std::process::exit(130);
        }
        handler_stop.stop();
    }) {
        log::warn!("could not install Ctrl+C handler: {e}");
    }

    let command = args.command.unwrap_or(cli::Command::Run);
    if let Err(e) = cli::run(command, args.json, args.config.as_deref(), &stop) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filter() {
        assert_eq!(log_filter(0), "warn");
        assert_eq!(log_filter(1), "info");
        assert_eq!(log_filter(2), "debug");
        assert_eq!(log_filter(7), "debug");
    }

    #[test]
    fn no_subcommand_parses() {
        let args = Args::try_parse_from(["busyindicator"]).unwrap();
        assert!(args.command.is_none());
        assert!(!args.json);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["busyindicator", "status", "--json", "-vv", "--config", "x.toml"])
                .unwrap();
        assert!(args.json);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(args.command, Some(cli::Command::Status)));
    }

    #[test]
    fn test_subcommand_defaults() {
        let args = Args::try_parse_from(["busyindicator", "test"]).unwrap();
        assert!(matches!(
            args.command,
            Some(cli::Command::Test {
                seconds: 3,
                state: None
            })
        ));
    }

    #[test]
    fn test_seconds_is_bounded() {
        assert!(Args::try_parse_from(["busyindicator", "test", "--seconds", "86400"]).is_ok());
        assert!(Args::try_parse_from(["busyindicator", "test", "--seconds", "86401"]).is_err());
        let huge = u64::MAX.to_string();
        assert!(Args::try_parse_from(["busyindicator", "test", "--seconds", huge.as_str()]).is_err());
    }
}
