//! CLI subcommands — presence loop, one-shot status, test pattern, config.

mod config_cmd;
mod run;
mod status;
mod test_pattern;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use busyindicator_lib::config::Config;
pub(super) use busyindicator_lib::error::Result;
pub(super) use busyindicator_lib::led;
pub(super) use busyindicator_lib::mapper::Palette;
pub(super) use busyindicator_lib::poll::StopSignal;
pub(super) use busyindicator_lib::presence::PresenceState;

const PADDING: usize = 2;

/// Longest `test --seconds` accepted (one day).
const MAX_TEST_SECONDS: u64 = 24 * 60 * 60;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w.saturating_sub(2));
}

/// Load the config from `custom` (or the platform default), logging parse
/// warnings.
pub(super) fn load_config(custom: Option<&Path>) -> Config {
    let (config, warnings) = match custom {
        Some(path) => Config::load_from(path),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("[config] {w}");
    }
    config
}

/// Config file in use: `custom` if given, else the platform default.
pub(super) fn config_file(custom: Option<&Path>) -> Option<PathBuf> {
    custom.map(Path::to_path_buf).or_else(Config::path)
}

/// `state key -> #RRGGBB` for every presence state.
pub(super) fn palette_table(palette: &Palette) -> BTreeMap<String, String> {
    PresenceState::ALL
        .iter()
        .map(|&s| (s.key().to_string(), led::format_color(palette.color_for(s))))
        .collect()
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub user: Option<UserJson>,
    pub availability: String,
    pub activity: Option<String>,
    pub state: PresenceState,
    pub color: String,
}

#[derive(Serialize)]
pub(super) struct UserJson {
    pub display_name: String,
    pub user_principal_name: Option<String>,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub palette: BTreeMap<String, String>,
    pub problems: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Mirror presence onto the strip until Enter or Ctrl+C (default)
    Run,

    /// Sign in, fetch presence once, and print it
    Status,

    /// Light the strip with the startup test pattern (or a state's pattern)
    Test {
        /// How long to keep the pattern lit
        #[arg(
            long,
            default_value_t = 3,
            value_parser = clap::value_parser!(u64).range(0..=MAX_TEST_SECONDS)
        )]
        seconds: u64,
        /// Show this presence state's pattern instead (e.g. busy, do_not_disturb)
        #[arg(long)]
        state: Option<String>,
    },

    /// Show current configuration and file paths
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>, stop: &StopSignal) -> Result<()> {
    match cmd {
        Command::Run => {
            if json {
                warn_json_unsupported("run");
            }
            run::cmd_run(config_path, stop)
        }
        Command::Status => status::cmd_status(json, config_path, stop),
        Command::Test { seconds, state } => {
            if json {
                warn_json_unsupported("test");
            }
            test_pattern::cmd_test(config_path, seconds, state.as_deref(), stop)
        }
        Command::Config { init } => config_cmd::cmd_config(json, init, config_path),
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn kv_width_top_only() {
        let w = kv_width(&["Short:", "Longer key:"], &[]);
        // "Longer key:" = 11 + PADDING = 13
        assert_eq!(w, 13);
    }

    #[test]
    fn kv_width_indent_drives_width() {
        let w = kv_width(&["A:"], &["poll_interval_secs:"]);
        // 19 + PADDING + 2 = 23
        assert_eq!(w, 23);
    }

    #[test]
    fn values_align_across_levels() {
        let w = kv_width(&["Top:"], &["Indent:"]);
        let top = format_kv("Top:", "V", w);
        let indent = format!("  {:<width$}{}", "Indent:", "V", width = w - 2);
        assert_eq!(top.find('V'), indent.find('V'));
    }

    #[test]
    fn format_kv_exact_width() {
        // Key longer than width: no padding added
        assert_eq!(format_kv("ExactWidth:", "val", 10), "ExactWidth:val");
    }

    #[test]
    fn kv_width_empty_both() {
        assert_eq!(kv_width(&[], &[]), 0);
    }
}
