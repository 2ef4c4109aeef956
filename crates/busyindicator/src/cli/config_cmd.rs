//! `config` subcommand — show current configuration and file paths.

use std::path::Path;

use busyindicator_lib::BusyIndicatorError;

use super::{
    Config, ConfigOutput, PresenceState, Result, kv, kv_indent, kv_width, led, palette_table,
};

/// Write a default config file, refusing to overwrite.
fn init_config(config_path: Option<&Path>) -> Result<()> {
    let path = super::config_file(config_path)
        .ok_or_else(|| BusyIndicatorError::Config("no config directory".into()))?;
    if path.exists() {
        return Err(BusyIndicatorError::Config(format!(
            "{} already exists",
            path.display()
        )));
    }
    Config::default().save_to(&path)?;
    println!("Wrote {}", path.display());
    println!("Set app_id to your Azure AD application (client) ID before running.");
    Ok(())
}

pub(super) fn cmd_config(json: bool, init: bool, custom_path: Option<&Path>) -> Result<()> {
    if init {
        return init_config(custom_path);
    }

    let config = super::load_config(custom_path);
    let config_path = super::config_file(custom_path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let problems: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };
    let palette = config.palette().unwrap_or_default();

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            palette: palette_table(&palette),
            problems,
        };
        let rendered = serde_json::to_string_pretty(&output)
            .map_err(|e| BusyIndicatorError::Config(e.to_string()))?;
        println!("{rendered}");
        return Ok(());
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:"],
        &[
            "app_id:",
            "scopes:",
            "tenant:",
            "cell_count:",
            "device:",
            "spi_path:",
            "brightness:",
            "poll_interval_secs:",
            "fetch_timeout_ms:",
            "max_backoff_factor:",
            "clear_on_exit:",
            "self_test:",
            "do_not_disturb:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    let app_id = if config.app_id.trim().is_empty() {
        "(not set)"
    } else {
        config.app_id.as_str()
    };
    kv_indent("app_id:", app_id, w);
    kv_indent("scopes:", config.scope_list().join(" "), w);
    kv_indent("tenant:", &config.tenant, w);
    kv_indent("cell_count:", config.cell_count, w);
    kv_indent("device:", &config.device, w);
    kv_indent("spi_path:", &config.spi_path, w);
    kv_indent("brightness:", config.brightness, w);
    kv_indent("poll_interval_secs:", config.poll_interval_secs, w);
    kv_indent(
        "fetch_timeout_ms:",
        format_args!("{} ms", config.fetch_timeout().as_millis()),
        w,
    );
    kv_indent("max_backoff_factor:", config.max_backoff_factor, w);
    kv_indent("clear_on_exit:", config.clear_on_exit, w);
    kv_indent("self_test:", config.self_test, w);
    println!();

    println!("Colors:");
    for state in PresenceState::ALL {
        let key = format!("{}:", state.key());
        kv_indent(&key, led::format_color(palette.color_for(state)), w);
    }

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}
