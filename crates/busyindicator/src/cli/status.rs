//! `status` subcommand — sign in, fetch presence once, print it.

use std::path::Path;

use busyindicator_lib::auth::{AuthProvider, DeviceCodeAuth};
use busyindicator_lib::graph::{GraphClient, PresenceApi};

use super::{
    PresenceState, Result, StatusOutput, StopSignal, UserJson, kv, kv_indent, kv_width, led,
};

pub(super) fn cmd_status(
    json: bool,
    config_path: Option<&Path>,
    stop: &StopSignal,
) -> Result<()> {
    let config = super::load_config(config_path);
    config.require_valid()?;
    let palette = config.palette()?;

    // Instructions go to stderr so `--json` output stays parseable.
    let mut auth = DeviceCodeAuth::new(&config)?
        .with_stop(stop.clone())
        .with_prompt(|p| eprintln!("[auth] {}", p.instructions()));
    let credential = auth.access_token()?;
    let client = GraphClient::new(&config)?;

    let user = match client.profile(credential.token()) {
        Ok(p) => Some(UserJson {
            display_name: p.display_name,
            user_principal_name: p.user_principal_name,
        }),
        Err(e) => {
            log::warn!("[auth] could not load profile: {e}");
            None
        }
    };
    let raw = client.presence(credential.token())?;
    let state = PresenceState::from_availability(&raw.availability);
    let color = led::format_color(palette.color_for(state));

    let output = StatusOutput {
        version: env!("CARGO_PKG_VERSION").to_string(),
        user,
        availability: raw.availability,
        activity: raw.activity,
        state,
        color,
    };

    if json {
        let rendered = serde_json::to_string_pretty(&output)
            .map_err(|e| busyindicator_lib::BusyIndicatorError::Config(e.to_string()))?;
        println!("{rendered}");
        return Ok(());
    }

    let w = kv_width(
        &["Version:", "User:", "Presence:"],
        &["Availability:", "Activity:", "State:", "Color:"],
    );
    kv("Version:", &output.version, w);
    match &output.user {
        Some(u) => match &u.user_principal_name {
            Some(upn) => kv("User:", format_args!("{} ({upn})", u.display_name), w),
            None => kv("User:", &u.display_name, w),
        },
        None => kv("User:", "(unavailable)", w),
    }
    println!();
    println!("Presence:");
    kv_indent("Availability:", &output.availability, w);
    kv_indent(
        "Activity:",
        output.activity.as_deref().unwrap_or("(none)"),
        w,
    );
    kv_indent("State:", output.state, w);
    kv_indent("Color:", &output.color, w);
    Ok(())
}
