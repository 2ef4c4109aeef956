//! `test` subcommand — light the strip without signing in.

use std::path::Path;
use std::time::Duration;

use busyindicator_lib::BusyIndicatorError;
use busyindicator_lib::device;
use busyindicator_lib::led::Indicator;
use busyindicator_lib::mapper::map;

use super::{PresenceState, Result, StopSignal};

pub(super) fn cmd_test(
    config_path: Option<&Path>,
    seconds: u64,
    state: Option<&str>,
    stop: &StopSignal,
) -> Result<()> {
    let config = super::load_config(config_path);
    config.require_valid_strip()?;
    let state = state
        .map(|key| {
            PresenceState::from_key(key).ok_or_else(|| {
                BusyIndicatorError::Config(format!(
                    "unknown state \"{key}\" (available, busy, do_not_disturb, away, offline, unknown)"
                ))
            })
        })
        .transpose()?;

    let strip = device::open_strip(&config)?;
    let mut indicator =
        Indicator::new(strip, config.cell_count).with_brightness(config.brightness);

    match state {
        Some(s) => {
            let palette = config.palette()?;
            let pattern = map(s, indicator.len(), &palette);
            indicator.apply(&pattern)?;
            println!("Showing {s} on {} cells for {seconds}s...", indicator.len());
        }
        None => {
            indicator.self_test()?;
            println!(
                "Test pattern (cell 0 blue, cell 1 red) on {} cells for {seconds}s...",
                indicator.len()
            );
        }
    }

    stop.wait(Duration::from_secs(seconds));
    indicator.clear()?;
    println!("Done.");
    Ok(())
}
