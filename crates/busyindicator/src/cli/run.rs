//! `run` subcommand — sign in, then mirror presence onto the strip.

use std::io::BufRead;
use std::path::Path;

use busyindicator_lib::auth::{AuthError, DeviceCodeAuth};
use busyindicator_lib::device::{self, DeviceError, LightStrip};
use busyindicator_lib::graph::GraphClient;
use busyindicator_lib::led::Indicator;
use busyindicator_lib::poll::{Cycle, PollConfig, PollLoop};
use busyindicator_lib::source::GraphPresenceSource;

use super::{Result, StopSignal, led};

/// Stop when the user presses Enter. EOF (detached stdin) is ignored.
fn spawn_enter_listener(stop: StopSignal) {
    let spawned = std::thread::Builder::new()
        .name("stdin-stop".into())
        .spawn(move || {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) => log::debug!("[run] stdin closed, Enter-to-exit disabled"),
                Ok(_) => stop.stop(),
                Err(e) => log::debug!("[run] stdin unreadable: {e}"),
            }
        });
    if let Err(e) = spawned {
        log::warn!("could not watch stdin: {e}");
    }
}

/// One line per visible change.
fn report(cycle: &Cycle, palette: &super::Palette) {
    match cycle {
        Cycle::Applied {
            presence,
            rendered: true,
        } => println!(
            "  {presence} -> {}",
            led::format_color(palette.color_for(*presence))
        ),
        Cycle::RenderFailed { presence, error } => {
            println!("  {presence} (not shown: {error})")
        }
        // Backoffs are logged by the loop; unchanged ticks are silent.
        _ => {}
    }
}

pub(super) fn cmd_run(config_path: Option<&Path>, stop: &StopSignal) -> Result<()> {
    let config = super::load_config(config_path);
    config.require_valid()?;
    let poll_config = PollConfig::from_config(&config)?;
    let palette = poll_config.palette.clone();

    println!(
        "BusyIndicator — mirrors Teams presence onto {} cells.",
        config.cell_count
    );
    println!("Press Enter or Ctrl+C to exit.");
    println!();

    let mut strip = device::reopening_strip(&config);
    let opened = strip.connect().map(|_| ());
    match opened {
        Ok(()) => println!("[device] {}", strip.name()),
        Err(e @ DeviceError::Unsupported(_)) => return Err(e.into()),
        Err(e) => {
            log::warn!("[device] {e}");
            println!("[device] {} unavailable, retrying every poll", strip.name());
        }
    }
    let mut indicator =
        Indicator::new(strip, config.cell_count).with_brightness(config.brightness);
    if config.self_test
        && let Err(e) = indicator.self_test()
    {
        log::warn!("[device] self-test failed: {e}");
    }

    spawn_enter_listener(stop.clone());

    let auth = DeviceCodeAuth::new(&config)?
        .with_stop(stop.clone())
        .with_prompt(|p| {
            println!();
            println!("[auth]   {}", p.instructions());
            println!();
        });
    let api = GraphClient::new(&config)?;
    let mut source = GraphPresenceSource::new(auth, api);
    match source.sign_in() {
        Ok(()) => {}
        Err(AuthError::Cancelled) => {
            println!("Done.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }
    match source.profile() {
        Ok(profile) => println!("Welcome {}!", profile.display_name),
        Err(e) => log::warn!("[auth] could not load profile: {e}"),
    }
    println!();

    let mut poll = PollLoop::new(source, indicator, poll_config);
    poll.run(stop, |cycle| report(cycle, &palette))?;

    println!();
    if config.clear_on_exit {
        println!("Clearing indicator...");
    }
    if let Err(e) = poll.shutdown(config.clear_on_exit) {
        log::warn!("could not clear indicator: {e}");
    }
    println!("Done.");
    Ok(())
}
