//! Integration tests: presence → strip synchronization through the public API.
//!
//! These drive a `PollLoop` built from a `GraphPresenceSource` (scripted API,
//! closure credential provider) and a `MockStrip`, and check what actually
//! reached the strip.

use std::time::{Duration, Instant};

use busyindicator_lib::BusyIndicatorError;
use busyindicator_lib::auth::{AuthError, Credential};
use busyindicator_lib::device::mock::MockStrip;
use busyindicator_lib::device::{DeviceError, ReopeningStrip};
use busyindicator_lib::graph::ApiError;
use busyindicator_lib::led::{Color, Indicator};
use busyindicator_lib::mapper::Palette;
use busyindicator_lib::poll::{Cycle, LoopState, PollConfig, PollLoop, StopSignal};
use busyindicator_lib::presence::PresenceState;
use busyindicator_lib::source::mock::{MockApi, ScriptedSource, Step};
use busyindicator_lib::source::{GraphPresenceSource, PollResult};

const CELLS: usize = 6;

type AuthFn = Box<dyn FnMut() -> Result<Credential, AuthError>>;

/// Credential provider that hands out `token-1`, `token-2`, ...
fn counting_auth() -> AuthFn {
    let mut issued = 0;
    Box::new(move || {
        issued += 1;
        Ok(Credential::new(
            format!("token-{issued}"),
            Duration::from_secs(3600),
        ))
    })
}

fn poll_config() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(5),
        ..PollConfig::default()
    }
}

fn graph_loop(
    responses: Vec<Result<busyindicator_lib::graph::RawPresence, ApiError>>,
) -> PollLoop<GraphPresenceSource<AuthFn, MockApi>, MockStrip> {
    let source = GraphPresenceSource::new(counting_auth(), MockApi::new(responses));
    PollLoop::new(
        source,
        Indicator::new(MockStrip::new(), CELLS),
        poll_config(),
    )
}

fn solid(color: Color) -> Vec<Color> {
    vec![color; CELLS]
}

// ── Test: presence changes flow to the strip ──

#[test]
fn presence_changes_are_rendered_in_order() {
    let mut l = graph_loop(vec![
        MockApi::availability("Available"),
        MockApi::availability("Busy"),
        MockApi::availability("BusyIdle"),
        MockApi::availability("Away"),
    ]);
    let stop = StopSignal::new();
    for _ in 0..4 {
        l.cycle(&stop).unwrap();
    }

    let palette = Palette::default();
    let frames = &l.indicator().strip().frames;
    // BusyIdle normalizes to Busy, which is already shown.
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], solid(palette.available));
    assert_eq!(frames[1], solid(palette.busy));
    assert_eq!(frames[2], solid(palette.away));
    assert_eq!(l.current(), Some(PresenceState::Away));
}

#[test]
fn do_not_disturb_alternates_cells() {
    let mut l = graph_loop(vec![MockApi::availability("DoNotDisturb")]);
    l.cycle(&StopSignal::new()).unwrap();

    let frame = l.indicator().strip().last_frame().unwrap().to_vec();
    let dnd = Palette::default().do_not_disturb;
    for (i, c) in frame.iter().enumerate() {
        let expected = if i % 2 == 0 { dnd } else { Color::OFF };
        assert_eq!(*c, expected, "cell {i}");
    }
}

#[test]
fn unrecognized_availability_shows_unknown() {
    let mut l = graph_loop(vec![MockApi::availability("PresenceUnknown")]);
    let (cycle, _) = l.cycle(&StopSignal::new()).unwrap();
    assert!(matches!(
        cycle,
        Cycle::Applied {
            presence: PresenceState::Unknown,
            ..
        }
    ));
    assert_eq!(
        l.indicator().strip().last_frame().unwrap(),
        solid(Palette::default().unknown).as_slice()
    );
}

#[test]
fn malformed_payload_shows_unknown() {
    let mut l = graph_loop(vec![Err(ApiError::Malformed("missing field".into()))]);
    let (cycle, _) = l.cycle(&StopSignal::new()).unwrap();
    assert!(matches!(
        cycle,
        Cycle::Applied {
            presence: PresenceState::Unknown,
            ..
        }
    ));
}

#[test]
fn brightness_scales_rendered_frame() {
    let source = GraphPresenceSource::new(
        counting_auth(),
        MockApi::new([MockApi::availability("Busy")]),
    );
    let mut l = PollLoop::new(
        source,
        Indicator::new(MockStrip::new(), CELLS).with_brightness(128),
        poll_config(),
    );
    l.cycle(&StopSignal::new()).unwrap();
    assert_eq!(
        l.indicator().strip().last_frame().unwrap(),
        solid(Color::rgb(128, 0, 0)).as_slice()
    );
    // Buffer keeps the unscaled color.
    assert_eq!(l.indicator().cells()[0], Color::RED);
}

// ── Test: transient failures back off, then recover ──

#[test]
fn transient_failures_back_off_then_recover() {
    let mut l = graph_loop(vec![
        Err(ApiError::Server(503)),
        Err(ApiError::Timeout("deadline".into())),
        Err(ApiError::Server(500)),
        MockApi::availability("Available"),
    ]);
    let stop = StopSignal::new();
    let config = poll_config();
    let cap = config.interval * config.max_backoff_factor;

    let (first, d1) = l.cycle(&stop).unwrap();
    assert!(matches!(first, Cycle::Backoff { failures: 1, .. }));
    let (_, d2) = l.cycle(&stop).unwrap();
    assert!(d2 > d1);
    let (third, d3) = l.cycle(&stop).unwrap();
    assert!(matches!(third, Cycle::Backoff { failures: 3, .. }));
    assert!(d3 >= d2);
    assert!(d3 <= cap);
    assert!(l.indicator().strip().frames.is_empty());

    let (fourth, d4) = l.cycle(&stop).unwrap();
    assert!(matches!(
        fourth,
        Cycle::Applied {
            presence: PresenceState::Available,
            rendered: true
        }
    ));
    assert_eq!(d4, config.interval);
}

#[test]
fn failure_keeps_previous_frame() {
    let mut l = graph_loop(vec![
        MockApi::availability("Busy"),
        Err(ApiError::Network("connection reset".into())),
    ]);
    let stop = StopSignal::new();
    l.cycle(&stop).unwrap();
    l.cycle(&stop).unwrap();
    assert_eq!(l.indicator().strip().frames.len(), 1);
    assert_eq!(l.state(), LoopState::Backoff);
}

// ── Test: credential handling ──

#[test]
fn rejected_token_is_renewed_once() {
    let mut l = graph_loop(vec![
        Err(ApiError::Unauthorized(401)),
        MockApi::availability("Busy"),
    ]);
    let (cycle, _) = l.cycle(&StopSignal::new()).unwrap();
    assert!(matches!(
        cycle,
        Cycle::Applied {
            presence: PresenceState::Busy,
            ..
        }
    ));
    let tokens = l.source().api().tokens.borrow().clone();
    assert_eq!(tokens, vec!["token-1", "token-2"]);
}

#[test]
fn repeated_rejection_is_fatal_and_leaves_strip_untouched() {
    let mut l = graph_loop(vec![
        MockApi::availability("Away"),
        Err(ApiError::Unauthorized(401)),
        Err(ApiError::Unauthorized(403)),
        MockApi::availability("Busy"),
    ]);
    let err = l.run(&StopSignal::new(), |_| {}).unwrap_err();
    assert!(matches!(
        err,
        BusyIndicatorError::Auth(AuthError::CredentialRejected(403))
    ));
    assert_eq!(l.state(), LoopState::Stopped);
    let frames = &l.indicator().strip().frames;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0], solid(Palette::default().away));
}

#[test]
fn auth_failure_is_fatal() {
    let auth: AuthFn = Box::new(|| Err(AuthError::Declined));
    let source = GraphPresenceSource::new(auth, MockApi::new([MockApi::availability("Busy")]));
    let mut l = PollLoop::new(
        source,
        Indicator::new(MockStrip::new(), CELLS),
        poll_config(),
    );
    let err = l.run(&StopSignal::new(), |_| {}).unwrap_err();
    assert!(err.is_fatal());
    assert!(l.indicator().strip().frames.is_empty());
    assert!(l.source().api().tokens.borrow().is_empty());
}

// ── Test: strip missing at startup ──

#[test]
fn strip_opened_once_it_appears() {
    let mut missing = 2;
    let strip = ReopeningStrip::new("spi /dev/spidev0.0", move || {
        if missing > 0 {
            missing -= 1;
            return Err(DeviceError::NotFound("/dev/spidev0.0".into()));
        }
        Ok(MockStrip::new())
    });
    let mut l = PollLoop::new(
        ScriptedSource::results([
            PollResult::Success(PresenceState::Busy),
            PollResult::Success(PresenceState::Busy),
            PollResult::Success(PresenceState::Busy),
        ]),
        Indicator::new(strip, CELLS),
        poll_config(),
    );
    let stop = StopSignal::new();

    for _ in 0..2 {
        let (cycle, delay) = l.cycle(&stop).unwrap();
        assert!(matches!(
            cycle,
            Cycle::RenderFailed {
                presence: PresenceState::Busy,
                error: DeviceError::NotFound(_)
            }
        ));
        assert_eq!(delay, poll_config().interval);
        assert!(!l.indicator().strip().is_open());
    }

    let (cycle, _) = l.cycle(&stop).unwrap();
    assert!(matches!(cycle, Cycle::Applied { rendered: true, .. }));
    let frames = &l.indicator().strip().inner().unwrap().frames;
    assert_eq!(frames, &vec![solid(Palette::default().busy)]);
}

// ── Test: cancellation ──

#[test]
fn stop_during_slow_fetch_ends_run_promptly() {
    let stop = StopSignal::new();
    let mut l = PollLoop::new(
        ScriptedSource::new([
            Step::Result(PollResult::Success(PresenceState::Busy)),
            Step::Slow(
                Duration::from_millis(100),
                PollResult::Success(PresenceState::Available),
            ),
        ]),
        Indicator::new(MockStrip::new(), CELLS),
        poll_config(),
    );

    let remote = stop.clone();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(40));
        remote.stop();
    });

    let start = Instant::now();
    l.run(&stop, |_| {}).unwrap();
    trigger.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(l.state(), LoopState::Stopped);
    // The slow fetch's result was discarded.
    assert_eq!(l.current(), Some(PresenceState::Busy));
    assert_eq!(l.indicator().strip().frames.len(), 1);
}

#[test]
fn stop_then_shutdown_clears_strip() {
    let stop = StopSignal::new();
    let mut l = PollLoop::new(
        ScriptedSource::new([
            Step::Result(PollResult::Success(PresenceState::Busy)),
            Step::StopDuring(stop.clone(), PollResult::Success(PresenceState::Away)),
        ]),
        Indicator::new(MockStrip::new(), CELLS),
        poll_config(),
    );
    l.run(&stop, |_| {}).unwrap();
    l.shutdown(true).unwrap();

    let frames = &l.indicator().strip().frames;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1], solid(Color::OFF));
}

#[test]
fn at_most_one_fetch_per_tick() {
    let stop = StopSignal::new();
    let mut l = PollLoop::new(
        ScriptedSource::new([
            Step::Result(PollResult::Success(PresenceState::Busy)),
            Step::Result(PollResult::Retryable(ApiError::Server(500))),
            Step::Result(PollResult::Success(PresenceState::Busy)),
            Step::StopDuring(stop.clone(), PollResult::Success(PresenceState::Busy)),
        ]),
        Indicator::new(MockStrip::new(), CELLS),
        poll_config(),
    );
    let mut cycles = 0;
    l.run(&stop, |_| cycles += 1).unwrap();
    assert_eq!(cycles, 3);
    assert_eq!(l.source().calls, 4);
    assert_eq!(l.source().remaining(), 0);
}
