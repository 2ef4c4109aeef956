//! Poll loop state machine — fetch presence on a timer and keep the strip
//! in sync, decoupled from real I/O.
//!
//! The `PollLoop` owns the schedule: one fetch per tick, never two in flight,
//! exponential backoff on transient failures, and cooperative cancellation
//! through a [`StopSignal`] checked at the tick boundary, around the fetch,
//! and during the wait between ticks. The CLI becomes a thin adapter that
//! builds the source and strip and reports each [`Cycle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::backoff::{Backoff, BackoffConfig};
use crate::config::Config;
use crate::device::{self, DeviceError, LightStrip};
use crate::graph::ApiError;
use crate::led::Indicator;
use crate::mapper::{Palette, map};
use crate::presence::PresenceState;
use crate::source::{PollResult, PresenceSource};

/// Longest stretch the loop sleeps without looking at the stop signal.
const WAIT_SLICE: Duration = Duration::from_millis(50);

// ── Stop signal ──

/// Shared, cloneable stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for up to `duration`, returning early once stopped.
    ///
    /// Returns `true` if the signal was raised.
    /// A duration too large to represent as a deadline waits until stopped.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            let slice = match deadline {
                Some(d) if now >= d => return false,
                Some(d) => WAIT_SLICE.min(d - now),
                None => WAIT_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}

// ── State machine ──

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Polling,
    Applying,
    Backoff,
    Stopped,
}

/// What one tick did.
#[derive(Debug)]
pub enum Cycle {
    /// Presence fetched. `rendered` is false when the strip already showed it.
    Applied {
        presence: PresenceState,
        rendered: bool,
    },
    /// Presence fetched but the frame could not be sent. The buffer keeps
    /// the new pattern and the next tick sends it again.
    RenderFailed {
        presence: PresenceState,
        error: DeviceError,
    },
    /// Transient fetch failure; the next tick is pushed back by `delay`.
    Backoff {
        error: ApiError,
        delay: Duration,
        failures: u32,
    },
    /// Stop observed; nothing was applied.
    Cancelled,
}

/// Loop timing and colors.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_backoff_factor: u32,
    pub palette: Palette,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: Duration::from_secs(2),
            max_backoff_factor: 5,
            palette: Palette::default(),
        }
    }
}

impl PollConfig {
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        Ok(PollConfig {
            interval: config.poll_interval(),
            max_backoff_factor: config.max_backoff_factor,
            palette: config.palette()?,
        })
    }
}

/// Presence → indicator synchronization loop.
pub struct PollLoop<S: PresenceSource, D: LightStrip> {
    source: S,
    indicator: Indicator<D>,
    palette: Palette,
    interval: Duration,
    backoff: Backoff,
    state: LoopState,
    current: Option<PresenceState>,
    needs_render: bool,
}

impl<S: PresenceSource, D: LightStrip> PollLoop<S, D> {
    pub fn new(source: S, indicator: Indicator<D>, config: PollConfig) -> Self {
        PollLoop {
            source,
            indicator,
            palette: config.palette,
            interval: config.interval,
            backoff: Backoff::new(BackoffConfig::for_interval(
                config.interval,
                config.max_backoff_factor,
            )),
            state: LoopState::Idle,
            current: None,
            needs_render: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Presence most recently written to the buffer.
    pub fn current(&self) -> Option<PresenceState> {
        self.current
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn indicator(&self) -> &Indicator<D> {
        &self.indicator
    }

    pub fn indicator_mut(&mut self) -> &mut Indicator<D> {
        &mut self.indicator
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            log::trace!("[poll] {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Run one tick: fetch, then apply or back off.
    ///
    /// Returns what happened and how long to wait before the next tick. A
    /// fatal auth failure stops the loop and is returned as the error; the
    /// strip is left showing its last frame.
    pub fn cycle(&mut self, stop: &StopSignal) -> crate::error::Result<(Cycle, Duration)> {
        if stop.is_stopped() {
            self.transition(LoopState::Stopped);
            return Ok((Cycle::Cancelled, Duration::ZERO));
        }

        self.transition(LoopState::Polling);
        let result = self.source.fetch_presence();

        if stop.is_stopped() {
            self.transition(LoopState::Stopped);
            return Ok((Cycle::Cancelled, Duration::ZERO));
        }

        match result {
            PollResult::Success(presence) => {
                self.backoff.record_success();
                self.transition(LoopState::Applying);
                let cycle = self.show(presence)?;
                self.transition(LoopState::Idle);
                Ok((cycle, self.interval))
            }
            PollResult::Retryable(error) => {
                self.transition(LoopState::Backoff);
                let delay = self.backoff.record_failure_with_hint(error.retry_after());
                let failures = self.backoff.consecutive_failures();
                log::warn!(
                    "[poll] {error} (attempt {failures}, retry in {:.1}s)",
                    delay.as_secs_f64()
                );
                Ok((
                    Cycle::Backoff {
                        error,
                        delay,
                        failures,
                    },
                    delay,
                ))
            }
            PollResult::Fatal(error) => {
                log::error!("[poll] stopping: {error}");
                self.transition(LoopState::Stopped);
                Err(error.into())
            }
        }
    }

    /// Put `presence` on the strip unless it is already there.
    fn show(&mut self, presence: PresenceState) -> crate::error::Result<Cycle> {
        if self.current == Some(presence) && !self.needs_render {
            return Ok(Cycle::Applied {
                presence,
                rendered: false,
            });
        }
        let pattern = map(presence, self.indicator.len(), &self.palette);
        self.current = Some(presence);
        match self.indicator.apply(&pattern) {
            Ok(()) => {
                self.needs_render = false;
                log::info!("[poll] showing {presence}");
                Ok(Cycle::Applied {
                    presence,
                    rendered: true,
                })
            }
            Err(crate::BusyIndicatorError::Device(error)) => {
                self.needs_render = true;
                log::warn!("[device] {error}; will retry next tick");
                Ok(Cycle::RenderFailed { presence, error })
            }
            Err(other) => Err(other),
        }
    }

    /// Tick until stopped or a fatal error.
    ///
    /// `on_cycle` sees every completed tick (not the final `Cancelled`).
    /// Returns `Ok(())` when stopped through `stop`.
    pub fn run(
        &mut self,
        stop: &StopSignal,
        mut on_cycle: impl FnMut(&Cycle),
    ) -> crate::error::Result<()> {
        log::info!("[poll] polling every {:.1}s", self.interval.as_secs_f64());
        loop {
            let started = Instant::now();
            let (cycle, delay) = self.cycle(stop)?;
            if matches!(cycle, Cycle::Cancelled) {
                break;
            }
            on_cycle(&cycle);

            // Backoff delays count from the failure; regular ticks keep a
            // fixed cadence regardless of fetch latency.
            let wait = match cycle {
                Cycle::Backoff { .. } => delay,
                _ => delay.saturating_sub(started.elapsed()),
            };
            if stop.wait(wait) {
                self.transition(LoopState::Stopped);
                break;
            }
            self.transition(LoopState::Idle);
        }
        log::info!("[poll] stopped");
        Ok(())
    }

    /// Final device handling after [`run`](Self::run) returns.
    ///
    /// `clear = true` blanks the strip (a deliberate exit); otherwise the
    /// last frame stays lit.
    pub fn shutdown(&mut self, clear: bool) -> device::Result<()> {
        self.transition(LoopState::Stopped);
        if clear {
            self.indicator.clear()?;
            self.current = None;
        }
        Ok(())
    }
}
