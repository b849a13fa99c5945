//! Fixed-timestep scheduling.
//!
//! Render frames arrive at whatever rate the host manages; the simulation
//! always advances in whole steps of `1 / hz` seconds:
//!
//! 1. Wall time since the previous frame is added to the accumulator. A frame
//!    longer than `max_accumulated_time` is a spike: it credits only that
//!    bound and the accumulator is capped there, so a stall releases a bounded
//!    burst of catch-up steps. Ordinary frames are credited in full.
//! 2. While the accumulator holds a full step, the simulation is stepped with
//!    the constant delta and one step's worth is subtracted.
//! 3. The remainder (always `< fixed_delta`) is exposed as an interpolation
//!    fraction for the renderer.
//!
//! Time is kept in integer-nanosecond [`Duration`]s, so elapsed time summing
//! to `k * fixed_delta` yields exactly `k` steps however it was fragmented.
//!
//! A step that returns an error pauses the scheduler and hands the error back:
//! through [`FixedStep::frame`]'s result, or [`FixedStepHandle::take_error`]
//! when driven by a tick source. Panics raised by the simulation are not
//! caught; they unwind into the host's tick dispatch.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::api::{Clock, SubscriptionId, TickSource};
use crate::error::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedStepConfig {
    /// Simulation rate in steps per second.
    pub hz: f64,
    /// Seconds of wall time credited at most per frame.
    pub max_accumulated_time: f64,
}

impl Default for FixedStepConfig {
    fn default() -> Self {
        Self {
            hz: 60.0,
            max_accumulated_time: 0.25,
        }
    }
}

impl FixedStepConfig {
    /// `(fixed_delta, max_accumulated)` or the reason the config is unusable.
    pub fn validate(&self) -> Result<(Duration, Duration)> {
        if !(self.hz > 0.0 && self.hz.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "hz must be positive and finite, got {}",
                self.hz
            )));
        }
        let fixed_delta = Duration::try_from_secs_f64(1.0 / self.hz)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| Error::InvalidConfig(format!("hz {} is too high", self.hz)))?;
        let max_accumulated = Duration::try_from_secs_f64(self.max_accumulated_time)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "max_accumulated_time must be positive and finite, got {}",
                    self.max_accumulated_time
                ))
            })?;
        if max_accumulated < fixed_delta {
            return Err(Error::InvalidConfig(format!(
                "max_accumulated_time {}s is shorter than one step at {} hz",
                self.max_accumulated_time, self.hz
            )));
        }
        Ok((fixed_delta, max_accumulated))
    }
}

/// Scheduler statistics, readable at any time.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FixedStepStats {
    pub hz: f64,
    pub fixed_delta: Duration,
    /// Steps run by the most recent frame (0 while paused).
    pub steps_last_frame: u32,
    /// Wall duration of the most recent single step.
    pub last_step_duration: Duration,
    pub total_steps: u64,
    pub frames: u64,
    /// Frames whose elapsed time exceeded `max_accumulated_time`.
    pub clamped_frames: u64,
    pub accumulator: Duration,
    pub paused: bool,
}

impl FixedStepStats {
    pub fn last_step_ms(&self) -> f64 {
        self.last_step_duration.as_secs_f64() * 1000.0
    }
}

/// Per-frame summary handed to [`Simulation::end_frame`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub steps: u32,
    /// Unclamped wall time since the previous frame.
    pub frame_time: Duration,
    /// `accumulator / fixed_delta`, in `[0, 1)`.
    pub alpha: f32,
    pub stats: FixedStepStats,
}

/// Something advanced by the scheduler. Closures taking the step delta
/// implement it directly.
pub trait Simulation {
    /// Advance by `dt` seconds. An error stops the frame and pauses the
    /// scheduler.
    fn step(&mut self, dt: f32) -> Result<()>;

    /// Called once per frame after the frame's steps (also while paused).
    fn end_frame(&mut self, _report: &FrameReport) {}
}

impl<F: FnMut(f32)> Simulation for F {
    fn step(&mut self, dt: f32) -> Result<()> {
        self(dt);
        Ok(())
    }
}

/// Accumulator core. Hosts that own their loop call [`frame`](Self::frame)
/// directly; [`start`] wires it to a [`TickSource`].
pub struct FixedStep<C> {
    clock: C,
    hz: f64,
    fixed_delta: Duration,
    dt: f32,
    max_accumulated: Duration,
    accumulator: Duration,
    last_sample: Duration,
    last_elapsed: Duration,
    paused: bool,
    steps_last_frame: u32,
    last_step_duration: Duration,
    total_steps: u64,
    frames: u64,
    clamped_frames: u64,
}

impl<C: Clock> FixedStep<C> {
    pub fn new(cfg: &FixedStepConfig, clock: C) -> Result<Self> {
        let (fixed_delta, max_accumulated) = cfg.validate()?;
        let last_sample = clock.now();
        Ok(Self {
            clock,
            hz: cfg.hz,
            fixed_delta,
            dt: fixed_delta.as_secs_f32(),
            max_accumulated,
            accumulator: Duration::ZERO,
            last_sample,
            last_elapsed: Duration::ZERO,
            paused: false,
            steps_last_frame: 0,
            last_step_duration: Duration::ZERO,
            total_steps: 0,
            frames: 0,
            clamped_frames: 0,
        })
    }

    /// Run one render frame's worth of steps against `sim`. A failing step
    /// ends the frame early, pauses the scheduler and returns its error;
    /// `end_frame` is not called for that frame.
    pub fn frame<S: Simulation + ?Sized>(&mut self, sim: &mut S) -> Result<FrameReport> {
        let due = self.begin_frame();
        for _ in 0..due {
            let started = self.clock.now();
            let outcome = sim.step(self.dt);
            self.record_step(started);
            if let Err(err) = outcome {
                self.fail(&err);
                return Err(err);
            }
        }
        let report = self.finish_frame(due);
        sim.end_frame(&report);
        Ok(report)
    }

    /// Sample the clock, credit elapsed time and consume every whole step
    /// due this frame. Returns the number of steps to run.
    fn begin_frame(&mut self) -> u32 {
        let now = self.clock.now();
        let elapsed = now.saturating_sub(self.last_sample);
        self.last_sample = now;
        self.last_elapsed = elapsed;
        self.steps_last_frame = 0;
        if self.paused {
            return 0;
        }

        if elapsed > self.max_accumulated {
            self.clamped_frames += 1;
            warn!(
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                max_ms = self.max_accumulated.as_secs_f64() * 1000.0,
                "frame time spike clamped"
            );
            self.accumulator = (self.accumulator + self.max_accumulated).min(self.max_accumulated);
        } else {
            self.accumulator += elapsed;
        }

        let due = self.accumulator.as_nanos() / self.fixed_delta.as_nanos();
        let due = u32::try_from(due).unwrap_or(u32::MAX);
        self.accumulator -= self.fixed_delta * due;
        due
    }

    fn record_step(&mut self, started: Duration) {
        self.last_step_duration = self.clock.now().saturating_sub(started);
        self.steps_last_frame += 1;
        self.total_steps += 1;
    }

    // Steps still owed this frame are dropped along with the leftover.
    fn fail(&mut self, err: &Error) {
        error!(%err, total_steps = self.total_steps, "simulation step failed, pausing");
        self.frames += 1;
        self.accumulator = Duration::ZERO;
        self.paused = true;
    }

    fn finish_frame(&mut self, steps: u32) -> FrameReport {
        self.frames += 1;
        FrameReport {
            steps,
            frame_time: self.last_elapsed,
            alpha: self.interpolation_alpha(),
            stats: self.stats(),
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
        self.steps_last_frame = 0;
    }

    /// Resume from now; time spent paused is discarded, not caught up.
    pub fn resume(&mut self) {
        self.paused = false;
        self.last_sample = self.clock.now();
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Fraction of a step left in the accumulator, in `[0, 1)`.
    pub fn interpolation_alpha(&self) -> f32 {
        (self.accumulator.as_secs_f64() / self.fixed_delta.as_secs_f64()) as f32
    }

    /// The constant delta handed to every step, in seconds.
    pub fn fixed_dt(&self) -> f32 {
        self.dt
    }

    pub fn stats(&self) -> FixedStepStats {
        FixedStepStats {
            hz: self.hz,
            fixed_delta: self.fixed_delta,
            steps_last_frame: self.steps_last_frame,
            last_step_duration: self.last_step_duration,
            total_steps: self.total_steps,
            frames: self.frames,
            clamped_frames: self.clamped_frames,
            accumulator: self.accumulator,
            paused: self.paused,
        }
    }
}

struct Shared<S, C> {
    core: RefCell<FixedStep<C>>,
    sim: RefCell<S>,
    failure: RefCell<Option<Error>>,
}

/// Controller returned by [`start`]. Dropping it detaches.
pub struct FixedStepHandle<S: Simulation + 'static, C: Clock + 'static> {
    shared: Rc<Shared<S, C>>,
    subscription: Option<(Rc<dyn TickSource>, SubscriptionId)>,
}

/// Subscribe a fixed-step driver for `sim` to `source`.
pub fn start<S, C>(
    source: Rc<dyn TickSource>,
    clock: C,
    cfg: &FixedStepConfig,
    sim: S,
) -> Result<FixedStepHandle<S, C>>
where
    S: Simulation + 'static,
    C: Clock + 'static,
{
    let core = FixedStep::new(cfg, clock)?;
    let shared = Rc::new(Shared {
        core: RefCell::new(core),
        sim: RefCell::new(sim),
        failure: RefCell::new(None),
    });
    let tick_shared = Rc::clone(&shared);
    let id = source.subscribe(Box::new(move || run_frame(&tick_shared)));
    info!(hz = cfg.hz, max_accumulated_time = cfg.max_accumulated_time, "fixed-step started");
    Ok(FixedStepHandle {
        shared,
        subscription: Some((source, id)),
    })
}

// The core is never borrowed across a step, so the simulation may read stats
// or pause/resume the controller from inside `step`.
fn run_frame<S: Simulation, C: Clock>(shared: &Shared<S, C>) {
    let due = shared.core.borrow_mut().begin_frame();
    for _ in 0..due {
        let (started, dt) = {
            let core = shared.core.borrow();
            (core.clock.now(), core.dt)
        };
        let outcome = shared.sim.borrow_mut().step(dt);
        shared.core.borrow_mut().record_step(started);
        if let Err(err) = outcome {
            shared.core.borrow_mut().fail(&err);
            *shared.failure.borrow_mut() = Some(err);
            return;
        }
    }
    let report = shared.core.borrow_mut().finish_frame(due);
    shared.sim.borrow_mut().end_frame(&report);
}

impl<S: Simulation + 'static, C: Clock + 'static> FixedStepHandle<S, C> {
    pub fn pause(&self) -> Result<()> {
        self.ensure_attached()?;
        self.shared.core.borrow_mut().pause();
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.ensure_attached()?;
        self.shared.core.borrow_mut().resume();
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.shared.core.borrow().is_paused()
    }

    /// The error that stopped the most recent failing step, if not yet taken.
    /// The scheduler stays paused until [`resume`](Self::resume).
    pub fn take_error(&self) -> Option<Error> {
        self.shared.failure.borrow_mut().take()
    }

    pub fn is_detached(&self) -> bool {
        self.subscription.is_none()
    }

    /// Unsubscribe permanently. Later calls are no-ops.
    pub fn detach(&mut self) {
        if let Some((source, id)) = self.subscription.take() {
            source.unsubscribe(id);
            let stats = self.stats();
            info!(total_steps = stats.total_steps, frames = stats.frames, "fixed-step detached");
        }
    }

    pub fn stats(&self) -> FixedStepStats {
        self.shared.core.borrow().stats()
    }

    pub fn interpolation_alpha(&self) -> f32 {
        self.shared.core.borrow().interpolation_alpha()
    }

    /// Borrow the driven simulation. Must not be called from inside its own step.
    pub fn with_simulation<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.shared.sim.borrow_mut())
    }

    fn ensure_attached(&self) -> Result<()> {
        if self.subscription.is_none() {
            return Err(Error::Detached);
        }
        Ok(())
    }
}

impl<S: Simulation + 'static, C: Clock + 'static> Drop for FixedStepHandle<S, C> {
    fn drop(&mut self) {
        self.detach();
    }
}
