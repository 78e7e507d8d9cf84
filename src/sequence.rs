//! The timed shoot routine: back the game piece off the flywheels, spin them
//! up, then feed.

use alloc::rc::Rc;
use core::cell::RefCell;

use log::{debug, info};

use crate::{
    command::Command,
    config::{SequenceConfig, ShooterConfig, TargetPair},
    control::VelocityServo,
    hardware::{Actuator, Clock, TickTimer},
    roller::Roller,
    tunable::SharedStore,
    Result, SubsystemRef,
};

/// One interval of the shoot timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Roller backs the game piece away from the flywheels.
    Backoff,
    /// Roller held at zero, flywheels idle. Also covers `t = 0`.
    Pause,
    /// Flywheels spin up, roller stopped.
    Spinup,
    /// Roller feeds while the flywheels keep tracking.
    Feed,
    Done,
}

/// Phase end times in milliseconds, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSchedule {
    boundaries: [u32; 4],
}

impl PhaseSchedule {
    /// Gap forced after each predecessor when a boundary is out of order.
    /// The first entry is the fallback for a backoff shorter than one tick.
    pub const MIN_INCREMENTS_MS: [u32; 4] = [400, 400, 1000, 1000];

    /// Builds a schedule from `[backoff_end, wait_end, spinup_end, feed_end]`.
    ///
    /// A boundary that is not after its predecessor becomes the predecessor
    /// plus its own minimum increment.
    pub fn new(boundaries: [u32; 4], period_ms: u32) -> Self {
        let mut repaired = boundaries;
        if repaired[0] < period_ms {
            repaired[0] = Self::MIN_INCREMENTS_MS[0];
        }
        for index in 1..repaired.len() {
            if repaired[index] <= repaired[index - 1] {
                repaired[index] =
                    repaired[index - 1].saturating_add(Self::MIN_INCREMENTS_MS[index]);
            }
        }
        Self {
            boundaries: repaired,
        }
    }

    pub fn boundaries(&self) -> [u32; 4] {
        self.boundaries
    }

    pub fn feed_end_ms(&self) -> u32 {
        self.boundaries[3]
    }

    pub fn phase_at(&self, t_ms: u32) -> Phase {
        let [backoff_end, wait_end, spinup_end, feed_end] = self.boundaries;
        match t_ms {
            t if t > 0 && t < backoff_end => Phase::Backoff,
            t if t < wait_end => Phase::Pause,
            t if t < spinup_end => Phase::Spinup,
            t if t < feed_end => Phase::Feed,
            _ => Phase::Done,
        }
    }
}

impl Default for PhaseSchedule {
    fn default() -> Self {
        SequenceConfig::default().schedule(crate::config::DEFAULT_PERIOD_MS)
    }
}

/// Runs the shoot routine for one flywheel preset.
///
/// Timing is counted in scheduler ticks: on tick `n` the routine is at
/// `t = n · period_ms`. Every tunable is read in [`Command::initialize`].
pub struct PhaseSequencer<A> {
    roller: Rc<RefCell<Roller<A>>>,
    shooter: Rc<RefCell<VelocityServo<A>>>,
    store: SharedStore,
    clock: Rc<dyn Clock>,
    timer: TickTimer,
    preset: usize,
    period_ms: u32,
    config: SequenceConfig,
    schedule: PhaseSchedule,
    ticks: u32,
    requirements: [SubsystemRef; 2],
}

impl<A: Actuator + 'static> PhaseSequencer<A> {
    pub fn new(
        roller: Rc<RefCell<Roller<A>>>,
        shooter: Rc<RefCell<VelocityServo<A>>>,
        store: SharedStore,
        clock: Rc<dyn Clock>,
        preset: usize,
        period_ms: u32,
    ) -> Self {
        let requirements = [SubsystemRef(roller.clone()), SubsystemRef(shooter.clone())];
        Self {
            roller,
            shooter,
            store,
            clock,
            timer: TickTimer::default(),
            preset,
            period_ms,
            config: SequenceConfig::default(),
            schedule: PhaseSchedule::default(),
            ticks: 0,
            requirements,
        }
    }

    pub fn preset(&self) -> usize {
        self.preset
    }

    pub fn schedule(&self) -> PhaseSchedule {
        self.schedule
    }

    /// Milliseconds into the routine at the next tick.
    pub fn elapsed_ms(&self) -> u32 {
        self.ticks.saturating_mul(self.period_ms)
    }

    fn target(&self, shooter: &ShooterConfig) -> TargetPair {
        shooter.presets[self.preset.min(shooter.presets.len() - 1)]
    }
}

impl<A: Actuator + 'static> Command for PhaseSequencer<A> {
    fn get_requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result {
        let (config, shooter_config) = {
            let store = self.store.borrow();
            (
                SequenceConfig::get_params(&*store),
                ShooterConfig::get_params(&*store),
            )
        };
        self.config = config;
        self.schedule = config.schedule(self.period_ms);
        self.ticks = 0;
        self.timer.restart();

        let target = self.target(&shooter_config);
        info!(
            "Shoot preset {} initializing: targets {:.0}/{:.0}, phases {:?}",
            self.preset,
            target.up,
            target.down,
            self.schedule.boundaries()
        );

        self.roller.borrow_mut().init()?;
        let mut shooter = self.shooter.borrow_mut();
        shooter.set_gains(shooter_config.gains);
        shooter.set_limits(shooter_config.limits);
        shooter.set_feedforward(shooter_config.kv);
        shooter.initialize(target.up, target.down)
    }

    fn step(&mut self) -> Result {
        let t = self.elapsed_ms();
        let dt = self.timer.lap(&*self.clock);
        self.ticks = self.ticks.saturating_add(1);

        let phase = self.schedule.phase_at(t);
        debug!("Shoot preset {}: t {t} ms, {phase:?}", self.preset);

        let mut roller = self.roller.borrow_mut();
        match phase {
            Phase::Backoff => roller.run(self.config.backoff_speed),
            Phase::Pause => roller.run(0.0),
            Phase::Spinup => {
                roller.stop()?;
                self.shooter.borrow_mut().step(dt)
            }
            Phase::Feed => {
                roller.run(self.config.feed_speed)?;
                self.shooter.borrow_mut().step(dt)
            }
            Phase::Done => {
                let stopped = roller.stop();
                stopped.and(self.shooter.borrow_mut().stop())
            }
        }
    }

    fn end(&mut self, interrupted: bool) -> Result {
        info!(
            "Shoot preset {} ended at {} ms{}",
            self.preset,
            self.elapsed_ms(),
            if interrupted { " (interrupted)" } else { "" }
        );
        let roller = self.roller.borrow_mut().stop();
        let shooter = self.shooter.borrow_mut().stop();
        roller.and(shooter)
    }

    /// True one tick after the routine reaches `feed_end`.
    fn is_finished(&self) -> bool {
        self.elapsed_ms() > self.schedule.feed_end_ms().saturating_add(self.period_ms)
    }
}
