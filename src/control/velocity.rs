//! Velocity control of the two shooter flywheels.

use libm::fabs;
use log::{debug, info};

use super::{sign_of, DifferenceController, Formulation, Gains, ServoConfig, ServoState};
use crate::{
    hardware::{Actuator, Polarity},
    subsystem::Subsystem,
    Result,
};

#[derive(Debug)]
struct Flywheel<A> {
    actuator: A,
    polarity: Polarity,
    controller: DifferenceController,
    config: ServoConfig,
    command: f64,
    fraction: f64,
}

impl<A: Actuator> Flywheel<A> {
    fn new(actuator: A, polarity: Polarity, gains: Gains, config: ServoConfig, tick: f64) -> Self {
        Self {
            actuator,
            polarity,
            controller: DifferenceController::new(gains, Formulation::TwoTap, tick),
            config,
            command: 0.0,
            fraction: 0.0,
        }
    }

    fn initialize(&mut self, target: f64) -> Result {
        self.actuator.reset_position()?;
        self.controller.reset();
        self.config.target = target;
        self.command = 0.0;
        self.fraction = 0.0;
        Ok(())
    }

    fn ramp(&mut self) -> Result {
        self.command = sign_of(self.config.target) * self.config.min_output;
        self.actuator.set_output(self.command)
    }

    /// Runs one correction and returns the measured velocity.
    fn track(&mut self, kv: f64, dt: f64) -> Result<f64> {
        let velocity = self.actuator.velocity()?;
        let measured = self.polarity.apply(velocity);
        let target = self.polarity.apply(self.config.target);

        let correction = kv * target + self.controller.compute_correction(measured, target, dt);
        self.fraction = correction / fabs(self.config.target);

        let framed = self.polarity.apply(self.command) + self.fraction;
        let framed = framed.clamp(self.config.min_output, self.config.max_output);
        self.command = self.polarity.apply(framed);
        self.actuator.set_output(self.command)?;
        Ok(velocity)
    }

    fn within_tolerance(&self) -> bool {
        fabs(self.fraction - 1.0) < self.config.position_tolerance
    }
}

/// Drives the upper and lower flywheels to independent velocity targets.
///
/// The lower wheel spins the opposite way for the same feed direction, so
/// by default it is wired [`Polarity::Reversed`]: its readings and target are
/// mapped into the shared frame before the controller sees them and its
/// output range is mirrored below zero.
///
/// Targets must be nonzero and point the same way as their wheel's polarity;
/// corrections are normalized by the target magnitude.
#[derive(Debug)]
pub struct VelocityServo<A> {
    up: Flywheel<A>,
    down: Flywheel<A>,
    kv: f64,
    state: ServoState,
    at_target: bool,
}

impl<A: Actuator> VelocityServo<A> {
    pub fn new(up: A, down: A, gains: Gains, limits: ServoConfig, tick: f64) -> Self {
        let limits = limits.sanitized();
        Self {
            up: Flywheel::new(up, Polarity::Forward, gains, limits, tick),
            down: Flywheel::new(down, Polarity::Reversed, gains, limits, tick),
            kv: 0.0,
            state: ServoState::Idle,
            at_target: false,
        }
    }

    pub fn with_polarities(mut self, up: Polarity, down: Polarity) -> Self {
        self.up.polarity = up;
        self.down.polarity = down;
        self
    }

    pub fn with_feedforward(mut self, kv: f64) -> Self {
        self.kv = kv;
        self
    }

    pub fn initialize(&mut self, target_up: f64, target_down: f64) -> Result {
        info!("Flywheels initializing: up {target_up:.1}, down {target_down:.1}");
        self.up.initialize(target_up)?;
        self.down.initialize(target_down)?;
        self.at_target = false;
        self.state = ServoState::Idle;
        Ok(())
    }

    pub fn step(&mut self, dt: f64) -> Result {
        if fabs(self.up.command) < self.up.config.min_output {
            self.state = ServoState::RampUp;
            self.up.ramp()?;
            self.down.ramp()?;
            debug!(
                "Flywheels ramping: {:.3}, {:.3}",
                self.up.command, self.down.command
            );
            return Ok(());
        }

        self.state = ServoState::Tracking;
        let velocity_up = self.up.track(self.kv, dt)?;
        let velocity_down = self.down.track(self.kv, dt)?;
        self.at_target = self.up.within_tolerance() && self.down.within_tolerance();

        debug!(
            "Flywheels: vel {velocity_up:.2}/{velocity_down:.2}, correction {:.4}/{:.4}, output {:.4}/{:.4}",
            self.up.fraction, self.down.fraction, self.up.command, self.down.command
        );
        Ok(())
    }

    /// Commands both flywheels to zero.
    pub fn stop(&mut self) -> Result {
        self.up.command = 0.0;
        self.down.command = 0.0;
        self.state = ServoState::Idle;
        let up = self.up.actuator.set_output(0.0);
        let down = self.down.actuator.set_output(0.0);
        up.and(down)
    }

    /// Whether both wheels' last corrections were within tolerance of unity.
    ///
    /// Telemetry only; nothing in the crate waits on it.
    pub fn at_target(&self) -> bool {
        self.at_target
    }

    pub fn state(&self) -> ServoState {
        self.state
    }

    /// Last commanded outputs, `(up, down)`.
    pub fn commanded(&self) -> (f64, f64) {
        (self.up.command, self.down.command)
    }

    pub fn targets(&self) -> (f64, f64) {
        (self.up.config.target, self.down.config.target)
    }

    /// Replaces both wheels' gains, keeping their error history.
    pub fn set_gains(&mut self, gains: Gains) {
        self.up.controller.set_gains(gains);
        self.down.controller.set_gains(gains);
    }

    pub fn gains(&self) -> Gains {
        self.up.controller.gains()
    }

    pub fn set_feedforward(&mut self, kv: f64) {
        self.kv = kv;
    }

    /// Replaces output limits and tolerances; current targets are kept.
    pub fn set_limits(&mut self, limits: ServoConfig) {
        let limits = limits.sanitized();
        self.up.config = limits.with_target(self.up.config.target);
        self.down.config = limits.with_target(self.down.config.target);
    }
}

impl<A: Actuator> Subsystem for VelocityServo<A> {}
