//! Position control of the gravity-loaded arm.

use libm::fabs;
use log::{debug, info};

use super::{sign_of, DifferenceController, Formulation, Gains, ServoConfig, ServoState};
use crate::{config::ArmConfig, hardware::Actuator, subsystem::Subsystem, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmDirection {
    Up,
    Down,
}

/// How the arm gets to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmStrategy {
    /// Open-loop drive, coast, brake, then zero, on fixed windows.
    #[default]
    TimedPulse,
    /// Ramp at minimum output, then track the target angle until settled.
    ClosedLoop,
}

/// One direction's open-loop pulse.
///
/// `[0, move_end)` drives at `speed`, `[move_end, pause_end)` coasts at zero,
/// `[pause_end, brake_end)` applies `brake_speed`, and from `brake_end` on the
/// output stays at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseProfile {
    pub speed: f64,
    pub brake_speed: f64,
    pub move_end_ms: u32,
    pub pause_end_ms: u32,
    pub brake_end_ms: u32,
}

impl PulseProfile {
    pub fn output_at(&self, elapsed_ms: u32) -> f64 {
        if elapsed_ms < self.move_end_ms {
            self.speed
        } else if elapsed_ms < self.pause_end_ms {
            0.0
        } else if elapsed_ms < self.brake_end_ms {
            self.brake_speed
        } else {
            0.0
        }
    }

    /// Keeps the windows in order and the speeds inside `[-1, 1]`.
    pub fn sanitized(self) -> Self {
        let pause_end_ms = self.pause_end_ms.max(self.move_end_ms);
        Self {
            speed: self.speed.clamp(-1.0, 1.0),
            brake_speed: self.brake_speed.clamp(-1.0, 1.0),
            move_end_ms: self.move_end_ms,
            pause_end_ms,
            brake_end_ms: self.brake_end_ms.max(pause_end_ms),
        }
    }
}

/// Moves the arm up or down, either by a timed pulse or in closed loop.
///
/// Whatever the strategy, the actuator is left at zero once the move is over;
/// the arm rests on its hard stops rather than being held under power.
#[derive(Debug)]
pub struct PositionServo<A> {
    actuator: A,
    controller: DifferenceController,
    config: ArmConfig,
    limits: ServoConfig,
    period_ms: u32,
    direction: ArmDirection,
    strategy: ArmStrategy,
    ticks: u32,
    command: f64,
    done: bool,
    state: ServoState,
}

impl<A: Actuator> PositionServo<A> {
    pub fn new(actuator: A, config: ArmConfig, period_ms: u32) -> Self {
        let tick = f64::from(period_ms) / 1000.0;
        Self {
            actuator,
            controller: DifferenceController::new(config.gains, Formulation::Incremental, tick),
            limits: config.limits.sanitized(),
            strategy: config.strategy,
            config,
            period_ms,
            direction: ArmDirection::Down,
            ticks: 0,
            command: 0.0,
            done: false,
            state: ServoState::Idle,
        }
    }

    pub fn initialize(&mut self, direction: ArmDirection, strategy: ArmStrategy) -> Result {
        let target = match direction {
            ArmDirection::Up => self.config.angle_up,
            ArmDirection::Down => self.config.angle_down,
        };
        info!("Arm moving {direction:?} ({strategy:?}), target {target:.2}");

        self.actuator.reset_position()?;
        self.controller.reset();
        self.limits.target = target;
        self.direction = direction;
        self.strategy = strategy;
        self.ticks = 0;
        self.command = 0.0;
        self.done = false;
        self.state = ServoState::Idle;
        Ok(())
    }

    pub fn step(&mut self, dt: f64) -> Result {
        let elapsed_ms = self.elapsed_ms();
        self.ticks = self.ticks.saturating_add(1);

        match self.strategy {
            ArmStrategy::TimedPulse => self.step_pulse(elapsed_ms),
            ArmStrategy::ClosedLoop => self.step_closed_loop(dt),
        }
    }

    fn step_pulse(&mut self, elapsed_ms: u32) -> Result {
        let pulse = self.pulse();
        self.command = pulse.output_at(elapsed_ms);
        if elapsed_ms >= pulse.brake_end_ms {
            self.done = true;
            self.state = ServoState::Settled;
        } else {
            self.state = ServoState::Tracking;
        }
        debug!("Arm pulse: t {elapsed_ms} ms, output {:.3}", self.command);
        self.actuator.set_output(self.command)
    }

    fn step_closed_loop(&mut self, dt: f64) -> Result {
        if self.done {
            self.command = 0.0;
            return self.actuator.set_output(0.0);
        }

        let target = self.limits.target;
        let direction = sign_of(target);

        if fabs(self.command) < self.limits.min_output {
            self.state = ServoState::RampUp;
            self.command = direction * self.limits.min_output;
            debug!("Arm starting with output {:.3}", self.command);
            return self.actuator.set_output(self.command);
        }

        let sample = self.actuator.sample()?;
        if self.is_at_position(target, sample.position, sample.velocity) {
            self.state = ServoState::Settled;
            self.command = 0.0;
            self.done = true;
            info!(
                "Arm at set point: {:.2}, velocity {:.3}",
                sample.position, sample.velocity
            );
            return self.actuator.set_output(0.0);
        }

        self.state = ServoState::Tracking;
        let correction = self.controller.compute_correction(sample.position, target, dt);
        self.command = self.limits.clamp_directed(correction, direction);
        debug!(
            "Arm: pos {:.2}, vel {:.3}, correction {correction:.4}, output {:.4}",
            sample.position, sample.velocity, self.command
        );
        self.actuator.set_output(self.command)
    }

    fn is_at_position(&self, target: f64, position: f64, velocity: f64) -> bool {
        fabs(1.0 - position / target) < self.limits.position_tolerance
            && fabs(velocity) < self.limits.velocity_tolerance
    }

    /// Commands the arm to zero.
    pub fn stop(&mut self) -> Result {
        self.command = 0.0;
        self.actuator.set_output(0.0)
    }

    /// Time into the current move at the start of the next tick.
    pub fn elapsed_ms(&self) -> u32 {
        self.ticks.saturating_mul(self.period_ms)
    }

    /// Set once the move has completed; cleared only by [`Self::initialize`].
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn state(&self) -> ServoState {
        self.state
    }

    pub fn strategy(&self) -> ArmStrategy {
        self.strategy
    }

    pub fn direction(&self) -> ArmDirection {
        self.direction
    }

    pub fn commanded(&self) -> f64 {
        self.command
    }

    pub fn pulse(&self) -> PulseProfile {
        match self.direction {
            ArmDirection::Up => self.config.pulse_up,
            ArmDirection::Down => self.config.pulse_down,
        }
    }

    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    /// Replaces the controller gains, keeping its error history.
    pub fn set_gains(&mut self, gains: Gains) {
        self.controller.set_gains(gains);
    }

    pub fn gains(&self) -> Gains {
        self.controller.gains()
    }

    /// Adopts freshly loaded parameters. Gains change without clearing the
    /// controller history; the current target is kept until the next move.
    pub fn apply_config(&mut self, config: ArmConfig) {
        self.controller.set_gains(config.gains);
        self.limits = config.limits.sanitized().with_target(self.limits.target);
        self.config = config;
    }
}

impl<A: Actuator> Subsystem for PositionServo<A> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{control::Gains, sim::SimMotor};

    fn config() -> ArmConfig {
        ArmConfig {
            pulse_up: PulseProfile {
                speed: -0.4,
                brake_speed: 0.1,
                move_end_ms: 360,
                pause_end_ms: 620,
                brake_end_ms: 760,
            },
            pulse_down: PulseProfile {
                speed: 0.4,
                brake_speed: -0.1,
                move_end_ms: 360,
                pause_end_ms: 620,
                brake_end_ms: 760,
            },
            gains: Gains::new(0.2, 0.0, 0.05),
            limits: ServoConfig {
                target: 0.0,
                min_output: 0.05,
                max_output: 0.5,
                position_tolerance: 0.05,
                velocity_tolerance: 0.5,
            },
            angle_up: -10.0,
            angle_down: 10.0,
            ..ArmConfig::default()
        }
    }

    fn run_to(servo: &mut PositionServo<SimMotor>, motor: &SimMotor, elapsed_ms: u32) -> f64 {
        while servo.elapsed_ms() <= elapsed_ms {
            servo.step(0.02).unwrap();
        }
        motor.output()
    }

    #[test]
    fn pulse_windows() {
        let motor = SimMotor::new("arm");
        let mut servo = PositionServo::new(motor.clone(), config(), 20);
        servo.initialize(ArmDirection::Down, ArmStrategy::TimedPulse).unwrap();

        assert_eq!(run_to(&mut servo, &motor, 100), 0.4);
        // t = 500 is inside the coast window, [360, 620): the brake only
        // starts at `pause_end`.
        assert_eq!(run_to(&mut servo, &motor, 500), 0.0);
        assert_eq!(run_to(&mut servo, &motor, 700), -0.1);
        assert!(!servo.is_done());
        assert_eq!(run_to(&mut servo, &motor, 760), 0.0);
        assert!(servo.is_done());
        for _ in 0..10 {
            servo.step(0.02).unwrap();
            assert_eq!(motor.output(), 0.0);
        }
        assert!(servo.is_done());
    }

    #[test]
    fn pulse_up_uses_up_profile() {
        let motor = SimMotor::new("arm");
        let mut servo = PositionServo::new(motor.clone(), config(), 20);
        servo.initialize(ArmDirection::Up, ArmStrategy::TimedPulse).unwrap();
        assert_eq!(run_to(&mut servo, &motor, 0), -0.4);
        assert_eq!(run_to(&mut servo, &motor, 640), 0.1);
    }

    #[test]
    fn closed_loop_ramps_tracks_and_latches() {
        let motor = SimMotor::new("arm");
        let mut servo = PositionServo::new(motor.clone(), config(), 20);
        servo.initialize(ArmDirection::Up, ArmStrategy::ClosedLoop).unwrap();

        servo.step(0.0).unwrap();
        assert_eq!(servo.state(), ServoState::RampUp);
        assert_eq!(motor.output(), -0.05);

        motor.set_position(-2.0);
        motor.set_velocity(-3.0);
        servo.step(0.02).unwrap();
        assert_eq!(servo.state(), ServoState::Tracking);
        assert!((-0.5..=-0.05).contains(&motor.output()));

        // Close enough in position but still moving: keep tracking.
        motor.set_position(-9.8);
        servo.step(0.02).unwrap();
        assert!(!servo.is_done());

        motor.set_velocity(0.1);
        servo.step(0.02).unwrap();
        assert!(servo.is_done());
        assert_eq!(motor.output(), 0.0);

        // Latched even if the arm drifts away again.
        motor.set_position(-4.0);
        servo.step(0.02).unwrap();
        assert!(servo.is_done());
        assert_eq!(motor.output(), 0.0);

        servo.initialize(ArmDirection::Up, ArmStrategy::ClosedLoop).unwrap();
        assert!(!servo.is_done());
    }

    #[test]
    fn closed_loop_output_is_clamped() {
        let motor = SimMotor::new("arm");
        let mut servo = PositionServo::new(motor.clone(), config(), 20);
        servo.initialize(ArmDirection::Down, ArmStrategy::ClosedLoop).unwrap();
        servo.step(0.0).unwrap();
        for _ in 0..20 {
            servo.step(0.02).unwrap();
            assert!((0.05..=0.5).contains(&motor.output()));
        }
        assert_eq!(motor.output(), 0.5);
    }

    #[test]
    fn apply_config_keeps_history() {
        let motor = SimMotor::new("arm");
        let mut servo = PositionServo::new(motor.clone(), config(), 20);
        servo.initialize(ArmDirection::Down, ArmStrategy::ClosedLoop).unwrap();
        servo.step(0.0).unwrap();
        servo.step(0.02).unwrap();
        let integral = servo.controller.integral();
        assert!(integral > 0.0);

        let mut tuned = config();
        tuned.gains = Gains::new(0.3, 0.0, 0.0);
        servo.apply_config(tuned);
        assert_eq!(servo.controller.integral(), integral);
        assert_eq!(servo.controller.gains(), Gains::new(0.3, 0.0, 0.0));
    }
}
