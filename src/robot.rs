use alloc::rc::Rc;
use core::{cell::RefCell, time::Duration};

use log::{info, warn};

use crate::{
    commands::{self, MoveArm},
    config::{RobotConfig, DEFAULT_PERIOD_MS, PRESET_COUNT},
    control::{ArmDirection, PositionServo, VelocityServo},
    drive::{DriveWithJoystick, Drivetrain, Joystick},
    hardware::{Actuator, Clock},
    roller::Roller,
    sequence::PhaseSequencer,
    tunable::SharedStore,
    CommandRef, CommandScheduler, Result, SetDefaultCommandError,
};

pub const ITERATION_PERIOD: Duration = Duration::from_millis(DEFAULT_PERIOD_MS as u64);

/// What the field is asking the robot to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotMode {
    Disabled,
    Autonomous,
    Opcontrol,
}

pub trait ScheduledRobot {
    fn periodic(&mut self) -> Result {
        Ok(())
    }
    fn disabled_init(&mut self) -> Result {
        Ok(())
    }
    fn disabled_periodic(&mut self) -> Result {
        Ok(())
    }
    fn autonomous_init(&mut self) -> Result {
        Ok(())
    }
    fn autonomous_periodic(&mut self) -> Result {
        Ok(())
    }
    fn opcontrol_init(&mut self) -> Result {
        Ok(())
    }
    fn opcontrol_periodic(&mut self) -> Result {
        Ok(())
    }
}

/// Calls a [`ScheduledRobot`]'s hooks for one tick, running the `*_init`
/// hook whenever the mode changes.
///
/// The host owns the loop and the tick rate ([`ITERATION_PERIOD`]).
#[derive(Debug, Default)]
pub struct ModeTracker {
    previous: Option<RobotMode>,
}

impl ModeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, robot: &mut impl ScheduledRobot, mode: RobotMode) -> Result {
        let entering = self.previous != Some(mode);
        match mode {
            RobotMode::Disabled => {
                if entering {
                    robot.disabled_init()?;
                }
                robot.disabled_periodic()?;
            }
            RobotMode::Autonomous => {
                if entering {
                    robot.autonomous_init()?;
                }
                robot.autonomous_periodic()?;
            }
            RobotMode::Opcontrol => {
                if entering {
                    robot.opcontrol_init()?;
                }
                robot.opcontrol_periodic()?;
            }
        }
        self.previous = Some(mode);

        robot.periodic()
    }

    pub fn mode(&self) -> Option<RobotMode> {
        self.previous
    }
}

/// The motors the robot is built from.
#[derive(Debug)]
pub struct RobotHardware<A> {
    pub shooter_up: A,
    pub shooter_down: A,
    pub arm: A,
    pub roller: A,
    pub drive_left: A,
    pub drive_right: A,
}

/// Every subsystem and operator command of the robot, plus the scheduler
/// that runs them.
pub struct Robot<A> {
    scheduler: CommandScheduler,
    store: SharedStore,
    config: RobotConfig,
    shooter: Rc<RefCell<VelocityServo<A>>>,
    arm: Rc<RefCell<PositionServo<A>>>,
    roller: Rc<RefCell<Roller<A>>>,
    drivetrain: Rc<RefCell<Drivetrain<A>>>,
    shoot: [CommandRef; PRESET_COUNT],
    arm_up: CommandRef,
    arm_down: CommandRef,
    intake: CommandRef,
    eject: CommandRef,
}

impl<A: Actuator + 'static> Robot<A> {
    pub fn new(hardware: RobotHardware<A>, store: SharedStore, clock: Rc<dyn Clock>) -> Self {
        let config = RobotConfig::get_params(&*store.borrow());
        let period_ms = config.period_ms;
        let tick = f64::from(period_ms) / 1000.0;

        let mut scheduler = CommandScheduler::new();
        let shooter = scheduler.register(
            VelocityServo::new(
                hardware.shooter_up,
                hardware.shooter_down,
                config.shooter.gains,
                config.shooter.limits,
                tick,
            )
            .with_feedforward(config.shooter.kv),
        );
        let arm = scheduler.register(PositionServo::new(hardware.arm, config.arm, period_ms));
        let roller = scheduler.register(Roller::new(hardware.roller));
        let drivetrain = scheduler.register(Drivetrain::new(
            hardware.drive_left,
            hardware.drive_right,
            &config.drive,
        ));

        let shoot = core::array::from_fn(|preset| {
            CommandRef::from(PhaseSequencer::new(
                roller.clone(),
                shooter.clone(),
                store.clone(),
                clock.clone(),
                preset,
                period_ms,
            ))
        });
        let arm_up = CommandRef::from(MoveArm::new(
            arm.clone(),
            store.clone(),
            clock.clone(),
            ArmDirection::Up,
        ));
        let arm_down = CommandRef::from(MoveArm::new(
            arm.clone(),
            store.clone(),
            clock,
            ArmDirection::Down,
        ));
        let intake = CommandRef::from(commands::intake(&roller, store.clone()));
        let eject = CommandRef::from(commands::eject(&roller, store.clone()));

        Self {
            scheduler,
            store,
            config,
            shooter,
            arm,
            roller,
            drivetrain,
            shoot,
            arm_up,
            arm_down,
            intake,
            eject,
        }
    }

    /// Makes the drivetrain follow `joystick` whenever nothing else needs it.
    pub fn set_drive_joystick(
        &mut self,
        joystick: impl Joystick + 'static,
    ) -> Result<(), SetDefaultCommandError> {
        let command = DriveWithJoystick::new(self.drivetrain.clone(), joystick, self.store.clone());
        self.scheduler.set_default_command(&self.drivetrain, command)
    }

    /// Starts the shoot routine for one flywheel preset.
    pub fn shoot(&mut self, preset: usize) -> Result {
        match self.shoot.get(preset) {
            Some(command) => {
                let command = command.clone();
                self.scheduler.schedule(command)
            }
            None => {
                warn!("No shoot preset {preset}");
                Ok(())
            }
        }
    }

    pub fn move_arm(&mut self, direction: ArmDirection) -> Result {
        let command = match direction {
            ArmDirection::Up => self.arm_up.clone(),
            ArmDirection::Down => self.arm_down.clone(),
        };
        self.scheduler.schedule(command)
    }

    pub fn intake(&mut self) -> Result {
        self.scheduler.schedule(self.intake.clone())
    }

    pub fn eject(&mut self) -> Result {
        self.scheduler.schedule(self.eject.clone())
    }

    /// Ends whichever roller command is running.
    pub fn release_roller(&mut self) -> Result {
        let intake = self.scheduler.cancel(&self.intake);
        let eject = self.scheduler.cancel(&self.eject);
        intake.and(eject)
    }

    /// Publishes every tunable under its store key.
    pub fn put_params(&self) {
        self.config.put_params(&mut *self.store.borrow_mut());
    }

    /// Reloads every tunable.
    ///
    /// Only controller gains reach the servos now, without clearing error
    /// history. Limits, profiles and timings are picked up by each command
    /// the next time it starts, so a running routine keeps the values it
    /// started with.
    pub fn get_params(&mut self) -> &RobotConfig {
        self.config = RobotConfig::get_params(&*self.store.borrow());
        let config = &self.config;

        self.shooter.borrow_mut().set_gains(config.shooter.gains);
        self.arm.borrow_mut().set_gains(config.arm.gains);
        self.drivetrain.borrow_mut().configure(&config.drive);
        info!("Parameters reloaded");
        &self.config
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &CommandScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut CommandScheduler {
        &mut self.scheduler
    }

    pub fn shooter(&self) -> &Rc<RefCell<VelocityServo<A>>> {
        &self.shooter
    }

    pub fn arm(&self) -> &Rc<RefCell<PositionServo<A>>> {
        &self.arm
    }

    pub fn roller(&self) -> &Rc<RefCell<Roller<A>>> {
        &self.roller
    }

    pub fn drivetrain(&self) -> &Rc<RefCell<Drivetrain<A>>> {
        &self.drivetrain
    }

    pub fn shoot_command(&self, preset: usize) -> Option<&CommandRef> {
        self.shoot.get(preset)
    }

    pub fn arm_command(&self, direction: ArmDirection) -> &CommandRef {
        match direction {
            ArmDirection::Up => &self.arm_up,
            ArmDirection::Down => &self.arm_down,
        }
    }
}

impl<A: Actuator + 'static> ScheduledRobot for Robot<A> {
    fn periodic(&mut self) -> Result {
        self.scheduler.run()
    }

    fn disabled_init(&mut self) -> Result {
        self.scheduler.set_disabled(true)
    }

    fn autonomous_init(&mut self) -> Result {
        self.get_params();
        self.scheduler.set_disabled(false)
    }

    fn opcontrol_init(&mut self) -> Result {
        self.get_params();
        self.scheduler.set_disabled(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        control::Gains,
        sim::{ManualClock, SimMotor},
        tunable::{MemoryStore, TunableStore},
    };

    fn robot() -> (Robot<SimMotor>, SharedStore) {
        let hardware = RobotHardware {
            shooter_up: SimMotor::new("shooter up"),
            shooter_down: SimMotor::new("shooter down"),
            arm: SimMotor::new("arm"),
            roller: SimMotor::new("roller"),
            drive_left: SimMotor::new("drive left"),
            drive_right: SimMotor::new("drive right"),
        };
        let store = MemoryStore::new().shared();
        let robot = Robot::new(hardware, store.clone(), Rc::new(ManualClock::new(0.0)));
        (robot, store)
    }

    #[derive(Default)]
    struct Recorder {
        calls: alloc::vec::Vec<&'static str>,
    }

    impl ScheduledRobot for Recorder {
        fn periodic(&mut self) -> Result {
            self.calls.push("periodic");
            Ok(())
        }
        fn disabled_init(&mut self) -> Result {
            self.calls.push("disabled_init");
            Ok(())
        }
        fn opcontrol_init(&mut self) -> Result {
            self.calls.push("opcontrol_init");
            Ok(())
        }
    }

    #[test]
    fn init_hooks_run_on_mode_change_only() {
        let mut tracker = ModeTracker::new();
        let mut recorder = Recorder::default();
        tracker.tick(&mut recorder, RobotMode::Disabled).unwrap();
        tracker.tick(&mut recorder, RobotMode::Opcontrol).unwrap();
        tracker.tick(&mut recorder, RobotMode::Opcontrol).unwrap();
        assert_eq!(
            recorder.calls,
            [
                "disabled_init",
                "periodic",
                "opcontrol_init",
                "periodic",
                "periodic"
            ]
        );
        assert_eq!(tracker.mode(), Some(RobotMode::Opcontrol));
    }

    #[test]
    fn put_params_publishes_defaults() {
        let (robot, store) = robot();
        robot.put_params();
        assert_eq!(
            store.borrow().get_number("shooter/kp", -1.0),
            RobotConfig::default().shooter.gains.p
        );
        assert_eq!(store.borrow().get_number("drive/turn_limit", -1.0), 0.6);
    }

    #[test]
    fn get_params_applies_new_gains() {
        let (mut robot, store) = robot();
        store.borrow_mut().put_number("shooter/kp", 0.07);
        let config = robot.get_params();
        assert_eq!(config.shooter.gains.p, 0.07);
        assert_eq!(robot.shooter().borrow().gains(), Gains::new(0.07, 0.0, 0.5));
    }

    #[test]
    fn unknown_preset_is_ignored() {
        let (mut robot, _store) = robot();
        robot.shoot(PRESET_COUNT).unwrap();
        assert_eq!(robot.scheduler().scheduled_count(), 0);
    }
}
