//! Operator-facing commands for the arm and the roller.

use alloc::rc::Rc;
use core::cell::RefCell;

use log::{info, warn};

use crate::{
    command::{Command, FunctionalCommand},
    config::{ArmConfig, RollerConfig},
    control::{ArmDirection, ArmStrategy, PositionServo},
    hardware::{Actuator, Clock, TickTimer},
    roller::Roller,
    subsystem::SubsystemRefExt,
    tunable::SharedStore,
    Result, SubsystemRef,
};

/// Moves the arm to one end of its travel.
///
/// The strategy comes from the store (`arm/closed_loop`) unless one is
/// injected with [`MoveArm::with_strategy`]. A closed-loop move that has not
/// settled after `arm/closed_loop_timeout_ms` finishes anyway.
pub struct MoveArm<A> {
    arm: Rc<RefCell<PositionServo<A>>>,
    store: SharedStore,
    clock: Rc<dyn Clock>,
    timer: TickTimer,
    direction: ArmDirection,
    strategy: Option<ArmStrategy>,
    timeout_ms: u32,
    requirements: [SubsystemRef; 1],
}

impl<A: Actuator + 'static> MoveArm<A> {
    pub fn new(
        arm: Rc<RefCell<PositionServo<A>>>,
        store: SharedStore,
        clock: Rc<dyn Clock>,
        direction: ArmDirection,
    ) -> Self {
        let requirements = [SubsystemRef(arm.clone())];
        Self {
            arm,
            store,
            clock,
            timer: TickTimer::default(),
            direction,
            strategy: None,
            timeout_ms: ArmConfig::default().closed_loop_timeout_ms,
            requirements,
        }
    }

    pub fn with_strategy(mut self, strategy: ArmStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn direction(&self) -> ArmDirection {
        self.direction
    }
}

impl<A: Actuator + 'static> Command for MoveArm<A> {
    fn get_requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result {
        let config = ArmConfig::get_params(&*self.store.borrow());
        let strategy = self.strategy.unwrap_or(config.strategy);
        self.timeout_ms = config.closed_loop_timeout_ms;
        self.timer.restart();

        let mut arm = self.arm.borrow_mut();
        arm.apply_config(config);
        arm.initialize(self.direction, strategy)
    }

    fn step(&mut self) -> Result {
        let dt = self.timer.lap(&*self.clock);
        self.arm.borrow_mut().step(dt)
    }

    fn end(&mut self, interrupted: bool) -> Result {
        let mut arm = self.arm.borrow_mut();
        if interrupted {
            info!("Arm move {:?} interrupted", self.direction);
        } else if !arm.is_done() {
            warn!(
                "Arm move {:?} timed out after {} ms",
                self.direction,
                arm.elapsed_ms()
            );
        } else {
            info!("Arm move {:?} finished", self.direction);
        }
        arm.stop()
    }

    fn is_finished(&self) -> bool {
        let arm = self.arm.borrow();
        arm.is_done()
            || (arm.strategy() == ArmStrategy::ClosedLoop && arm.elapsed_ms() >= self.timeout_ms)
    }
}

/// Runs the roller inward until interrupted, then stops it.
pub fn intake<A: Actuator + 'static>(
    roller: &Rc<RefCell<Roller<A>>>,
    store: SharedStore,
) -> FunctionalCommand {
    roller_at(roller, store, |config| config.intake_speed)
}

/// Runs the roller outward until interrupted, then stops it.
pub fn eject<A: Actuator + 'static>(
    roller: &Rc<RefCell<Roller<A>>>,
    store: SharedStore,
) -> FunctionalCommand {
    roller_at(roller, store, |config| config.eject_speed)
}

fn roller_at<A: Actuator + 'static>(
    roller: &Rc<RefCell<Roller<A>>>,
    store: SharedStore,
    speed: fn(&RollerConfig) -> f64,
) -> FunctionalCommand {
    let start = roller.clone();
    let end = roller.clone();
    roller.start_end(
        move || {
            let config = RollerConfig::get_params(&*store.borrow());
            start.borrow_mut().run(speed(&config))
        },
        move || end.borrow_mut().stop(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sim::{ManualClock, SimMotor},
        tunable::{MemoryStore, TunableStore},
    };

    fn arm() -> (Rc<RefCell<PositionServo<SimMotor>>>, SimMotor) {
        let motor = SimMotor::new("arm");
        let servo = PositionServo::new(motor.clone(), ArmConfig::default(), 20);
        (Rc::new(RefCell::new(servo)), motor)
    }

    #[test]
    fn timed_move_finishes_after_brake_window() {
        let (servo, motor) = arm();
        let clock = ManualClock::new(0.0);
        let mut command = MoveArm::new(
            servo.clone(),
            MemoryStore::new().shared(),
            Rc::new(clock.clone()),
            ArmDirection::Up,
        );
        command.initialize().unwrap();

        let mut ticks = 0;
        while !command.is_finished() {
            command.step().unwrap();
            clock.advance(0.02);
            ticks += 1;
        }
        // Last tick at t = 760 ms.
        assert_eq!(ticks, 39);
        assert_eq!(motor.output(), 0.0);
        assert_eq!(motor.history()[0], ArmConfig::default().pulse_up.speed);
    }

    #[test]
    fn closed_loop_move_times_out() {
        let (servo, motor) = arm();
        let mut store = MemoryStore::new();
        store.put_number("arm/closed_loop_timeout_ms", 200.0);
        let mut command = MoveArm::new(
            servo.clone(),
            store.shared(),
            Rc::new(ManualClock::new(0.0)),
            ArmDirection::Down,
        )
        .with_strategy(ArmStrategy::ClosedLoop);
        command.initialize().unwrap();

        for _ in 0..10 {
            assert!(!command.is_finished());
            command.step().unwrap();
        }
        assert!(command.is_finished());
        assert!(!servo.borrow().is_done());
        assert_ne!(motor.output(), 0.0);

        command.end(false).unwrap();
        assert_eq!(motor.output(), 0.0);
    }

    #[test]
    fn store_selects_strategy() {
        let (servo, _motor) = arm();
        let mut store = MemoryStore::new();
        store.put_number("arm/closed_loop", 1.0);
        let mut command = MoveArm::new(
            servo.clone(),
            store.shared(),
            Rc::new(ManualClock::new(0.0)),
            ArmDirection::Up,
        );
        command.initialize().unwrap();
        assert_eq!(servo.borrow().strategy(), ArmStrategy::ClosedLoop);
    }

    #[test]
    fn roller_commands_use_configured_speeds() {
        let motor = SimMotor::new("roller");
        let roller = Rc::new(RefCell::new(Roller::new(motor.clone())));
        let mut store = MemoryStore::new();
        store.put_number("roller/eject_speed", -0.5);
        let store = store.shared();

        let mut command = intake(&roller, store.clone());
        command.initialize().unwrap();
        assert_eq!(motor.output(), RollerConfig::default().intake_speed);
        command.end(true).unwrap();
        assert_eq!(motor.output(), 0.0);

        let mut command = eject(&roller, store);
        command.initialize().unwrap();
        command.step().unwrap();
        assert_eq!(motor.output(), -0.5);
        assert!(!command.is_finished());
        command.end(true).unwrap();
        assert_eq!(motor.output(), 0.0);
    }
}
