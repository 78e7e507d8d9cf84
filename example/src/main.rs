//! Runs the robot against simulated motors on the host: an arm move, then a
//! full shot with the first preset, logging to stdout.

use std::rc::Rc;

use log::{info, LevelFilter, Log, Metadata, Record};
use mechanism_command::{
    control::ArmDirection,
    robot::{ModeTracker, Robot, RobotHardware, RobotMode, ITERATION_PERIOD},
    sim::{ManualClock, SimMotor},
    tunable::MemoryStore,
};

struct StdoutLogger;

impl Log for StdoutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StdoutLogger = StdoutLogger;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    log::set_logger(&LOGGER).map_err(|err| err.to_string())?;
    log::set_max_level(if std::env::args().any(|arg| arg == "-v") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    let shooter_up = SimMotor::new("shooter up");
    let shooter_down = SimMotor::new("shooter down");
    let hardware = RobotHardware {
        shooter_up: shooter_up.clone(),
        shooter_down: shooter_down.clone(),
        arm: SimMotor::new("arm"),
        roller: SimMotor::new("roller"),
        drive_left: SimMotor::new("drive left"),
        drive_right: SimMotor::new("drive right"),
    };
    let store = MemoryStore::new().shared();
    let clock = ManualClock::new(0.0);
    let mut robot = Robot::new(hardware, store, Rc::new(clock.clone()));
    robot.put_params();

    let mut modes = ModeTracker::new();
    let period = ITERATION_PERIOD.as_secs_f64();
    let mut tick = |robot: &mut Robot<SimMotor>, mode| -> mechanism_command::Result {
        modes.tick(robot, mode)?;
        clock.advance(period);
        Ok(())
    };

    tick(&mut robot, RobotMode::Disabled)?;
    tick(&mut robot, RobotMode::Opcontrol)?;

    robot.move_arm(ArmDirection::Up)?;
    while robot.scheduler().scheduled_count() > 0 {
        tick(&mut robot, RobotMode::Opcontrol)?;
    }

    robot.shoot(0)?;
    let (target_up, target_down) = robot.shooter().borrow().targets();
    while robot.scheduler().scheduled_count() > 0 {
        // Pretend the flywheels follow their command.
        shooter_up.set_velocity(shooter_up.output() * target_up);
        shooter_down.set_velocity(-shooter_down.output() * target_down);
        tick(&mut robot, RobotMode::Opcontrol)?;
    }

    tick(&mut robot, RobotMode::Disabled)?;
    info!("Done");
    Ok(())
}
