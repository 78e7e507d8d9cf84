//! The manual joystick-to-drivetrain path.

use alloc::rc::Rc;
use core::cell::RefCell;

use log::debug;

use crate::{
    command::Command,
    config::DriveConfig,
    control::ResponseCurve,
    hardware::Actuator,
    subsystem::Subsystem,
    tunable::SharedStore,
    Result, SubsystemRef,
};

/// Shapes raw stick deflections before they reach the drive motors.
///
/// Translation and rotation share the dead zone, splice point and linear
/// coefficient but have their own output limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapedDrive {
    translation: ResponseCurve,
    rotation: ResponseCurve,
}

impl ShapedDrive {
    pub fn from_config(config: &DriveConfig) -> Self {
        Self {
            translation: ResponseCurve::new(config.curve),
            rotation: ResponseCurve::new(config.rotation_curve()),
        }
    }

    pub fn configure(&mut self, config: &DriveConfig) {
        self.translation.configure(config.curve);
        self.rotation.configure(config.rotation_curve());
    }

    pub fn translation(&self) -> &ResponseCurve {
        &self.translation
    }

    pub fn rotation(&self) -> &ResponseCurve {
        &self.rotation
    }

    /// Shaped `(forward, turn)`.
    pub fn shape(&self, forward: f64, turn: f64) -> (f64, f64) {
        (
            self.translation.transfer(forward),
            self.rotation.transfer(turn),
        )
    }

    /// Shaped arcade mix, `(left, right)`, each inside `[-1, 1]`.
    pub fn arcade(&self, forward: f64, turn: f64) -> (f64, f64) {
        let (forward, turn) = self.shape(forward, turn);
        (
            (forward + turn).clamp(-1.0, 1.0),
            (forward - turn).clamp(-1.0, 1.0),
        )
    }
}

impl Default for ShapedDrive {
    fn default() -> Self {
        Self::from_config(&DriveConfig::default())
    }
}

/// Two-sided tank drivetrain driven through a [`ShapedDrive`].
#[derive(Debug)]
pub struct Drivetrain<A> {
    left: A,
    right: A,
    shaping: ShapedDrive,
}

impl<A: Actuator> Drivetrain<A> {
    pub fn new(left: A, right: A, config: &DriveConfig) -> Self {
        Self {
            left,
            right,
            shaping: ShapedDrive::from_config(config),
        }
    }

    pub fn configure(&mut self, config: &DriveConfig) {
        self.shaping.configure(config);
    }

    pub fn shaping(&self) -> &ShapedDrive {
        &self.shaping
    }

    pub fn drive(&mut self, forward: f64, turn: f64) -> Result {
        let (left, right) = self.shaping.arcade(forward, turn);
        self.left.set_output(left)?;
        self.right.set_output(right)
    }

    pub fn stop(&mut self) -> Result {
        let left = self.left.set_output(0.0);
        let right = self.right.set_output(0.0);
        left.and(right)
    }
}

impl<A: Actuator> Subsystem for Drivetrain<A> {}

/// The two stick axes used for driving, each in `[-1, 1]`.
pub trait Joystick {
    fn forward(&self) -> f64;
    fn turn(&self) -> f64;
}

/// Default drivetrain command: follows the joystick every tick.
pub struct DriveWithJoystick<A, J> {
    drivetrain: Rc<RefCell<Drivetrain<A>>>,
    joystick: J,
    store: SharedStore,
    requirements: [SubsystemRef; 1],
}

impl<A: Actuator + 'static, J: Joystick> DriveWithJoystick<A, J> {
    pub fn new(drivetrain: Rc<RefCell<Drivetrain<A>>>, joystick: J, store: SharedStore) -> Self {
        Self {
            requirements: [SubsystemRef(drivetrain.clone())],
            drivetrain,
            joystick,
            store,
        }
    }
}

impl<A: Actuator + 'static, J: Joystick> Command for DriveWithJoystick<A, J> {
    fn get_requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result {
        let config = DriveConfig::get_params(&*self.store.borrow());
        self.drivetrain.borrow_mut().configure(&config);
        Ok(())
    }

    fn step(&mut self) -> Result {
        let (forward, turn) = (self.joystick.forward(), self.joystick.turn());
        debug!("Drive: forward {forward:.2}, turn {turn:.2}");
        self.drivetrain.borrow_mut().drive(forward, turn)
    }

    fn end(&mut self, _interrupted: bool) -> Result {
        self.drivetrain.borrow_mut().stop()
    }
}
