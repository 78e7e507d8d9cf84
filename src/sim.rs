//! Stand-ins for real hardware, for simulation and tests.
//!
//! There is no physics here: sensor readings only change when the caller
//! sets them.

use alloc::{rc::Rc, vec::Vec};
use core::cell::{Cell, RefCell};

use snafu::ensure;

use crate::{
    error::DisconnectedSnafu,
    hardware::{Actuator, Clock},
    Result,
};

#[derive(Debug, Default)]
struct SimMotorState {
    output: f64,
    velocity: f64,
    position: f64,
    connected: bool,
    history: Vec<f64>,
}

/// A simulated motor. Clones share state, so a test can keep a handle while a
/// subsystem owns the motor.
#[derive(Debug, Clone)]
pub struct SimMotor {
    name: &'static str,
    state: Rc<RefCell<SimMotorState>>,
}

impl SimMotor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Rc::new(RefCell::new(SimMotorState {
                connected: true,
                ..Default::default()
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The last output written with [`Actuator::set_output`].
    pub fn output(&self) -> f64 {
        self.state.borrow().output
    }

    /// Every output written so far, oldest first.
    pub fn history(&self) -> Vec<f64> {
        self.state.borrow().history.clone()
    }

    pub fn set_velocity(&self, velocity: f64) {
        self.state.borrow_mut().velocity = velocity;
    }

    pub fn set_position(&self, position: f64) {
        self.state.borrow_mut().position = position;
    }

    /// Unplugs (or replugs) the motor; every call fails while unplugged.
    pub fn set_connected(&self, connected: bool) {
        self.state.borrow_mut().connected = connected;
    }

    fn check(&self) -> Result {
        ensure!(
            self.state.borrow().connected,
            DisconnectedSnafu { name: self.name }
        );
        Ok(())
    }
}

impl Actuator for SimMotor {
    fn set_output(&mut self, output: f64) -> Result {
        self.check()?;
        let mut state = self.state.borrow_mut();
        state.output = output;
        state.history.push(output);
        Ok(())
    }

    fn applied_output(&self) -> Result<f64> {
        self.check()?;
        Ok(self.state.borrow().output)
    }

    fn velocity(&self) -> Result<f64> {
        self.check()?;
        Ok(self.state.borrow().velocity)
    }

    fn position(&self) -> Result<f64> {
        self.check()?;
        Ok(self.state.borrow().position)
    }

    fn reset_position(&mut self) -> Result {
        self.check()?;
        self.state.borrow_mut().position = 0.0;
        Ok(())
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn clones_see_owner_writes() {
        let handle = SimMotor::new("roller");
        let mut owned = handle.clone();
        owned.set_output(0.3).unwrap();
        assert_eq!(handle.output(), 0.3);
        assert_eq!(handle.history(), [0.3]);
    }

    #[test]
    fn unplugged_motor_fails() {
        let mut motor = SimMotor::new("arm");
        motor.set_connected(false);
        assert_eq!(
            motor.set_output(0.1),
            Err(Error::Disconnected { name: "arm" })
        );
        assert!(motor.sample().is_err());
    }
}
