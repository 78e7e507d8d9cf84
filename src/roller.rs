use log::debug;

use crate::{hardware::Actuator, subsystem::Subsystem, Result};

/// The intake roller: an open-loop motor that takes in and feeds game pieces.
#[derive(Debug)]
pub struct Roller<A> {
    actuator: A,
    speed: f64,
}

impl<A: Actuator> Roller<A> {
    pub fn new(actuator: A) -> Self {
        Self {
            actuator,
            speed: 0.0,
        }
    }

    pub fn init(&mut self) -> Result {
        self.speed = 0.0;
        self.actuator.reset_position()
    }

    /// Runs the roller at `speed`, clamped to `[-1, 1]`.
    pub fn run(&mut self, speed: f64) -> Result {
        self.speed = speed.clamp(-1.0, 1.0);
        self.actuator.set_output(self.speed)?;
        debug!("Roller: {:.3}", self.speed);
        Ok(())
    }

    pub fn stop(&mut self) -> Result {
        self.run(0.0)
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }
}

impl<A: Actuator> Subsystem for Roller<A> {}
