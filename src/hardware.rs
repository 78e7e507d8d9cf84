//! The hardware surface the control core talks to.
//!
//! Nothing in this crate configures a motor controller. Hosts wrap whatever
//! driver they have in an [`Actuator`] and hand it to a subsystem.

use core::fmt::Debug;

use crate::Result;

/// Position and velocity read from an actuator's encoder on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSample {
    pub position: f64,
    pub velocity: f64,
}

/// A motor with an integrated encoder, driven by a normalized output.
pub trait Actuator: Debug {
    /// Commands a duty cycle in `[-1, 1]`.
    fn set_output(&mut self, output: f64) -> Result;
    /// The output the motor controller is actually applying.
    fn applied_output(&self) -> Result<f64>;
    fn velocity(&self) -> Result<f64>;
    fn position(&self) -> Result<f64>;
    /// Zeroes the encoder position.
    fn reset_position(&mut self) -> Result;

    fn sample(&self) -> Result<SensorSample> {
        Ok(SensorSample {
            position: self.position()?,
            velocity: self.velocity()?,
        })
    }
}

impl<A: Actuator + ?Sized> Actuator for alloc::boxed::Box<A> {
    fn set_output(&mut self, output: f64) -> Result {
        (**self).set_output(output)
    }

    fn applied_output(&self) -> Result<f64> {
        (**self).applied_output()
    }

    fn velocity(&self) -> Result<f64> {
        (**self).velocity()
    }

    fn position(&self) -> Result<f64> {
        (**self).position()
    }

    fn reset_position(&mut self) -> Result {
        (**self).reset_position()
    }
}

/// A monotonic time source.
pub trait Clock {
    /// Seconds since an arbitrary, fixed epoch.
    fn now(&self) -> f64;
}

/// Which way an actuator turns for a positive command in the mechanism's frame.
///
/// The two shooter flywheels spin in opposite physical directions to feed a
/// game piece the same way, so the lower one is [`Polarity::Reversed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Forward,
    Reversed,
}

impl Polarity {
    /// Maps a value between the physical frame and the mechanism frame.
    /// The mapping is its own inverse.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Polarity::Forward => value,
            Polarity::Reversed => -value,
        }
    }

    pub fn sign(self) -> f64 {
        self.apply(1.0)
    }
}

/// Measures the time between consecutive ticks of a routine.
///
/// The first reading after [`TickTimer::restart`] is `0.0`, which the
/// difference controller replaces with its configured tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickTimer {
    last: Option<f64>,
}

impl TickTimer {
    pub fn restart(&mut self) {
        self.last = None;
    }

    pub fn lap(&mut self, clock: &dyn Clock) -> f64 {
        let now = clock.now();
        let dt = self.last.map_or(0.0, |last| now - last);
        self.last = Some(now);
        dt
    }
}
