//! Closed-loop servos and the math they are built from.

pub mod curve;
pub mod pid;
pub mod position;
pub mod velocity;

pub use curve::{ResponseCurve, ResponseCurveParams};
pub use pid::{DifferenceController, Formulation, Gains};
pub use position::{ArmDirection, ArmStrategy, PositionServo};
pub use velocity::VelocityServo;

/// Output range and settle bands of one servo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoConfig {
    pub target: f64,
    /// Smallest output magnitude that moves the load; also the ramp output.
    pub min_output: f64,
    pub max_output: f64,
    /// Relative band around the target, `|1 - measured / target|`.
    pub position_tolerance: f64,
    /// Absolute band around zero velocity.
    pub velocity_tolerance: f64,
}

impl ServoConfig {
    pub fn with_target(self, target: f64) -> Self {
        Self { target, ..self }
    }

    pub fn sanitized(self) -> Self {
        let min_output = self.min_output.clamp(0.0, 1.0);
        Self {
            target: self.target,
            min_output,
            max_output: self.max_output.clamp(min_output, 1.0),
            position_tolerance: self.position_tolerance.max(0.0),
            velocity_tolerance: self.velocity_tolerance.max(0.0),
        }
    }

    /// Clamps `output` to `[min_output, max_output]` in the direction of `sign`.
    pub(crate) fn clamp_directed(&self, output: f64, sign: f64) -> f64 {
        sign * (sign * output).clamp(self.min_output, self.max_output)
    }
}

/// Where a servo is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServoState {
    #[default]
    Idle,
    /// Driving at the minimum output before closing the loop.
    RampUp,
    Tracking,
    /// Settled inside the tolerance bands; output held at zero.
    Settled,
}

pub(crate) fn sign_of(value: f64) -> f64 {
    if value < 0.0 {
        -1.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_orders_output_range() {
        let config = ServoConfig {
            target: 10.0,
            min_output: 0.6,
            max_output: 0.2,
            position_tolerance: -0.1,
            velocity_tolerance: 5.0,
        }
        .sanitized();
        assert_eq!(config.min_output, 0.6);
        assert_eq!(config.max_output, 0.6);
        assert_eq!(config.position_tolerance, 0.0);
    }

    #[test]
    fn clamp_directed_mirrors_for_negative_sign() {
        let config = ServoConfig {
            target: 0.0,
            min_output: 0.1,
            max_output: 0.8,
            position_tolerance: 0.0,
            velocity_tolerance: 0.0,
        };
        assert_eq!(config.clamp_directed(0.95, 1.0), 0.8);
        assert_eq!(config.clamp_directed(0.0, -1.0), -0.1);
        assert_eq!(config.clamp_directed(-2.0, -1.0), -0.8);
        assert_eq!(config.clamp_directed(0.5, -1.0), -0.1);
    }
}
