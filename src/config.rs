//! Every tunable constant of the robot, in one place.
//!
//! Defaults live in the `Default` impls. `get_params` reads each value from a
//! [`TunableStore`], falling back to the default for missing keys and
//! repairing anything out of range so a misconfigured run stays safe.
//! `put_params` publishes the current values under the same keys.

use alloc::format;
use core::fmt::Debug;

use log::warn;

use crate::{
    control::{
        position::PulseProfile, ArmStrategy, Gains, ResponseCurveParams, ServoConfig,
    },
    sequence::PhaseSchedule,
    tunable::TunableStore,
};

/// Layout version of [`RobotConfig`], published as `config/version`.
pub const CONFIG_VERSION: u32 = 1;

/// Nominal scheduler tick.
pub const DEFAULT_PERIOD_MS: u32 = 20;

pub const PRESET_COUNT: usize = 4;

fn repaired<T: PartialEq + Debug>(key: &str, loaded: T, fixed: T) -> T {
    if loaded != fixed {
        warn!("Tunable `{key}` = {loaded:?} is out of range, using {fixed:?}");
    }
    fixed
}

/// Reads `key`, falling back to `default` for NaN or infinite values.
fn get_number(store: &dyn TunableStore, key: &str, default: f64) -> f64 {
    let value = store.get_number(key, default);
    if value.is_finite() {
        value
    } else {
        warn!("Tunable `{key}` = {value} is not a number, using {default}");
        default
    }
}

fn get_ms(store: &dyn TunableStore, key: &str, default: u32) -> u32 {
    let value = get_number(store, key, f64::from(default));
    // `as` saturates and maps NaN to zero.
    repaired(key, value, value.max(0.0)) as u32
}

fn get_speed(store: &dyn TunableStore, key: &str, default: f64) -> f64 {
    let value = get_number(store, key, default);
    repaired(key, value, value.clamp(-1.0, 1.0))
}

fn get_gains(store: &dyn TunableStore, prefix: &str, default: Gains) -> Gains {
    let loaded = Gains {
        p: get_number(store, &format!("{prefix}/kp"), default.p),
        d: get_number(store, &format!("{prefix}/kd"), default.d),
        i: get_number(store, &format!("{prefix}/ki"), default.i),
    };
    repaired(prefix, loaded, loaded.sanitized())
}

fn put_gains(store: &mut dyn TunableStore, prefix: &str, gains: Gains) {
    store.put_number(&format!("{prefix}/kp"), gains.p);
    store.put_number(&format!("{prefix}/kd"), gains.d);
    store.put_number(&format!("{prefix}/ki"), gains.i);
}

fn get_limits(store: &dyn TunableStore, prefix: &str, default: ServoConfig) -> ServoConfig {
    let loaded = ServoConfig {
        target: default.target,
        min_output: get_number(store, &format!("{prefix}/min_output"), default.min_output),
        max_output: get_number(store, &format!("{prefix}/max_output"), default.max_output),
        position_tolerance: get_number(
            store,
            &format!("{prefix}/position_tolerance"),
            default.position_tolerance,
        ),
        velocity_tolerance: get_number(
            store,
            &format!("{prefix}/velocity_tolerance"),
            default.velocity_tolerance,
        ),
    };
    repaired(prefix, loaded, loaded.sanitized())
}

fn put_limits(store: &mut dyn TunableStore, prefix: &str, limits: &ServoConfig) {
    store.put_number(&format!("{prefix}/min_output"), limits.min_output);
    store.put_number(&format!("{prefix}/max_output"), limits.max_output);
    store.put_number(&format!("{prefix}/position_tolerance"), limits.position_tolerance);
    store.put_number(&format!("{prefix}/velocity_tolerance"), limits.velocity_tolerance);
}

/// Upper and lower flywheel velocity targets, in rpm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPair {
    pub up: f64,
    pub down: f64,
}

impl TargetPair {
    /// Smallest target magnitude accepted from the store.
    pub const MIN_RPM: f64 = 50.0;

    pub const fn new(up: f64, down: f64) -> Self {
        Self { up, down }
    }

    /// Forces the upper target forward and the lower target reversed, each at
    /// least [`Self::MIN_RPM`] in magnitude.
    pub fn sanitized(self) -> Self {
        Self {
            up: self.up.max(Self::MIN_RPM),
            down: self.down.min(-Self::MIN_RPM),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShooterConfig {
    pub gains: Gains,
    /// Velocity feedforward, applied as `kv · target` before normalization.
    pub kv: f64,
    pub limits: ServoConfig,
    pub presets: [TargetPair; PRESET_COUNT],
}

impl Default for ShooterConfig {
    fn default() -> Self {
        Self {
            gains: Gains::new(0.02, 0.0, 0.5),
            kv: 0.0,
            limits: ServoConfig {
                target: 0.0,
                min_output: 0.05,
                max_output: 0.9,
                position_tolerance: 0.05,
                velocity_tolerance: 50.0,
            },
            presets: [
                TargetPair::new(3000.0, -3000.0),
                TargetPair::new(2400.0, -2400.0),
                TargetPair::new(1800.0, -1800.0),
                TargetPair::new(1200.0, -2400.0),
            ],
        }
    }
}

impl ShooterConfig {
    pub fn get_params(store: &dyn TunableStore) -> Self {
        let default = Self::default();
        let mut presets = default.presets;
        for (index, preset) in presets.iter_mut().enumerate() {
            let loaded = TargetPair {
                up: get_number(store, &format!("shooter/preset{index}/up"), preset.up),
                down: get_number(store, &format!("shooter/preset{index}/down"), preset.down),
            };
            *preset = repaired("shooter/preset", loaded, loaded.sanitized());
        }

        Self {
            gains: get_gains(store, "shooter", default.gains),
            kv: get_number(store, "shooter/kv", default.kv),
            limits: get_limits(store, "shooter", default.limits),
            presets,
        }
    }

    pub fn put_params(&self, store: &mut dyn TunableStore) {
        put_gains(store, "shooter", self.gains);
        store.put_number("shooter/kv", self.kv);
        put_limits(store, "shooter", &self.limits);
        for (index, preset) in self.presets.iter().enumerate() {
            store.put_number(&format!("shooter/preset{index}/up"), preset.up);
            store.put_number(&format!("shooter/preset{index}/down"), preset.down);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmConfig {
    pub strategy: ArmStrategy,
    pub gains: Gains,
    pub limits: ServoConfig,
    pub angle_up: f64,
    pub angle_down: f64,
    pub pulse_up: PulseProfile,
    pub pulse_down: PulseProfile,
    /// Holding outputs against gravity. Not applied: moves always end at zero.
    pub hold_up: f64,
    pub hold_down: f64,
    /// Upper bound on a closed-loop move.
    pub closed_loop_timeout_ms: u32,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            strategy: ArmStrategy::TimedPulse,
            gains: Gains::new(0.05, 0.0, 0.01),
            limits: ServoConfig {
                target: 0.0,
                min_output: 0.05,
                max_output: 0.4,
                position_tolerance: 0.05,
                velocity_tolerance: 0.5,
            },
            angle_up: -12.0,
            angle_down: 12.0,
            pulse_up: PulseProfile {
                speed: -0.4,
                brake_speed: 0.15,
                move_end_ms: 360,
                pause_end_ms: 620,
                brake_end_ms: 760,
            },
            pulse_down: PulseProfile {
                speed: 0.4,
                brake_speed: -0.1,
                move_end_ms: 300,
                pause_end_ms: 500,
                brake_end_ms: 640,
            },
            hold_up: -0.2,
            hold_down: 0.2,
            closed_loop_timeout_ms: 2000,
        }
    }
}

fn get_pulse(store: &dyn TunableStore, prefix: &str, default: PulseProfile) -> PulseProfile {
    let loaded = PulseProfile {
        speed: get_speed(store, &format!("{prefix}/speed"), default.speed),
        brake_speed: get_speed(store, &format!("{prefix}/brake_speed"), default.brake_speed),
        move_end_ms: get_ms(store, &format!("{prefix}/move_end_ms"), default.move_end_ms),
        pause_end_ms: get_ms(store, &format!("{prefix}/pause_end_ms"), default.pause_end_ms),
        brake_end_ms: get_ms(store, &format!("{prefix}/brake_end_ms"), default.brake_end_ms),
    };
    repaired(prefix, loaded, loaded.sanitized())
}

fn put_pulse(store: &mut dyn TunableStore, prefix: &str, pulse: &PulseProfile) {
    store.put_number(&format!("{prefix}/speed"), pulse.speed);
    store.put_number(&format!("{prefix}/brake_speed"), pulse.brake_speed);
    store.put_number(&format!("{prefix}/move_end_ms"), f64::from(pulse.move_end_ms));
    store.put_number(&format!("{prefix}/pause_end_ms"), f64::from(pulse.pause_end_ms));
    store.put_number(&format!("{prefix}/brake_end_ms"), f64::from(pulse.brake_end_ms));
}

impl ArmConfig {
    pub fn get_params(store: &dyn TunableStore) -> Self {
        let default = Self::default();
        let closed_loop = match default.strategy {
            ArmStrategy::TimedPulse => 0.0,
            ArmStrategy::ClosedLoop => 1.0,
        };
        let strategy = if get_number(store, "arm/closed_loop", closed_loop) >= 0.5 {
            ArmStrategy::ClosedLoop
        } else {
            ArmStrategy::TimedPulse
        };

        Self {
            strategy,
            gains: get_gains(store, "arm", default.gains),
            limits: get_limits(store, "arm", default.limits),
            angle_up: get_number(store, "arm/angle_up", default.angle_up),
            angle_down: get_number(store, "arm/angle_down", default.angle_down),
            pulse_up: get_pulse(store, "arm/up", default.pulse_up),
            pulse_down: get_pulse(store, "arm/down", default.pulse_down),
            hold_up: get_speed(store, "arm/hold_up", default.hold_up),
            hold_down: get_speed(store, "arm/hold_down", default.hold_down),
            closed_loop_timeout_ms: get_ms(
                store,
                "arm/closed_loop_timeout_ms",
                default.closed_loop_timeout_ms,
            ),
        }
    }

    pub fn put_params(&self, store: &mut dyn TunableStore) {
        let closed_loop = match self.strategy {
            ArmStrategy::TimedPulse => 0.0,
            ArmStrategy::ClosedLoop => 1.0,
        };
        store.put_number("arm/closed_loop", closed_loop);
        put_gains(store, "arm", self.gains);
        put_limits(store, "arm", &self.limits);
        store.put_number("arm/angle_up", self.angle_up);
        store.put_number("arm/angle_down", self.angle_down);
        put_pulse(store, "arm/up", &self.pulse_up);
        put_pulse(store, "arm/down", &self.pulse_down);
        store.put_number("arm/hold_up", self.hold_up);
        store.put_number("arm/hold_down", self.hold_down);
        store.put_number(
            "arm/closed_loop_timeout_ms",
            f64::from(self.closed_loop_timeout_ms),
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollerConfig {
    pub intake_speed: f64,
    pub eject_speed: f64,
}

impl Default for RollerConfig {
    fn default() -> Self {
        Self {
            intake_speed: 0.8,
            eject_speed: -0.8,
        }
    }
}

impl RollerConfig {
    pub fn get_params(store: &dyn TunableStore) -> Self {
        let default = Self::default();
        Self {
            intake_speed: get_speed(store, "roller/intake_speed", default.intake_speed),
            eject_speed: get_speed(store, "roller/eject_speed", default.eject_speed),
        }
    }

    pub fn put_params(&self, store: &mut dyn TunableStore) {
        store.put_number("roller/intake_speed", self.intake_speed);
        store.put_number("roller/eject_speed", self.eject_speed);
    }
}

/// Timing and roller speeds of the shoot routine.
///
/// Boundaries are stored as loaded; [`SequenceConfig::schedule`] repairs them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceConfig {
    pub backoff_end_ms: u32,
    pub wait_end_ms: u32,
    pub spinup_end_ms: u32,
    pub feed_end_ms: u32,
    pub backoff_speed: f64,
    pub feed_speed: f64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            backoff_end_ms: 400,
            wait_end_ms: 800,
            spinup_end_ms: 1800,
            feed_end_ms: 2800,
            backoff_speed: 0.2,
            feed_speed: -0.4,
        }
    }
}

impl SequenceConfig {
    pub fn get_params(store: &dyn TunableStore) -> Self {
        let default = Self::default();
        Self {
            backoff_end_ms: get_ms(store, "shoot/backoff_end_ms", default.backoff_end_ms),
            wait_end_ms: get_ms(store, "shoot/wait_end_ms", default.wait_end_ms),
            spinup_end_ms: get_ms(store, "shoot/spinup_end_ms", default.spinup_end_ms),
            feed_end_ms: get_ms(store, "shoot/feed_end_ms", default.feed_end_ms),
            backoff_speed: get_speed(store, "shoot/backoff_speed", default.backoff_speed),
            feed_speed: get_speed(store, "shoot/feed_speed", default.feed_speed),
        }
    }

    pub fn put_params(&self, store: &mut dyn TunableStore) {
        store.put_number("shoot/backoff_end_ms", f64::from(self.backoff_end_ms));
        store.put_number("shoot/wait_end_ms", f64::from(self.wait_end_ms));
        store.put_number("shoot/spinup_end_ms", f64::from(self.spinup_end_ms));
        store.put_number("shoot/feed_end_ms", f64::from(self.feed_end_ms));
        store.put_number("shoot/backoff_speed", self.backoff_speed);
        store.put_number("shoot/feed_speed", self.feed_speed);
    }

    pub fn schedule(&self, period_ms: u32) -> PhaseSchedule {
        let loaded = [
            self.backoff_end_ms,
            self.wait_end_ms,
            self.spinup_end_ms,
            self.feed_end_ms,
        ];
        let schedule = PhaseSchedule::new(loaded, period_ms);
        repaired("shoot", loaded, schedule.boundaries());
        schedule
    }
}

/// Shaping of the manual drive axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveConfig {
    /// Translation curve; rotation shares everything but the limit.
    pub curve: ResponseCurveParams,
    pub rotation_limit: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            curve: ResponseCurveParams {
                dead_zone_threshold: 0.1,
                splice_x: 0.6,
                linear_coefficient: 0.4,
                output_limit: 0.8,
            },
            rotation_limit: 0.6,
        }
    }
}

impl DriveConfig {
    pub fn get_params(store: &dyn TunableStore) -> Self {
        let default = Self::default();
        let curve = ResponseCurveParams {
            dead_zone_threshold: get_number(
                store,
                "drive/dead_zone",
                default.curve.dead_zone_threshold,
            ),
            splice_x: get_number(store, "drive/splice_x", default.curve.splice_x),
            linear_coefficient: get_number(
                store,
                "drive/linear_coefficient",
                default.curve.linear_coefficient,
            ),
            output_limit: get_number(store, "drive/speed_limit", default.curve.output_limit),
        };
        let rotation_limit = get_number(store, "drive/turn_limit", default.rotation_limit);

        Self {
            curve: repaired("drive", curve, curve.sanitized()),
            rotation_limit: repaired(
                "drive/turn_limit",
                rotation_limit,
                rotation_limit.clamp(0.0, 1.0),
            ),
        }
    }

    pub fn put_params(&self, store: &mut dyn TunableStore) {
        store.put_number("drive/dead_zone", self.curve.dead_zone_threshold);
        store.put_number("drive/splice_x", self.curve.splice_x);
        store.put_number("drive/linear_coefficient", self.curve.linear_coefficient);
        store.put_number("drive/speed_limit", self.curve.output_limit);
        store.put_number("drive/turn_limit", self.rotation_limit);
    }

    pub fn rotation_curve(&self) -> ResponseCurveParams {
        ResponseCurveParams {
            output_limit: self.rotation_limit,
            ..self.curve
        }
    }
}

/// The whole robot's configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotConfig {
    pub version: u32,
    pub period_ms: u32,
    pub shooter: ShooterConfig,
    pub arm: ArmConfig,
    pub roller: RollerConfig,
    pub sequence: SequenceConfig,
    pub drive: DriveConfig,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            period_ms: DEFAULT_PERIOD_MS,
            shooter: ShooterConfig::default(),
            arm: ArmConfig::default(),
            roller: RollerConfig::default(),
            sequence: SequenceConfig::default(),
            drive: DriveConfig::default(),
        }
    }
}

impl RobotConfig {
    /// Loads everything but the tick period, which is fixed at build time.
    pub fn get_params(store: &dyn TunableStore) -> Self {
        Self {
            version: CONFIG_VERSION,
            period_ms: DEFAULT_PERIOD_MS,
            shooter: ShooterConfig::get_params(store),
            arm: ArmConfig::get_params(store),
            roller: RollerConfig::get_params(store),
            sequence: SequenceConfig::get_params(store),
            drive: DriveConfig::get_params(store),
        }
    }

    pub fn put_params(&self, store: &mut dyn TunableStore) {
        store.put_number("config/version", f64::from(self.version));
        self.shooter.put_params(store);
        self.arm.put_params(store);
        self.roller.put_params(store);
        self.sequence.put_params(store);
        self.drive.put_params(store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunable::MemoryStore;

    #[test]
    fn empty_store_gives_defaults() {
        let store = MemoryStore::new();
        assert_eq!(RobotConfig::get_params(&store), RobotConfig::default());
    }

    #[test]
    fn put_then_get_restores_values() {
        let mut config = RobotConfig::default();
        config.shooter.gains = Gains::new(0.03, 0.001, 0.2);
        config.arm.strategy = ArmStrategy::ClosedLoop;
        config.sequence.feed_end_ms = 3200;
        config.drive.rotation_limit = 0.5;

        let mut store = MemoryStore::new();
        config.put_params(&mut store);
        assert_eq!(store.get_number("config/version", 0.0), f64::from(CONFIG_VERSION));
        assert_eq!(RobotConfig::get_params(&store), config);
    }

    #[test]
    fn out_of_range_values_are_repaired() {
        let mut store = MemoryStore::new();
        store.put_number("shooter/kp", -1.0);
        store.put_number("shooter/min_output", 0.95);
        store.put_number("shooter/max_output", 0.5);
        store.put_number("shooter/preset1/up", 10.0);
        store.put_number("shooter/preset1/down", 300.0);
        store.put_number("arm/up/speed", -3.0);
        store.put_number("arm/down/brake_end_ms", -40.0);
        store.put_number("drive/splice_x", 2.0);
        store.put_number("drive/dead_zone", 0.95);

        let config = RobotConfig::get_params(&store);
        assert_eq!(config.shooter.gains.p, 0.0);
        assert_eq!(config.shooter.limits.min_output, 0.95);
        assert_eq!(config.shooter.limits.max_output, 0.95);
        assert_eq!(config.shooter.presets[1], TargetPair::new(50.0, -50.0));
        assert_eq!(config.arm.pulse_up.speed, -1.0);
        assert_eq!(config.arm.pulse_down.brake_end_ms, config.arm.pulse_down.pause_end_ms);
        assert_eq!(config.drive.curve.splice_x, 0.9);
        assert_eq!(config.drive.curve.dead_zone_threshold, 0.9);
    }

    #[test]
    fn non_finite_values_fall_back_to_defaults() {
        let keys = [
            "shooter/kp",
            "shooter/kv",
            "shooter/min_output",
            "shooter/max_output",
            "shooter/position_tolerance",
            "shooter/preset2/up",
            "shooter/preset2/down",
            "arm/closed_loop",
            "arm/angle_up",
            "arm/up/speed",
            "arm/down/brake_end_ms",
            "arm/hold_up",
            "arm/closed_loop_timeout_ms",
            "roller/intake_speed",
            "shoot/backoff_end_ms",
            "shoot/feed_speed",
            "drive/dead_zone",
            "drive/splice_x",
            "drive/linear_coefficient",
            "drive/speed_limit",
            "drive/turn_limit",
        ];
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut store = MemoryStore::new();
            for key in keys {
                store.put_number(key, bad);
            }
            assert_eq!(RobotConfig::get_params(&store), RobotConfig::default());
        }
    }

    #[test]
    fn rotation_curve_differs_only_in_limit() {
        let drive = DriveConfig::default();
        let rotation = drive.rotation_curve();
        assert_eq!(rotation.output_limit, 0.6);
        assert_eq!(rotation.splice_x, drive.curve.splice_x);
    }
}
