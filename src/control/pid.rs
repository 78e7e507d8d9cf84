//! A small digital PID corrector computed from the recent error history.

/// Tick used when a caller passes `dt == 0` and none was configured.
pub const DEFAULT_TICK_SECONDS: f64 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Gains {
    pub p: f64,
    pub d: f64,
    pub i: f64,
}

impl Gains {
    pub const fn new(p: f64, d: f64, i: f64) -> Self {
        Self { p, d, i }
    }

    /// Negative gains are clamped to zero.
    pub fn sanitized(self) -> Self {
        Self {
            p: self.p.max(0.0),
            d: self.d.max(0.0),
            i: self.i.max(0.0),
        }
    }
}

/// How the correction is derived from the error history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formulation {
    /// `(p + i·dt)·e − p·e₁ + (e + 2·e₁ + e₂)·d/dt`.
    ///
    /// The result is an increment: callers accumulate it into their output.
    TwoTap,
    /// `p·e + i·∫e dt + d·(e − e₁)/dt`, an absolute output.
    Incremental,
}

#[derive(Debug, Clone)]
pub struct DifferenceController {
    gains: Gains,
    formulation: Formulation,
    tick: f64,
    last_error: f64,
    prev_error: f64,
    integral: f64,
}

impl DifferenceController {
    pub fn new(gains: Gains, formulation: Formulation, tick: f64) -> Self {
        let mut controller = Self {
            gains,
            formulation,
            tick: DEFAULT_TICK_SECONDS,
            last_error: 0.0,
            prev_error: 0.0,
            integral: 0.0,
        };
        controller.set_tick(tick);
        controller
    }

    /// Clears the error history and the integral. Gains are kept.
    pub fn reset(&mut self) {
        self.last_error = 0.0;
        self.prev_error = 0.0;
        self.integral = 0.0;
    }

    /// Replaces the gains without touching the history.
    pub fn set_gains(&mut self, gains: Gains) {
        self.gains = gains;
    }

    pub fn gains(&self) -> Gains {
        self.gains
    }

    /// Sets the tick substituted for a zero `dt`. Zero selects [`DEFAULT_TICK_SECONDS`].
    pub fn set_tick(&mut self, tick: f64) {
        self.tick = if tick > 0.0 { tick } else { DEFAULT_TICK_SECONDS };
    }

    pub fn tick(&self) -> f64 {
        self.tick
    }

    pub fn formulation(&self) -> Formulation {
        self.formulation
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    pub fn prev_error(&self) -> f64 {
        self.prev_error
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn compute_correction(&mut self, measured: f64, target: f64, dt: f64) -> f64 {
        let dt = if dt > 0.0 { dt } else { self.tick };
        let err = target - measured;
        let Gains { p, d, i } = self.gains;
        let (e1, e2) = (self.last_error, self.prev_error);

        let correction = match self.formulation {
            Formulation::TwoTap => (p + i * dt) * err - p * e1 + (err + 2.0 * e1 + e2) * d / dt,
            Formulation::Incremental => {
                self.integral += err * dt;
                p * err + i * self.integral + d * (err - e1) / dt
            }
        };

        self.prev_error = e1;
        self.last_error = err;
        correction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn zero_error_after_reset_is_zero_correction() {
        for formulation in [Formulation::TwoTap, Formulation::Incremental] {
            let mut pid = DifferenceController::new(Gains::new(0.4, 0.01, 0.2), formulation, 0.02);
            pid.compute_correction(10.0, 50.0, 0.02);
            pid.compute_correction(20.0, 50.0, 0.02);
            pid.reset();
            assert_eq!(pid.compute_correction(37.5, 37.5, 0.02), 0.0);
        }
    }

    #[test]
    fn two_tap_matches_formula() {
        let mut pid = DifferenceController::new(Gains::new(2.0, 0.5, 3.0), Formulation::TwoTap, 0.02);
        // e = 4, e1 = e2 = 0
        let first = pid.compute_correction(6.0, 10.0, 0.1);
        assert!((first - ((2.0 + 0.3) * 4.0 + 4.0 * 0.5 / 0.1)).abs() < EPS);
        // e = 1, e1 = 4, e2 = 0
        let second = pid.compute_correction(9.0, 10.0, 0.1);
        let expected = (2.0 + 0.3) * 1.0 - 2.0 * 4.0 + (1.0 + 8.0) * 0.5 / 0.1;
        assert!((second - expected).abs() < EPS);
        assert_eq!(pid.last_error(), 1.0);
        assert_eq!(pid.prev_error(), 4.0);
    }

    #[test]
    fn incremental_accumulates_integral() {
        let mut pid = DifferenceController::new(Gains::new(1.0, 0.1, 2.0), Formulation::Incremental, 0.02);
        let first = pid.compute_correction(0.0, 3.0, 0.5);
        assert!((first - (3.0 + 2.0 * 1.5 + 0.1 * 3.0 / 0.5)).abs() < EPS);
        let second = pid.compute_correction(1.0, 3.0, 0.5);
        assert!((pid.integral() - 2.5).abs() < EPS);
        assert!((second - (2.0 + 2.0 * 2.5 + 0.1 * (2.0 - 3.0) / 0.5)).abs() < EPS);
    }

    #[test]
    fn zero_dt_uses_configured_tick() {
        let mut with_zero = DifferenceController::new(Gains::new(0.0, 1.0, 0.0), Formulation::TwoTap, 0.05);
        let mut explicit = with_zero.clone();
        assert_eq!(
            with_zero.compute_correction(0.0, 1.0, 0.0),
            explicit.compute_correction(0.0, 1.0, 0.05)
        );

        let mut defaulted = DifferenceController::new(Gains::new(0.0, 1.0, 0.0), Formulation::Incremental, 0.0);
        assert_eq!(defaulted.tick(), DEFAULT_TICK_SECONDS);
        let correction = defaulted.compute_correction(0.0, 1.0, 0.0);
        assert!(correction.is_finite());
        assert!((correction - 1.0 / DEFAULT_TICK_SECONDS).abs() < EPS);
    }

    #[test]
    fn history_shifts_one_sample_per_call() {
        let mut pid = DifferenceController::new(Gains::new(1.0, 0.0, 0.0), Formulation::TwoTap, 0.02);
        pid.compute_correction(0.0, 1.0, 0.02);
        pid.compute_correction(0.0, 2.0, 0.02);
        pid.compute_correction(0.0, 3.0, 0.02);
        assert_eq!(pid.last_error(), 3.0);
        assert_eq!(pid.prev_error(), 2.0);
    }

    #[test]
    fn set_gains_keeps_history() {
        let mut pid = DifferenceController::new(Gains::new(1.0, 0.0, 1.0), Formulation::Incremental, 0.02);
        pid.compute_correction(0.0, 2.0, 0.1);
        pid.compute_correction(0.0, 2.0, 0.1);
        let (last, integral) = (pid.last_error(), pid.integral());

        pid.set_gains(Gains::new(0.5, 0.2, 0.1));
        assert_eq!(pid.last_error(), last);
        assert_eq!(pid.integral(), integral);
        assert_eq!(pid.gains(), Gains::new(0.5, 0.2, 0.1));

        let correction = pid.compute_correction(0.0, 2.0, 0.1);
        assert!((correction - (0.5 * 2.0 + 0.1 * (integral + 0.2))).abs() < EPS);
    }

    #[test]
    fn negative_gains_are_clamped() {
        assert_eq!(Gains::new(-1.0, 0.3, -0.1).sanitized(), Gains::new(0.0, 0.3, 0.0));
    }
}
