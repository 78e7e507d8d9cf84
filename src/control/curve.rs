//! Input shaping for manual drive axes.
//!
//! A dead zone, then a linear segment, then a quadratic that meets the linear
//! segment with matching value and slope at the splice point and reaches
//! `1.0` at full deflection before the output limit is applied.

use libm::fabs;

const MAX_SPLICE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseCurveParams {
    pub dead_zone_threshold: f64,
    pub splice_x: f64,
    pub linear_coefficient: f64,
    pub output_limit: f64,
}

impl ResponseCurveParams {
    /// Brings every field into the range where the curve is odd, monotonic
    /// and bounded by its limit.
    pub fn sanitized(self) -> Self {
        let splice_x = self.splice_x.clamp(0.0, MAX_SPLICE);
        Self {
            dead_zone_threshold: self.dead_zone_threshold.clamp(0.0, splice_x),
            splice_x,
            linear_coefficient: self.linear_coefficient.clamp(0.0, 1.0),
            output_limit: self.output_limit.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseCurve {
    params: ResponseCurveParams,
    a: f64,
    b: f64,
    c: f64,
}

impl ResponseCurve {
    pub fn new(params: ResponseCurveParams) -> Self {
        let mut curve = Self {
            params,
            a: 0.0,
            b: 0.0,
            c: 0.0,
        };
        curve.configure(params);
        curve
    }

    /// Replaces the parameters and recomputes the quadratic coefficients.
    pub fn configure(&mut self, params: ResponseCurveParams) {
        let params = params.sanitized();
        let x0 = params.splice_x;
        let k = params.linear_coefficient;
        let denom = 1.0 - (2.0 - x0) * x0;

        self.params = params;
        self.a = (1.0 - k) / denom;
        self.b = (k + (k * x0 - 2.0) * x0) / denom;
        self.c = self.a * x0 * x0;
    }

    pub fn params(&self) -> ResponseCurveParams {
        self.params
    }

    /// The quadratic coefficients `(a, b, c)`.
    pub fn coefficients(&self) -> (f64, f64, f64) {
        (self.a, self.b, self.c)
    }

    pub fn transfer(&self, x: f64) -> f64 {
        let ResponseCurveParams {
            dead_zone_threshold,
            splice_x,
            linear_coefficient,
            output_limit,
        } = self.params;

        let magnitude = fabs(x).min(1.0);
        if magnitude < dead_zone_threshold {
            return 0.0;
        }

        let shaped = if magnitude <= splice_x {
            linear_coefficient * magnitude
        } else {
            self.a * magnitude * magnitude + self.b * magnitude + self.c
        };
        let shaped = shaped.clamp(0.0, output_limit);

        if x < 0.0 {
            -shaped
        } else {
            shaped
        }
    }
}
