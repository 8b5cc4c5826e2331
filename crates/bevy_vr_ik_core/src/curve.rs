use bevy_reflect::{Reflect, std_traits::ReflectDefault};
use serde::{Deserialize, Serialize};

#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
pub struct CurveKey {
    pub time: f32,
    pub value: f32,
    #[serde(default)]
    pub in_tangent: f32,
    #[serde(default)]
    pub out_tangent: f32,
}

impl CurveKey {
    pub fn new(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            in_tangent: 0.0,
            out_tangent: 0.0,
        }
    }

    pub fn with_tangents(mut self, in_tangent: f32, out_tangent: f32) -> Self {
        self.in_tangent = in_tangent;
        self.out_tangent = out_tangent;
        self
    }
}

/// Scalar curve evaluated with cubic Hermite segments between keys.
///
/// Outside the key range the curve holds its first/last value. A curve with no
/// keys evaluates to zero.
#[derive(Reflect, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(transparent)]
pub struct FloatCurve {
    keys: Vec<CurveKey>,
}

impl FloatCurve {
    pub fn new(mut keys: Vec<CurveKey>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    pub fn constant(value: f32) -> Self {
        Self::new(vec![CurveKey::new(0.0, value)])
    }

    /// Straight segments through `(time, value)` points.
    pub fn linear(points: &[(f32, f32)]) -> Self {
        let mut keys: Vec<CurveKey> = points.iter().map(|&(t, v)| CurveKey::new(t, v)).collect();
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        for i in 0..keys.len().saturating_sub(1) {
            let dt = keys[i + 1].time - keys[i].time;
            let slope = if dt > 0.0 {
                (keys[i + 1].value - keys[i].value) / dt
            } else {
                0.0
            };
            keys[i].out_tangent = slope;
            keys[i + 1].in_tangent = slope;
        }
        Self { keys }
    }

    /// Bump rising from 0 to `magnitude` at t = 0.5 and back to 0 at t = 1,
    /// with flat tangents.
    pub fn sine_pulse(magnitude: f32) -> Self {
        Self::new(vec![
            CurveKey::new(0.0, 0.0),
            CurveKey::new(0.5, magnitude),
            CurveKey::new(1.0, 0.0),
        ])
    }

    pub fn keys(&self) -> &[CurveKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key times are finite and never decrease. Curves deserialized from
    /// files skip the sorting done by the constructors.
    pub fn is_sorted(&self) -> bool {
        self.keys.iter().all(|k| k.time.is_finite())
            && self.keys.windows(2).all(|pair| pair[0].time <= pair[1].time)
    }

    pub fn evaluate(&self, t: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return 0.0;
        };
        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        let next = self.keys.partition_point(|k| k.time <= t);
        let a = &self.keys[next - 1];
        let b = &self.keys[next];
        let dt = b.time - a.time;
        if dt <= 0.0 {
            return b.value;
        }

        let s = (t - a.time) / dt;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        h00 * a.value + h10 * dt * a.out_tangent + h01 * b.value + h11 * dt * b.in_tangent
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_curve_is_zero() {
        assert_eq!(FloatCurve::default().evaluate(0.3), 0.0);
    }

    #[test]
    fn constant_curve() {
        let curve = FloatCurve::constant(1.0);
        assert_eq!(curve.evaluate(-5.0), 1.0);
        assert_eq!(curve.evaluate(0.0), 1.0);
        assert_eq!(curve.evaluate(5.0), 1.0);
    }

    #[test]
    fn sine_pulse_peaks_in_the_middle() {
        let curve = FloatCurve::sine_pulse(0.03);
        assert_eq!(curve.evaluate(0.0), 0.0);
        assert!((curve.evaluate(0.5) - 0.03).abs() < 1e-6);
        assert_eq!(curve.evaluate(1.0), 0.0);
        assert!(curve.evaluate(0.25) > 0.0 && curve.evaluate(0.25) < 0.03);
    }

    #[test]
    fn unsorted_keys_are_reported() {
        assert!(FloatCurve::default().is_sorted());
        assert!(FloatCurve::sine_pulse(0.1).is_sorted());

        let unsorted = FloatCurve {
            keys: vec![CurveKey::new(1.0, 0.0), CurveKey::new(0.0, 1.0)],
        };
        assert!(!unsorted.is_sorted());
        let nan = FloatCurve {
            keys: vec![CurveKey::new(f32::NAN, 0.0)],
        };
        assert!(!nan.is_sorted());
    }

    #[test]
    fn linear_curve_interpolates_linearly() {
        let curve = FloatCurve::linear(&[(1.0, 1.0), (0.0, 0.0), (2.0, 3.0)]);
        assert!((curve.evaluate(0.5) - 0.5).abs() < 1e-5);
        assert!((curve.evaluate(1.5) - 2.0).abs() < 1e-5);
    }
}
