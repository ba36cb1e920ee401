//! Peaking biquad filter for the equalizer bands.
//!
//! Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson),
//! Direct Form II Transposed. Runs in f64 internally.

use std::f64::consts::PI;

/// Bandwidth of every equalizer band.
pub const BAND_Q: f64 = 1.0;

/// Normalized biquad coefficients (a0 = 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    /// Peaking EQ: boosts or cuts `gain_db` around `frequency`.
    pub fn peaking(sample_rate: f64, frequency: f64, q: f64, gain_db: f64) -> Self {
        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        let a_lin = 10.0_f64.powf(gain_db / 40.0);

        let b0 = 1.0 + alpha * a_lin;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a_lin;
        let a0 = 1.0 + alpha / a_lin;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a_lin;

        Coefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response in dB at `frequency`.
    pub fn magnitude_db(&self, sample_rate: f64, frequency: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        let num = (num_re * num_re + num_im * num_im).sqrt();
        let den = (den_re * den_re + den_im * den_im).sqrt();
        20.0 * (num / den).log10()
    }
}

/// A biquad with its own state.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coef: Coefficients,
    z1: f64,
    z2: f64,
}

impl BiquadFilter {
    pub fn new(coef: Coefficients) -> Self {
        BiquadFilter {
            coef,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Process a single sample through the filter.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let c = &self.coef;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }

    /// Filter a whole block from a cleared state.
    pub fn run(coef: Coefficients, input: &[f64]) -> Vec<f64> {
        let mut f = BiquadFilter::new(coef);
        input.iter().map(|&x| f.process(x)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_gain_is_flat() {
        let c = Coefficients::peaking(44100.0, 1000.0, BAND_Q, 0.0);
        for f in [50.0, 1000.0, 15000.0] {
            assert!(c.magnitude_db(44100.0, f).abs() < 1e-9);
        }
    }

    #[test]
    fn peak_gain_at_centre() {
        let c = Coefficients::peaking(44100.0, 1000.0, BAND_Q, 6.0);
        assert!((c.magnitude_db(44100.0, 1000.0) - 6.0).abs() < 0.01);
        assert!(c.magnitude_db(44100.0, 100.0).abs() < 1.0);
    }

    #[test]
    fn sine_at_centre_is_boosted() {
        let sr = 44100.0;
        let c = Coefficients::peaking(sr, 1000.0, BAND_Q, 12.0);
        let input: Vec<f64> = (0..8820)
            .map(|i| 0.1 * (2.0 * PI * 1000.0 * i as f64 / sr).sin())
            .collect();
        let out = BiquadFilter::run(c, &input);
        let peak = out[4410..].iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        // +12 dB is ~x3.98
        assert!((peak / 0.1 - 3.98).abs() < 0.1, "peak ratio {}", peak / 0.1);
    }

    #[test]
    fn output_finite() {
        let c = Coefficients::peaking(8000.0, 60.0, BAND_Q, -20.0);
        let mut f = BiquadFilter::new(c);
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            assert!(f.process(input).is_finite(), "not finite at {i}");
        }
    }
}
