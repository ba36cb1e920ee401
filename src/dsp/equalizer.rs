//! Eight-band graphic equalizer built from peaking biquads in series.

use log::debug;

use super::filter::{BAND_Q, BiquadFilter, Coefficients};
use crate::buffer::SampleBuffer;
use crate::error::Result;
use crate::params::{EQ_FREQUENCIES, EqBand};

/// Bands at or above this fraction of the sample rate are dropped.
const MAX_CENTRE_FRACTION: f32 = 0.45;

#[derive(Debug, Clone)]
pub struct Equalizer {
    stages: Vec<Coefficients>,
}

impl Equalizer {
    /// Build the active bands. Bands at 0 dB or above the usable frequency
    /// range contribute nothing and are not instantiated.
    pub fn new(sample_rate: u32, bands: &[EqBand]) -> Result<Self> {
        let mut gains = [0.0_f32; EQ_FREQUENCIES.len()];
        for band in bands {
            band.validate()?;
            gains[band.band_index] = band.gain_db;
        }

        let sr = sample_rate as f32;
        let mut stages = Vec::new();
        for (i, (&freq, &gain)) in EQ_FREQUENCIES.iter().zip(&gains).enumerate() {
            if gain == 0.0 {
                continue;
            }
            if freq >= sr * MAX_CENTRE_FRACTION {
                debug!("eq band {i} ({freq} Hz) above usable range at {sample_rate} Hz, skipped");
                continue;
            }
            stages.push(Coefficients::peaking(
                sample_rate as f64,
                freq as f64,
                BAND_Q,
                gain as f64,
            ));
        }
        Ok(Equalizer { stages })
    }

    pub fn is_flat(&self) -> bool {
        self.stages.is_empty()
    }

    /// Equalize a mono block.
    pub fn process(&self, input: &[f32]) -> Vec<f32> {
        if self.is_flat() {
            return input.to_vec();
        }
        let mut signal: Vec<f64> = input.iter().map(|&s| s as f64).collect();
        for &coef in &self.stages {
            signal = BiquadFilter::run(coef, &signal);
        }
        signal.into_iter().map(|s| s as f32).collect()
    }

    pub fn apply(&self, input: &SampleBuffer) -> Result<SampleBuffer> {
        if self.is_flat() {
            return Ok(input.clone());
        }
        input.map_channels(|ch| self.process(ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| 0.25 * (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    fn peak(s: &[f32]) -> f32 {
        s.iter().fold(0.0, |m, x| m.max(x.abs()))
    }

    #[test]
    fn no_bands_is_identity() {
        let eq = Equalizer::new(44100, &[EqBand::new(3, 0.0)]).unwrap();
        assert!(eq.is_flat());
        let input = sine(440.0, 44100, 1024);
        assert_eq!(eq.process(&input), input);
    }

    #[test]
    fn boosts_only_its_band() {
        let sr = 44100;
        let eq = Equalizer::new(sr, &[EqBand::new(4, 6.0)]).unwrap();

        let at_band = eq.process(&sine(1000.0, sr, 8820));
        let ratio = peak(&at_band[4410..]) / 0.25;
        assert!((ratio - 2.0).abs() < 0.1, "1 kHz gain ratio {ratio}");

        let far = eq.process(&sine(60.0, sr, 44100));
        let ratio = peak(&far[22050..]) / 0.25;
        assert!((ratio - 1.0).abs() < 0.1, "60 Hz gain ratio {ratio}");
    }

    #[test]
    fn bands_above_nyquist_are_skipped() {
        let eq = Equalizer::new(8000, &[EqBand::new(7, 12.0)]).unwrap();
        assert!(eq.is_flat());
    }

    #[test]
    fn rejects_out_of_range_band() {
        assert!(Equalizer::new(44100, &[EqBand::new(9, 1.0)]).is_err());
        assert!(Equalizer::new(44100, &[EqBand::new(0, 30.0)]).is_err());
    }
}
