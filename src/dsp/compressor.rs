//! Compressor effect — offline feed-forward dynamics processing.
//!
//! The gain computer works on the level of each individual sample (no
//! separate envelope follower). The required gain in dB is smoothed with an
//! asymmetric one-pole filter: the attack coefficient applies while gain is
//! being pulled down, the release coefficient while it recovers.

use crate::buffer::SampleBuffer;
use crate::error::Result;
use crate::params::CompressorParams;

/// Floor used before taking the log of a sample's magnitude.
const EPS: f32 = 1e-5;
/// Lowest level the gain computer reasons about.
const MIN_DB: f32 = -100.0;
/// Shortest attack/release time, in seconds.
const MIN_TIME: f32 = 1e-4;

/// A mono feed-forward compressor. Holds coefficients only; the smoothing
/// state lives for a single [`process`](Compressor::process) call.
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold: f32,
    ratio: f32,
    knee: f32,
    makeup: f32,
    attack_coef: f32,
    release_coef: f32,
}

impl Compressor {
    /// Build a compressor, rejecting invalid settings.
    pub fn new(sample_rate: u32, params: &CompressorParams) -> Result<Self> {
        params.validate()?;
        Ok(Compressor {
            threshold: params.threshold_db,
            ratio: params.ratio,
            knee: params.knee_db,
            makeup: params.makeup_db,
            attack_coef: smoothing_coef(sample_rate, params.attack_sec),
            release_coef: smoothing_coef(sample_rate, params.release_sec),
        })
    }

    /// Convert linear amplitude to dB, floored at `MIN_DB`.
    #[inline]
    pub fn amp_to_db(x: f32) -> f32 {
        (20.0 * x.abs().max(EPS).log10()).max(MIN_DB)
    }

    /// Convert dB to linear amplitude.
    #[inline]
    pub fn db_to_amp(db: f32) -> f32 {
        10.0_f32.powf(db / 20.0)
    }

    #[inline]
    fn fully_compressed(&self, input_db: f32) -> f32 {
        self.threshold + (input_db - self.threshold) / self.ratio
    }

    /// Static curve: output level for a given input level, both in dB.
    pub fn gain_curve_db(&self, input_db: f32) -> f32 {
        if self.ratio == 1.0 {
            return input_db;
        }
        if self.knee <= 0.0 {
            return if input_db > self.threshold {
                self.fully_compressed(input_db)
            } else {
                input_db
            };
        }

        let half_knee = self.knee / 2.0;
        let knee_start = self.threshold - half_knee;
        let knee_end = self.threshold + half_knee;

        if input_db <= knee_start {
            input_db
        } else if input_db >= knee_end {
            self.fully_compressed(input_db)
        } else {
            // Linear blend from the untouched level at the knee start to the
            // compressed level at the knee end.
            let x = (input_db - knee_start) / self.knee;
            let at_end = self.fully_compressed(knee_end);
            knee_start + (at_end - knee_start) * x
        }
    }

    /// Compress a block of mono samples. Output has the same length.
    pub fn process(&self, input: &[f32]) -> Vec<f32> {
        let mut output = Vec::with_capacity(input.len());
        let mut gain_db = 0.0_f32;

        for &raw in input {
            let x = sanitize(raw);
            let input_db = Self::amp_to_db(x);
            let target_db = (self.gain_curve_db(input_db) - input_db) + self.makeup;

            let coef = if gain_db > target_db {
                self.attack_coef
            } else {
                self.release_coef
            };
            gain_db = coef * gain_db + (1.0 - coef) * target_db;

            output.push(x * Self::db_to_amp(gain_db));
        }

        output
    }

    /// Compress every channel of a buffer independently.
    pub fn apply(&self, input: &SampleBuffer) -> Result<SampleBuffer> {
        input.map_channels(|ch| self.process(ch))
    }
}

fn smoothing_coef(sample_rate: u32, seconds: f32) -> f32 {
    (-1.0 / (sample_rate as f32 * seconds.max(MIN_TIME))).exp()
}

/// Map non-finite samples into range: NaN becomes silence, infinities clip.
#[inline]
fn sanitize(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else if x.is_infinite() {
        x.signum()
    } else {
        x
    }
}
