//! ADSR envelope shaper for whole buffers.
//!
//! Unlike a voice envelope there is no gate: the release segment is the
//! final `release` seconds of the buffer, and everything between decay and
//! release holds at the sustain level. All segments are linear.

use crate::buffer::SampleBuffer;
use crate::error::Result;
use crate::params::EnvelopeParams;

/// Envelope gain computed per frame, always within `[0, 1]`.
#[derive(Debug, Clone)]
pub struct EnvelopeShaper {
    attack: usize,
    decay: usize,
    sustain: f32,
    release: usize,
}

impl EnvelopeShaper {
    pub fn new(sample_rate: u32, params: &EnvelopeParams) -> Result<Self> {
        params.validate()?;
        let frames = |sec: f32| (sec as f64 * sample_rate as f64).round() as usize;
        Ok(EnvelopeShaper {
            attack: frames(params.attack_sec),
            decay: frames(params.decay_sec),
            sustain: params.sustain_level,
            release: frames(params.release_sec),
        })
    }

    /// Level of the attack/decay/sustain portion at frame `i`.
    fn pre_release_level(&self, i: usize) -> f32 {
        if i < self.attack {
            return i as f32 / self.attack as f32;
        }
        let i = i - self.attack;
        if i < self.decay {
            let t = i as f32 / self.decay as f32;
            return 1.0 - (1.0 - self.sustain) * t;
        }
        self.sustain
    }

    /// Envelope values for a buffer of `frames` frames.
    pub fn gains(&self, frames: usize) -> Vec<f32> {
        let release = self.release.min(frames);
        let release_start = frames - release;
        let start_level = self.pre_release_level(release_start);

        (0..frames)
            .map(|i| {
                let level = if i < release_start {
                    self.pre_release_level(i)
                } else {
                    let k = (i - release_start + 1) as f32;
                    start_level * (1.0 - k / release as f32)
                };
                level.clamp(0.0, 1.0)
            })
            .collect()
    }

    /// Shape a mono block.
    pub fn apply(&self, input: &[f32]) -> Vec<f32> {
        self.gains(input.len())
            .into_iter()
            .zip(input)
            .map(|(g, &x)| x * g)
            .collect()
    }

    /// Shape every channel of a buffer with the same per-frame envelope.
    pub fn apply_buffer(&self, input: &SampleBuffer) -> Result<SampleBuffer> {
        let ch = input.channels() as usize;
        let gains = self.gains(input.frames());
        let samples = input
            .samples()
            .chunks_exact(ch)
            .zip(&gains)
            .flat_map(|(frame, &g)| frame.iter().map(move |&x| x * g))
            .collect();
        input.with_samples(samples)
    }
}

/// One-shot form: build a shaper and apply it to a mono block.
pub fn apply_envelope(
    input: &[f32],
    sample_rate: u32,
    attack_sec: f32,
    decay_sec: f32,
    sustain_level: f32,
    release_sec: f32,
) -> Result<Vec<f32>> {
    let params = EnvelopeParams::new(attack_sec, decay_sec, sustain_level, release_sec);
    Ok(EnvelopeShaper::new(sample_rate, &params)?.apply(input))
}
