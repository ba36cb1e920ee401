//! Pitch-shift / time-stretch capability.
//!
//! The pipeline only sees the [`AudioProcessor`] trait, so the DSP backend
//! can be swapped or replaced by a test double. [`PhaseVocoderProcessor`] is
//! the production backend.

use log::debug;

use crate::buffer::SampleBuffer;
use crate::dsp::vocoder::Vocoder;
use crate::error::{FxError, Result};

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Changes pitch and duration of a buffer independently.
pub trait AudioProcessor {
    /// Shift pitch by `semitones`; the result has the same length.
    fn pitch_shift(&self, input: &SampleBuffer, semitones: i32) -> Result<SampleBuffer>;

    /// Change duration; the result has about `frames / tempo_ratio` frames.
    fn time_stretch(&self, input: &SampleBuffer, tempo_ratio: f32) -> Result<SampleBuffer>;
}

impl<P: AudioProcessor + ?Sized> AudioProcessor for &P {
    fn pitch_shift(&self, input: &SampleBuffer, semitones: i32) -> Result<SampleBuffer> {
        (**self).pitch_shift(input, semitones)
    }

    fn time_stretch(&self, input: &SampleBuffer, tempo_ratio: f32) -> Result<SampleBuffer> {
        (**self).time_stretch(input, tempo_ratio)
    }
}

/// Phase-vocoder backend, channel by channel.
#[derive(Debug, Default)]
pub struct PhaseVocoderProcessor {
    vocoder: Vocoder,
}

impl PhaseVocoderProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_rate(input: &SampleBuffer) -> Result<()> {
        let rate = input.sample_rate();
        if (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) {
            Ok(())
        } else {
            Err(FxError::processing(format!(
                "unsupported sample rate {rate} Hz (supported {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE})"
            )))
        }
    }
}

impl AudioProcessor for PhaseVocoderProcessor {
    fn pitch_shift(&self, input: &SampleBuffer, semitones: i32) -> Result<SampleBuffer> {
        Self::check_rate(input)?;
        debug!("pitch shift {semitones:+} st over {} frames", input.frames());
        input.map_channels(|ch| self.vocoder.shift(ch, semitones as f32))
    }

    fn time_stretch(&self, input: &SampleBuffer, tempo_ratio: f32) -> Result<SampleBuffer> {
        Self::check_rate(input)?;
        if !tempo_ratio.is_finite() || tempo_ratio <= 0.0 {
            return Err(FxError::processing(format!(
                "tempo ratio must be positive, got {tempo_ratio}"
            )));
        }
        debug!("time stretch x{tempo_ratio} over {} frames", input.frames());
        input.map_channels(|ch| self.vocoder.stretch(ch, tempo_ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo(frames: usize, sr: u32) -> SampleBuffer {
        let samples = (0..frames)
            .flat_map(|i| {
                let s = (i as f32 * 0.05).sin() * 0.5;
                [s, s * 0.5]
            })
            .collect();
        SampleBuffer::new(samples, sr, 2).unwrap()
    }

    #[test]
    fn pitch_shift_keeps_length_and_layout() {
        let p = PhaseVocoderProcessor::new();
        let input = stereo(6000, 44100);
        let out = p.pitch_shift(&input, 5).unwrap();
        assert_eq!(out.len(), input.len());
        assert_eq!(out.channels(), 2);
        assert!(out.is_finite());
    }

    #[test]
    fn time_stretch_scales_length() {
        let p = PhaseVocoderProcessor::new();
        let input = stereo(6000, 44100);
        let out = p.time_stretch(&input, 1.5).unwrap();
        assert_eq!(out.frames(), 4000);
        let out = p.time_stretch(&input, 0.75).unwrap();
        assert_eq!(out.frames(), 8000);
    }

    #[test]
    fn unsupported_rate_is_processing_error() {
        let p = PhaseVocoderProcessor::new();
        let input = SampleBuffer::mono(vec![0.0; 100], 4000).unwrap();
        assert!(matches!(p.pitch_shift(&input, 2), Err(FxError::Processing(_))));
        assert!(matches!(p.time_stretch(&input, 2.0), Err(FxError::Processing(_))));
    }

    #[test]
    fn invalid_ratio_is_processing_error() {
        let p = PhaseVocoderProcessor::new();
        let input = SampleBuffer::mono(vec![0.0; 100], 44100).unwrap();
        assert!(matches!(p.time_stretch(&input, 0.0), Err(FxError::Processing(_))));
        assert!(matches!(p.time_stretch(&input, f32::NAN), Err(FxError::Processing(_))));
    }
}
