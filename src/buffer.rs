//! Decoded PCM buffer passed between pipeline stages.
//!
//! Samples are interleaved `f32`, nominally in `[-1, 1]`. Stages never
//! mutate a buffer they were handed; they build a new one.

use crate::error::{FxError, Result};

/// An interleaved block of decoded audio.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl SampleBuffer {
    /// Create a buffer, validating the rate and channel layout.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(FxError::config("sample rate must be > 0"));
        }
        if channels == 0 {
            return Err(FxError::config("channel count must be >= 1"));
        }
        if samples.len() % channels as usize != 0 {
            return Err(FxError::config(format!(
                "{} samples is not a whole number of {channels}-channel frames",
                samples.len()
            )));
        }
        Ok(SampleBuffer {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Mono convenience constructor.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(samples, sample_rate, 1)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }

    /// True when no sample is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    /// Replace the samples, keeping rate and layout.
    pub fn with_samples(&self, samples: Vec<f32>) -> Result<Self> {
        Self::new(samples, self.sample_rate, self.channels)
    }

    /// Split into one vector per channel.
    pub fn deinterleave(&self) -> Vec<Vec<f32>> {
        let ch = self.channels as usize;
        let frames = self.frames();
        let mut out = vec![Vec::with_capacity(frames); ch];
        for frame in self.samples.chunks_exact(ch) {
            for (c, &s) in frame.iter().enumerate() {
                out[c].push(s);
            }
        }
        out
    }

    /// Build a buffer from per-channel vectors. All channels must have the
    /// same length.
    pub fn interleave(channels: &[Vec<f32>], sample_rate: u32) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(FxError::config("at least one channel is required"));
        };
        let frames = first.len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(FxError::config("channels have mismatched lengths"));
        }
        let mut samples = Vec::with_capacity(frames * channels.len());
        for i in 0..frames {
            for c in channels {
                samples.push(c[i]);
            }
        }
        let count = u16::try_from(channels.len())
            .map_err(|_| FxError::config("too many channels"))?;
        Self::new(samples, sample_rate, count)
    }

    /// Run `f` over each channel independently and reassemble the result.
    pub fn map_channels<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&[f32]) -> Vec<f32>,
    {
        if self.channels == 1 {
            return self.with_samples(f(&self.samples));
        }
        let processed: Vec<Vec<f32>> = self.deinterleave().iter().map(|c| f(c)).collect();
        Self::interleave(&processed, self.sample_rate)
    }

    /// Fallible variant of [`map_channels`](Self::map_channels).
    pub fn try_map_channels<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&[f32]) -> Result<Vec<f32>>,
    {
        if self.channels == 1 {
            return self.with_samples(f(&self.samples)?);
        }
        let processed = self
            .deinterleave()
            .iter()
            .map(|c| f(c))
            .collect::<Result<Vec<_>>>()?;
        Self::interleave(&processed, self.sample_rate)
    }
}
