//! Phase vocoder — independent control of duration and pitch.
//!
//! Time stretching analyses overlapping Hann-windowed frames at hop
//! `synthesis_hop * ratio`, re-accumulates each bin's phase from its
//! measured instantaneous frequency, and overlap-adds the frames at a fixed
//! synthesis hop. Pitch shifting stretches by the pitch factor and then
//! resamples back to the original length.

use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

pub const DEFAULT_FRAME_SIZE: usize = 2048;
pub const DEFAULT_SYNTHESIS_HOP: usize = DEFAULT_FRAME_SIZE / 4;

/// Overlap-add normalization floor.
const NORM_EPS: f32 = 1e-6;

pub struct Vocoder {
    frame_size: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for Vocoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vocoder")
            .field("frame_size", &self.frame_size)
            .field("hop", &self.hop)
            .finish()
    }
}

impl Default for Vocoder {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_SIZE, DEFAULT_SYNTHESIS_HOP)
    }
}

impl Vocoder {
    pub fn new(frame_size: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let window = (0..frame_size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / frame_size as f32).cos())
            .collect();
        Vocoder {
            frame_size,
            hop,
            window,
            forward: planner.plan_fft_forward(frame_size),
            inverse: planner.plan_fft_inverse(frame_size),
        }
    }

    /// Change duration by `1 / ratio` without changing pitch. The output
    /// has `round(len / ratio)` samples.
    pub fn stretch(&self, input: &[f32], ratio: f32) -> Vec<f32> {
        let out_len = (input.len() as f64 / ratio as f64).round() as usize;
        if input.is_empty() || out_len == 0 {
            return Vec::new();
        }

        let n = self.frame_size;
        let half = (n / 2) as isize;
        let hop_s = self.hop;
        let hop_a = hop_s as f64 * ratio as f64;
        let frames = out_len / hop_s + n / (2 * hop_s) + 1;

        let mut output = vec![0.0f32; out_len];
        let mut norm = vec![0.0f32; out_len];
        let mut spectrum = vec![Complex::new(0.0f32, 0.0); n];
        let mut prev_phase = vec![0.0f32; n];
        let mut synth_phase = vec![0.0f32; n];
        let mut prev_start: isize = 0;

        for m in 0..frames {
            let start = (m as f64 * hop_a).round() as isize - half;

            for (i, bin) in spectrum.iter_mut().enumerate() {
                let idx = start + i as isize;
                let x = if idx >= 0 && (idx as usize) < input.len() {
                    input[idx as usize]
                } else {
                    0.0
                };
                *bin = Complex::new(x * self.window[i], 0.0);
            }
            self.forward.process(&mut spectrum);

            let actual_hop = (start - prev_start) as f32;
            for (k, bin) in spectrum.iter_mut().enumerate() {
                let mag = bin.norm();
                let phase = bin.arg();
                let omega = 2.0 * PI * k as f32 / n as f32;

                if m == 0 {
                    synth_phase[k] = phase;
                } else if actual_hop > 0.0 {
                    let deviation = wrap_phase(phase - prev_phase[k] - omega * actual_hop);
                    let true_freq = omega + deviation / actual_hop;
                    synth_phase[k] = wrap_phase(synth_phase[k] + true_freq * hop_s as f32);
                } else {
                    synth_phase[k] = wrap_phase(synth_phase[k] + omega * hop_s as f32);
                }
                prev_phase[k] = phase;
                *bin = Complex::from_polar(mag, synth_phase[k]);
            }
            prev_start = start;

            self.inverse.process(&mut spectrum);

            let out_start = (m * hop_s) as isize - half;
            for (i, bin) in spectrum.iter().enumerate() {
                let idx = out_start + i as isize;
                if idx < 0 || idx as usize >= out_len {
                    continue;
                }
                let w = self.window[i];
                output[idx as usize] += bin.re / n as f32 * w;
                norm[idx as usize] += w * w;
            }
        }

        for (s, &w) in output.iter_mut().zip(&norm) {
            *s = if w > NORM_EPS { *s / w } else { 0.0 };
        }
        output
    }

    /// Shift pitch by `semitones` keeping the input's length.
    pub fn shift(&self, input: &[f32], semitones: f32) -> Vec<f32> {
        if input.is_empty() {
            return Vec::new();
        }
        let factor = 2.0_f32.powf(semitones / 12.0);
        let stretched = self.stretch(input, 1.0 / factor);
        resample_to(&stretched, input.len())
    }
}

/// Linear-interpolation resample to exactly `len` samples.
pub fn resample_to(input: &[f32], len: usize) -> Vec<f32> {
    if input.is_empty() || len == 0 {
        return vec![0.0; len];
    }
    let step = input.len() as f64 / len as f64;
    (0..len)
        .map(|i| read_interpolated(input, i as f64 * step))
        .collect()
}

/// Read a sample with linear interpolation at a fractional position.
fn read_interpolated(data: &[f32], position: f64) -> f32 {
    let idx = position as usize;
    if idx >= data.len() - 1 {
        return data[data.len() - 1];
    }
    let frac = (position - idx as f64) as f32;
    data[idx] * (1.0 - frac) + data[idx + 1] * frac
}

#[inline]
fn wrap_phase(p: f32) -> f32 {
    p - 2.0 * PI * ((p + PI) / (2.0 * PI)).floor()
}
