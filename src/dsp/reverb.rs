//! Reverb effect — Schroeder/Freeverb-style algorithmic reverb.
//!
//! Parallel damped comb filters followed by series allpass filters, one
//! tank per side with the right side's delay lines offset by a stereo
//! spread. A modulated pre-delay line feeds both tanks. The reverberant
//! tail is soft-limited before the wet/dry mix, so the output stays inside
//! `[-1, 1]` whenever the input does.

use std::f32::consts::PI;

use crate::buffer::SampleBuffer;
use crate::error::Result;
use crate::params::ReverbParams;

/// A comb filter delay line with damped feedback.
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp1: f32,
    damp2: f32,
    filterstore: f32,
}

impl CombFilter {
    fn new(size: usize, feedback: f32, damp: f32) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback,
            damp1: damp,
            damp2: 1.0 - damp,
            filterstore: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];

        self.filterstore = output * self.damp2 + self.filterstore * self.damp1;

        self.buffer[self.index] = input + self.filterstore * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();

        output
    }
}

/// An allpass filter delay line.
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
}

const ALLPASS_FEEDBACK: f32 = 0.5;

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let bufout = self.buffer[self.index];
        let output = bufout - input;

        self.buffer[self.index] = input + bufout * ALLPASS_FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();

        output
    }
}

// Tuning constants (scaled for 44100 Hz sample rate)
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;

const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMPING: f32 = 0.5;
const INPUT_GAIN: f32 = 0.015;

/// Widest pre-delay modulation sweep at depth 1.
const MOD_SWEEP_MS: f32 = 5.0;
const MOD_RATE_HZ: f32 = 0.8;

#[derive(Debug, Clone)]
struct Tank {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Tank {
    fn new(scale: f64, offset: usize, feedback: f32) -> Self {
        let len = |t: usize| ((t + offset) as f64 * scale) as usize;
        Tank {
            combs: COMB_TUNING
                .iter()
                .map(|&t| CombFilter::new(len(t), feedback, DAMPING))
                .collect(),
            allpasses: ALLPASS_TUNING.iter().map(|&t| AllpassFilter::new(len(t))).collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let mut out = 0.0f32;
        for comb in &mut self.combs {
            out += comb.process(input);
        }
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }
}

/// Offline stereo/mono reverb. Configuration only; every `apply` call
/// starts from cleared delay lines.
#[derive(Debug, Clone)]
pub struct Reverb {
    sample_rate: u32,
    params: ReverbParams,
}

impl Reverb {
    pub fn new(sample_rate: u32, params: &ReverbParams) -> Result<Self> {
        params.validate()?;
        Ok(Reverb {
            sample_rate,
            params: *params,
        })
    }

    pub fn is_dry(&self) -> bool {
        self.params.is_neutral()
    }

    /// Render the reverb over a buffer. Output keeps the input's length and
    /// channel layout; the tail past the end of the input is dropped.
    pub fn apply(&self, input: &SampleBuffer) -> Result<SampleBuffer> {
        if self.is_dry() {
            return Ok(input.clone());
        }

        let sr = self.sample_rate as f32;
        let scale = self.sample_rate as f64 / 44100.0;
        let feedback = self.params.size * ROOM_SCALE + ROOM_OFFSET;
        let mut tank_l = Tank::new(scale, 0, feedback);
        let mut tank_r = Tank::new(scale, STEREO_SPREAD, feedback);

        let predelay = self.params.predelay_ms * 0.001 * sr;
        let sweep = self.params.depth * MOD_SWEEP_MS * 0.001 * sr;
        // Room for the longest modulated read plus interpolation.
        let mut line = DelayLine::new((predelay + sweep).ceil() as usize + 2);

        let width = self.params.width;
        let wet1 = width / 2.0 + 0.5;
        let wet2 = (1.0 - width) / 2.0;
        let wet = self.params.wet;
        let dry = 1.0 - wet;

        let ch = input.channels() as usize;
        let mut out = Vec::with_capacity(input.len());

        for (n, frame) in input.samples().chunks_exact(ch).enumerate() {
            let mono = frame.iter().sum::<f32>() / ch as f32;
            line.push(mono * INPUT_GAIN);

            // The sweep only ever lengthens the delay, so the pre-delay gap
            // stays silent.
            let lfo = 0.5 - 0.5 * (2.0 * PI * MOD_RATE_HZ * n as f32 / sr).cos();
            let tank_in = line.read(predelay + sweep * lfo);

            let out_l = tank_l.process(tank_in);
            let out_r = tank_r.process(tank_in);
            let wet_l = soft_limit(out_l * wet1 + out_r * wet2);
            let wet_r = soft_limit(out_r * wet1 + out_l * wet2);

            match ch {
                1 => {
                    let tail = 0.5 * (wet_l + wet_r);
                    out.push(mix(frame[0], tail, dry, wet));
                }
                _ => {
                    for (c, &x) in frame.iter().enumerate() {
                        let tail = if c % 2 == 0 { wet_l } else { wet_r };
                        out.push(mix(x, tail, dry, wet));
                    }
                }
            }
        }

        input.with_samples(out)
    }
}

/// Wet/dry blend, never louder than the larger of unity and the dry sample.
#[inline]
fn mix(dry_sample: f32, tail: f32, dry: f32, wet: f32) -> f32 {
    let limit = dry_sample.abs().max(1.0);
    (dry_sample * dry + tail * wet).clamp(-limit, limit)
}

/// Keeps the tail inside (-1, 1) without hard clipping.
#[inline]
fn soft_limit(x: f32) -> f32 {
    x.tanh()
}

/// Pre-delay line with fractional (linear interpolation) reads.
#[derive(Debug, Clone)]
struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(size: usize) -> Self {
        DelayLine {
            buffer: vec![0.0; size.max(2)],
            write_pos: 0,
        }
    }

    /// Write the next sample. `read(0.0)` returns it immediately.
    #[inline]
    fn push(&mut self, x: f32) {
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        self.buffer[self.write_pos] = x;
    }

    #[inline]
    fn read(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len();
        let max_delay = (len - 2) as f32;
        let delay = delay_samples.clamp(0.0, max_delay);
        let delay_int = delay as usize;
        let frac = delay - delay_int as f32;

        let pos0 = (self.write_pos + len - delay_int) % len;
        let pos1 = (pos0 + len - 1) % len;

        let s0 = self.buffer[pos0];
        let s1 = self.buffer[pos1];
        s0 + frac * (s1 - s0)
    }
}
