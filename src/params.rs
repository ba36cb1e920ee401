//! Effect parameter types.
//!
//! `EffectParameters` is the immutable configuration for one render. Every
//! field defaults to its neutral value, so a default-constructed set of
//! parameters is an identity transform. The types serialize as camelCase
//! JSON so presets can be stored next to a project.

use serde::{Deserialize, Serialize};

use crate::error::{FxError, Result};

/// Centre frequencies of the equalizer bands, in Hz.
pub const EQ_FREQUENCIES: [f32; 8] = [60.0, 120.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0];
pub const EQ_GAIN_MIN_DB: f32 = -20.0;
pub const EQ_GAIN_MAX_DB: f32 = 20.0;

pub const PREDELAY_MAX_MS: f32 = 100.0;

pub const COMP_RATIO_MAX: f32 = 20.0;
pub const COMP_KNEE_MAX_DB: f32 = 20.0;
pub const COMP_GAIN_MIN_DB: f32 = -20.0;
pub const COMP_GAIN_MAX_DB: f32 = 20.0;
pub const COMP_TIME_MAX_SEC: f32 = 1.0;

/// Longest attack, decay or release segment.
pub const ADSR_MAX_TIME_SEC: f32 = 10.0;

pub const SEMITONE_LIMIT: i32 = 48;
pub const TEMPO_RATIO_MIN: f32 = 0.25;
pub const TEMPO_RATIO_MAX: f32 = 4.0;

// ── Per-stage parameters ────────────────────────────────────

/// Gain for one equalizer band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqBand {
    /// Index into [`EQ_FREQUENCIES`].
    pub band_index: usize,
    pub gain_db: f32,
}

impl EqBand {
    pub fn new(band_index: usize, gain_db: f32) -> Self {
        EqBand {
            band_index,
            gain_db,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.band_index >= EQ_FREQUENCIES.len() {
            return Err(FxError::config(format!(
                "EQ band index {} out of range (0..{})",
                self.band_index,
                EQ_FREQUENCIES.len()
            )));
        }
        if !(EQ_GAIN_MIN_DB..=EQ_GAIN_MAX_DB).contains(&self.gain_db) {
            return Err(FxError::config(format!(
                "EQ band {} gain {} dB outside [{EQ_GAIN_MIN_DB}, {EQ_GAIN_MAX_DB}]",
                self.band_index, self.gain_db
            )));
        }
        Ok(())
    }
}

/// Reverb settings. All but `predelay_ms` are normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReverbParams {
    /// Dry/wet mix (0 = fully dry).
    pub wet: f32,
    /// Room size; longer decay as it grows.
    pub size: f32,
    /// Stereo width of the reverberant tail.
    pub width: f32,
    /// Modulation depth of the pre-delay line.
    pub depth: f32,
    /// Silence inserted before the first reflection, in milliseconds.
    pub predelay_ms: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        ReverbParams {
            wet: 0.0,
            size: 0.5,
            width: 1.0,
            depth: 0.0,
            predelay_ms: 0.0,
        }
    }
}

impl ReverbParams {
    pub fn validate(&self) -> Result<()> {
        unit_range("reverb wet", self.wet)?;
        unit_range("reverb size", self.size)?;
        unit_range("reverb width", self.width)?;
        unit_range("reverb depth", self.depth)?;
        if !(0.0..=PREDELAY_MAX_MS).contains(&self.predelay_ms) {
            return Err(FxError::config(format!(
                "reverb pre-delay {} ms outside [0, {PREDELAY_MAX_MS}]",
                self.predelay_ms
            )));
        }
        Ok(())
    }

    pub fn is_neutral(&self) -> bool {
        self.wet <= 0.0
    }
}

/// ADSR envelope settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopeParams {
    pub attack_sec: f32,
    pub decay_sec: f32,
    /// Sustain level in `[0, 1]`.
    pub sustain_level: f32,
    pub release_sec: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        EnvelopeParams {
            attack_sec: 0.0,
            decay_sec: 0.0,
            sustain_level: 1.0,
            release_sec: 0.0,
        }
    }
}

impl EnvelopeParams {
    pub fn new(attack_sec: f32, decay_sec: f32, sustain_level: f32, release_sec: f32) -> Self {
        EnvelopeParams {
            attack_sec,
            decay_sec,
            sustain_level,
            release_sec,
        }
    }

    pub fn validate(&self) -> Result<()> {
        bounded_time("envelope attack", self.attack_sec, ADSR_MAX_TIME_SEC)?;
        bounded_time("envelope decay", self.decay_sec, ADSR_MAX_TIME_SEC)?;
        bounded_time("envelope release", self.release_sec, ADSR_MAX_TIME_SEC)?;
        unit_range("envelope sustain", self.sustain_level)
    }

    pub fn is_neutral(&self) -> bool {
        self.attack_sec == 0.0
            && self.decay_sec == 0.0
            && self.release_sec == 0.0
            && self.sustain_level == 1.0
    }
}

/// Dynamics compressor settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressorParams {
    pub threshold_db: f32,
    /// Compression ratio, `>= 1` (1 = no compression).
    pub ratio: f32,
    /// Knee width in dB (0 = hard knee).
    pub knee_db: f32,
    pub makeup_db: f32,
    pub attack_sec: f32,
    pub release_sec: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        CompressorParams {
            threshold_db: -10.0,
            ratio: 1.0,
            knee_db: 0.0,
            makeup_db: 0.0,
            attack_sec: 0.010,
            release_sec: 0.100,
        }
    }
}

impl CompressorParams {
    /// Ranges match what a project sidecar can store: a whole-number ratio
    /// up to 20, threshold and makeup within ±20 dB, times up to 1 s.
    pub fn validate(&self) -> Result<()> {
        if !(1.0..=COMP_RATIO_MAX).contains(&self.ratio) || self.ratio.fract() != 0.0 {
            return Err(FxError::config(format!(
                "compressor ratio must be a whole number in [1, {COMP_RATIO_MAX}], got {}",
                self.ratio
            )));
        }
        if !(0.0..=COMP_KNEE_MAX_DB).contains(&self.knee_db) {
            return Err(FxError::config(format!(
                "compressor knee {} dB outside [0, {COMP_KNEE_MAX_DB}]",
                self.knee_db
            )));
        }
        gain_range("compressor threshold", self.threshold_db)?;
        gain_range("compressor makeup", self.makeup_db)?;
        bounded_time("compressor attack", self.attack_sec, COMP_TIME_MAX_SEC)?;
        bounded_time("compressor release", self.release_sec, COMP_TIME_MAX_SEC)
    }

    pub fn is_neutral(&self) -> bool {
        self.ratio == 1.0 && self.makeup_db == 0.0
    }
}

// ── Whole-render parameters ─────────────────────────────────

/// Everything one render applies, stage by stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectParameters {
    pub eq_bands: Vec<EqBand>,
    pub reverb: ReverbParams,
    pub envelope: EnvelopeParams,
    /// Pitch shift in semitones (0 = unchanged).
    pub semitones: i32,
    /// Playback speed factor (1 = unchanged, 2 = twice as fast).
    pub tempo_ratio: f32,
    pub compressor: CompressorParams,
}

impl Default for EffectParameters {
    fn default() -> Self {
        EffectParameters {
            eq_bands: Vec::new(),
            reverb: ReverbParams::default(),
            envelope: EnvelopeParams::default(),
            semitones: 0,
            tempo_ratio: 1.0,
            compressor: CompressorParams::default(),
        }
    }
}

impl EffectParameters {
    /// Check every stage, reporting the first invalid field.
    pub fn validate(&self) -> Result<()> {
        for band in &self.eq_bands {
            band.validate()?;
        }
        self.reverb.validate()?;
        self.envelope.validate()?;
        if !(-SEMITONE_LIMIT..=SEMITONE_LIMIT).contains(&self.semitones) {
            return Err(FxError::config(format!(
                "pitch shift of {} semitones exceeds ±{SEMITONE_LIMIT}",
                self.semitones
            )));
        }
        if !(TEMPO_RATIO_MIN..=TEMPO_RATIO_MAX).contains(&self.tempo_ratio) {
            return Err(FxError::config(format!(
                "tempo ratio {} outside [{TEMPO_RATIO_MIN}, {TEMPO_RATIO_MAX}]",
                self.tempo_ratio
            )));
        }
        self.compressor.validate()
    }

    /// Gain for a band, 0 dB when the band is not configured.
    /// A band listed twice uses its last entry.
    pub fn eq_gain_db(&self, band_index: usize) -> f32 {
        self.eq_bands
            .iter()
            .rev()
            .find(|b| b.band_index == band_index)
            .map(|b| b.gain_db)
            .unwrap_or(0.0)
    }

    pub fn shifts_pitch(&self) -> bool {
        self.semitones != 0
    }

    pub fn stretches_time(&self) -> bool {
        self.tempo_ratio != 1.0
    }

    /// Parse a JSON parameter preset and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: EffectParameters = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn unit_range(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(FxError::config(format!("{name} must be in [0, 1], got {value}")))
    }
}

fn bounded_time(name: &str, seconds: f32, max: f32) -> Result<()> {
    if (0.0..=max).contains(&seconds) {
        Ok(())
    } else {
        Err(FxError::config(format!(
            "{name} time {seconds} s outside [0, {max}]"
        )))
    }
}

fn gain_range(name: &str, db: f32) -> Result<()> {
    if (COMP_GAIN_MIN_DB..=COMP_GAIN_MAX_DB).contains(&db) {
        Ok(())
    } else {
        Err(FxError::config(format!(
            "{name} {db} dB outside [{COMP_GAIN_MIN_DB}, {COMP_GAIN_MAX_DB}]"
        )))
    }
}
