//! Project sidecar (`config.json`) model.
//!
//! The project packager stores, next to each processed audio file, the list
//! of audio files and one flat `{type, value, targetAudioFile}` record per
//! applied parameter. This module converts between that format and
//! [`EffectParameters`] so the values on disk are exactly the values a render
//! applied.

use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::codec::write_atomically;
use crate::error::Result;
use crate::params::{
    self, ADSR_MAX_TIME_SEC, COMP_GAIN_MAX_DB, COMP_GAIN_MIN_DB, COMP_KNEE_MAX_DB,
    COMP_RATIO_MAX, COMP_TIME_MAX_SEC, EQ_FREQUENCIES, EQ_GAIN_MAX_DB, EQ_GAIN_MIN_DB,
    EffectParameters, PREDELAY_MAX_MS, SEMITONE_LIMIT, TEMPO_RATIO_MAX, TEMPO_RATIO_MIN,
};

pub const SIDECAR_FILE_NAME: &str = "config.json";

// ── Wire types ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFileMetadata {
    pub name: String,
    pub volume: f32,
    #[serde(default)]
    pub duration_seconds: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMetadata {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f32,
    pub target_audio_file: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplerProjectData {
    #[serde(default)]
    pub audio_files: Vec<AudioFileMetadata>,
    #[serde(default)]
    pub parameters: Vec<ParameterMetadata>,
}

// ── Parameter record names ──────────────────────────────────

/// The parameter `type` strings understood by the packager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Attack,
    Decay,
    Sustain,
    Release,
    CompRatio,
    CompThreshold,
    CompKnee,
    CompGain,
    CompAttack,
    CompDecay,
    EqBand(usize),
    Tempo,
    Pitch,
    ReverbWet,
    ReverbSize,
    ReverbWidth,
    ReverbDepth,
    ReverbPredelay,
}

impl ParameterKind {
    pub fn parse(s: &str) -> Option<Self> {
        use ParameterKind::*;
        let kind = match s {
            "attack" => Attack,
            "decay" => Decay,
            "sustain" => Sustain,
            "release" => Release,
            "compRatio" => CompRatio,
            "compThreshold" => CompThreshold,
            "compKnee" => CompKnee,
            "compGain" => CompGain,
            "compAttack" => CompAttack,
            "compDecay" => CompDecay,
            "tempo" => Tempo,
            "pitch" => Pitch,
            "reverbWet" => ReverbWet,
            "reverbSize" => ReverbSize,
            "reverbWidth" => ReverbWidth,
            "reverbDepth" => ReverbDepth,
            "reverbPredelay" => ReverbPredelay,
            other => {
                let index = other.strip_prefix("eq_band_")?.parse().ok()?;
                EqBand(index)
            }
        };
        Some(kind)
    }

    pub fn name(&self) -> String {
        use ParameterKind::*;
        match self {
            Attack => "attack".into(),
            Decay => "decay".into(),
            Sustain => "sustain".into(),
            Release => "release".into(),
            CompRatio => "compRatio".into(),
            CompThreshold => "compThreshold".into(),
            CompKnee => "compKnee".into(),
            CompGain => "compGain".into(),
            CompAttack => "compAttack".into(),
            CompDecay => "compDecay".into(),
            EqBand(i) => format!("eq_band_{i}"),
            Tempo => "tempo".into(),
            Pitch => "pitch".into(),
            ReverbWet => "reverbWet".into(),
            ReverbSize => "reverbSize".into(),
            ReverbWidth => "reverbWidth".into(),
            ReverbDepth => "reverbDepth".into(),
            ReverbPredelay => "reverbPredelay".into(),
        }
    }
}

// ── Conversion ──────────────────────────────────────────────

impl SamplerProjectData {
    /// Describe one processed audio file and the parameters applied to it.
    pub fn from_parameters(
        audio_name: &str,
        buffer: &SampleBuffer,
        params: &EffectParameters,
    ) -> Self {
        use ParameterKind::*;

        let env = &params.envelope;
        let comp = &params.compressor;
        let rev = &params.reverb;

        let mut values: Vec<(ParameterKind, f32)> = vec![
            (Attack, env.attack_sec),
            (Decay, env.decay_sec),
            (Sustain, env.sustain_level),
            (Release, env.release_sec),
            (CompRatio, comp.ratio),
            (CompThreshold, comp.threshold_db),
            (CompKnee, comp.knee_db),
            (CompGain, comp.makeup_db),
            (CompAttack, comp.attack_sec),
            (CompDecay, comp.release_sec),
            (Tempo, params.tempo_ratio),
            (Pitch, params.semitones as f32),
            (ReverbWet, rev.wet),
            (ReverbSize, rev.size),
            (ReverbWidth, rev.width),
            (ReverbDepth, rev.depth),
            (ReverbPredelay, rev.predelay_ms),
        ];
        values.extend((0..EQ_FREQUENCIES.len()).map(|i| (EqBand(i), params.eq_gain_db(i))));

        SamplerProjectData {
            audio_files: vec![AudioFileMetadata {
                name: audio_name.to_string(),
                volume: 1.0,
                duration_seconds: buffer.duration_seconds(),
            }],
            parameters: values
                .into_iter()
                .map(|(kind, value)| ParameterMetadata {
                    kind: kind.name(),
                    value,
                    target_audio_file: audio_name.to_string(),
                })
                .collect(),
        }
    }

    /// Rebuild effect parameters from the stored records. Missing records keep
    /// their neutral defaults, values are clamped into legal ranges, and
    /// unknown record types are ignored.
    pub fn to_parameters(&self) -> EffectParameters {
        records_to_parameters(&self.parameters)
    }

    /// Parameters recorded for one audio file of a shared sidecar.
    pub fn parameters_for(&self, audio_name: &str) -> EffectParameters {
        let records: Vec<ParameterMetadata> = self
            .parameters
            .iter()
            .filter(|r| r.target_audio_file == audio_name)
            .cloned()
            .collect();
        records_to_parameters(&records)
    }

    /// Fold `other` into this project. Audio files and parameter records for
    /// names that `other` describes are replaced; everything else is kept.
    pub fn merge(mut self, other: SamplerProjectData) -> Self {
        let replaced = |name: &str| other.audio_files.iter().any(|f| f.name == name);
        self.audio_files.retain(|f| !replaced(&f.name));
        self.parameters.retain(|r| !replaced(&r.target_audio_file));
        self.audio_files.extend(other.audio_files.iter().cloned());
        self.parameters.extend(other.parameters.iter().cloned());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the sidecar to `path`, replacing any previous one atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json_string()?;
        write_atomically(path, |tmp| Ok(std::fs::write(tmp, json.as_bytes())?))
    }

    pub fn read(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

fn records_to_parameters(records: &[ParameterMetadata]) -> EffectParameters {
    use ParameterKind::*;

    let mut p = EffectParameters::default();
    let mut eq = [None::<f32>; EQ_FREQUENCIES.len()];

    for record in records {
        let Some(kind) = ParameterKind::parse(&record.kind) else {
            debug!("ignoring unknown parameter record '{}'", record.kind);
            continue;
        };
        let v = record.value;
        if !v.is_finite() {
            warn!("ignoring non-finite value for '{}'", record.kind);
            continue;
        }
        match kind {
            Attack => p.envelope.attack_sec = v.clamp(0.0, ADSR_MAX_TIME_SEC),
            Decay => p.envelope.decay_sec = v.clamp(0.0, ADSR_MAX_TIME_SEC),
            Sustain => p.envelope.sustain_level = v.clamp(0.0, 1.0),
            Release => p.envelope.release_sec = v.clamp(0.0, ADSR_MAX_TIME_SEC),
            CompRatio => p.compressor.ratio = v.round().clamp(1.0, COMP_RATIO_MAX),
            CompThreshold => {
                p.compressor.threshold_db = v.clamp(COMP_GAIN_MIN_DB, COMP_GAIN_MAX_DB)
            }
            CompKnee => p.compressor.knee_db = v.clamp(0.0, COMP_KNEE_MAX_DB),
            CompGain => p.compressor.makeup_db = v.clamp(COMP_GAIN_MIN_DB, COMP_GAIN_MAX_DB),
            CompAttack => p.compressor.attack_sec = v.clamp(0.0, COMP_TIME_MAX_SEC),
            CompDecay => p.compressor.release_sec = v.clamp(0.0, COMP_TIME_MAX_SEC),
            EqBand(i) if i < EQ_FREQUENCIES.len() => {
                eq[i] = Some(v.clamp(EQ_GAIN_MIN_DB, EQ_GAIN_MAX_DB))
            }
            EqBand(i) => debug!("ignoring out-of-range eq band {i}"),
            Tempo => p.tempo_ratio = v.clamp(TEMPO_RATIO_MIN, TEMPO_RATIO_MAX),
            Pitch => {
                p.semitones = (v.round() as i32).clamp(-SEMITONE_LIMIT, SEMITONE_LIMIT)
            }
            ReverbWet => p.reverb.wet = v.clamp(0.0, 1.0),
            ReverbSize => p.reverb.size = v.clamp(0.0, 1.0),
            ReverbWidth => p.reverb.width = v.clamp(0.0, 1.0),
            ReverbDepth => p.reverb.depth = v.clamp(0.0, 1.0),
            ReverbPredelay => p.reverb.predelay_ms = v.clamp(0.0, PREDELAY_MAX_MS),
        }
    }

    p.eq_bands = eq
        .iter()
        .enumerate()
        .filter_map(|(i, g)| g.filter(|&g| g != 0.0).map(|g| params::EqBand::new(i, g)))
        .collect();
    p
}
