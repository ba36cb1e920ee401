//! Pipeline orchestrator.
//!
//! Runs one decoded buffer through the effect chain in a fixed order:
//!
//! ```text
//! EQ → reverb → envelope → pitch shift → time stretch → compressor
//! ```
//!
//! Every stage is built (and its parameters validated) before any sample is
//! touched. The built-in stages always run and pass audio through unchanged
//! at neutral settings; the pitch and tempo backend is only called when a
//! change is requested. Stages never mutate their input, so a failing stage
//! leaves the caller's buffer exactly as it was.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::buffer::SampleBuffer;
use crate::codec::{BufferWriter, Decoder, temp_path};
use crate::dsp::compressor::Compressor;
use crate::dsp::envelope::EnvelopeShaper;
use crate::dsp::equalizer::Equalizer;
use crate::dsp::reverb::Reverb;
use crate::error::{FxError, Result};
use crate::params::EffectParameters;
use crate::processor::AudioProcessor;
use crate::project::{SIDECAR_FILE_NAME, SamplerProjectData};

/// Process an already-decoded buffer.
pub fn process<P: AudioProcessor>(
    input: &SampleBuffer,
    params: &EffectParameters,
    processor: &P,
) -> Result<SampleBuffer> {
    params.validate()?;

    let rate = input.sample_rate();
    let equalizer = Equalizer::new(rate, &params.eq_bands)?;
    let reverb = Reverb::new(rate, &params.reverb)?;
    let envelope = EnvelopeShaper::new(rate, &params.envelope)?;
    let compressor = Compressor::new(rate, &params.compressor)?;

    debug!(
        "processing {} frames @ {} Hz, {} ch: eq bands {}, reverb wet {:.2}, pitch {:+} st, tempo x{}, comp ratio {}",
        input.frames(),
        rate,
        input.channels(),
        params.eq_bands.len(),
        params.reverb.wet,
        params.semitones,
        params.tempo_ratio,
        params.compressor.ratio
    );

    let mut buf = equalizer.apply(input)?;
    buf = reverb.apply(&buf)?;
    buf = envelope.apply_buffer(&buf)?;

    if params.shifts_pitch() {
        buf = processor.pitch_shift(&buf, params.semitones)?;
    }
    if params.stretches_time() {
        buf = processor.time_stretch(&buf, params.tempo_ratio)?;
    }

    buf = compressor.apply(&buf)?;

    debug_assert!(buf.is_finite(), "pipeline produced non-finite samples");
    Ok(buf)
}

/// Decode `source` and process it.
pub fn render<D: Decoder, P: AudioProcessor>(
    decoder: &D,
    source: &Path,
    params: &EffectParameters,
    processor: &P,
) -> Result<SampleBuffer> {
    let input = decoder.decode(source)?;
    process(&input, params, processor)
}

/// Render and persist: the processed audio goes to `destination` and the
/// project sidecar next to it. Nothing is written if rendering fails.
pub fn render_to<D: Decoder, P: AudioProcessor, W: BufferWriter>(
    decoder: &D,
    source: &Path,
    params: &EffectParameters,
    processor: &P,
    writer: &W,
    destination: &Path,
) -> Result<SamplerProjectData> {
    let output = render(decoder, source, params, processor)?;
    commit(writer, &output, params, destination)
}

/// Write a processed buffer and its sidecar.
///
/// The sidecar is staged first, then the audio is committed, then the staged
/// sidecar is renamed into place. If any step fails the previous asset is put
/// back and no sidecar change is visible. Records for other assets in the
/// same directory's sidecar are kept.
pub fn commit<W: BufferWriter>(
    writer: &W,
    output: &SampleBuffer,
    params: &EffectParameters,
    destination: &Path,
) -> Result<SamplerProjectData> {
    let name = destination
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            FxError::config(format!("invalid destination {}", destination.display()))
        })?;

    let sidecar = sidecar_path(destination);
    let project = load_sidecar(&sidecar)
        .merge(SamplerProjectData::from_parameters(name, output, params));

    let staged = temp_path(&sidecar);
    if let Err(e) = fs::write(&staged, project.to_json_string()?) {
        let _ = fs::remove_file(&staged);
        return Err(e.into());
    }

    let backup = backup_path(destination);
    let had_previous = destination.exists();
    if had_previous {
        if let Err(e) = fs::rename(destination, &backup) {
            let _ = fs::remove_file(&staged);
            return Err(e.into());
        }
    }

    let result = writer
        .commit(output, destination)
        .and_then(|()| Ok(fs::rename(&staged, &sidecar)?));

    match result {
        Ok(()) => {
            if had_previous {
                let _ = fs::remove_file(&backup);
            }
            info!("wrote project sidecar {}", sidecar.display());
            Ok(project)
        }
        Err(e) => {
            warn!("commit of {} failed, restoring: {e}", destination.display());
            let _ = fs::remove_file(&staged);
            if had_previous {
                fs::rename(&backup, destination)?;
            } else {
                let _ = fs::remove_file(destination);
            }
            Err(e)
        }
    }
}

/// Existing sidecar next to the asset, or an empty project.
fn load_sidecar(sidecar: &Path) -> SamplerProjectData {
    if !sidecar.exists() {
        return SamplerProjectData::default();
    }
    SamplerProjectData::read(sidecar).unwrap_or_else(|e| {
        warn!("replacing unreadable sidecar {}: {e}", sidecar.display());
        SamplerProjectData::default()
    })
}

fn backup_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!("bak_{name}"))
}

/// Location of the sidecar for an asset written to `destination`.
pub fn sidecar_path(destination: &Path) -> PathBuf {
    destination.with_file_name(SIDECAR_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{WavDecoder, WavWriter};
    use crate::params::{CompressorParams, EnvelopeParams, EqBand, ReverbParams};
    use std::cell::Cell;

    /// Counts backend calls; pitch keeps length, stretch scales it.
    #[derive(Default)]
    struct CountingProcessor {
        pitch_calls: Cell<usize>,
        stretch_calls: Cell<usize>,
        fail: bool,
    }

    impl AudioProcessor for CountingProcessor {
        fn pitch_shift(&self, input: &SampleBuffer, _semitones: i32) -> Result<SampleBuffer> {
            self.pitch_calls.set(self.pitch_calls.get() + 1);
            if self.fail {
                return Err(FxError::processing("backend unavailable"));
            }
            Ok(input.clone())
        }

        fn time_stretch(&self, input: &SampleBuffer, tempo_ratio: f32) -> Result<SampleBuffer> {
            self.stretch_calls.set(self.stretch_calls.get() + 1);
            let frames = (input.frames() as f32 / tempo_ratio).round() as usize;
            let ch = input.channels() as usize;
            input.with_samples(vec![0.1; frames * ch])
        }
    }

    fn tone(frames: usize) -> SampleBuffer {
        let samples = (0..frames)
            .map(|i| (i as f32 * 0.03).sin() * 0.5)
            .collect();
        SampleBuffer::mono(samples, 44100).unwrap()
    }

    #[test]
    fn neutral_parameters_are_identity() {
        let input = tone(4000);
        let backend = CountingProcessor::default();
        let out = process(&input, &EffectParameters::default(), &backend).unwrap();
        assert_eq!(out, input);
        assert_eq!(backend.pitch_calls.get(), 0);
        assert_eq!(backend.stretch_calls.get(), 0);
    }

    #[test]
    fn non_finite_input_comes_out_finite() {
        let input =
            SampleBuffer::mono(vec![0.2, f32::NAN, f32::INFINITY, -0.3], 44100).unwrap();
        let out = process(&input, &EffectParameters::default(), &CountingProcessor::default())
            .unwrap();
        assert!(out.is_finite());
        assert_eq!(out.samples()[1], 0.0);
    }

    #[test]
    fn backend_called_once_per_requested_stage() {
        let backend = CountingProcessor::default();
        let params = EffectParameters {
            semitones: 3,
            tempo_ratio: 2.0,
            ..Default::default()
        };
        let out = process(&tone(4000), &params, &backend).unwrap();
        assert_eq!(backend.pitch_calls.get(), 1);
        assert_eq!(backend.stretch_calls.get(), 1);
        assert_eq!(out.frames(), 2000);

        let backend = CountingProcessor::default();
        let params = EffectParameters {
            semitones: -5,
            ..Default::default()
        };
        process(&tone(4000), &params, &backend).unwrap();
        assert_eq!(backend.pitch_calls.get(), 1);
        assert_eq!(backend.stretch_calls.get(), 0);
    }

    #[test]
    fn invalid_parameters_fail_before_processing() {
        let backend = CountingProcessor::default();
        let params = EffectParameters {
            semitones: 2,
            compressor: CompressorParams {
                ratio: 0.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = process(&tone(1000), &params, &backend).unwrap_err();
        assert!(matches!(err, FxError::Configuration(_)));
        assert_eq!(backend.pitch_calls.get(), 0);
    }

    #[test]
    fn backend_error_propagates_and_input_is_untouched() {
        let input = tone(2000);
        let snapshot = input.clone();
        let backend = CountingProcessor {
            fail: true,
            ..Default::default()
        };
        let params = EffectParameters {
            semitones: 7,
            tempo_ratio: 1.5,
            ..Default::default()
        };
        let err = process(&input, &params, &backend).unwrap_err();
        assert!(matches!(err, FxError::Processing(_)));
        assert_eq!(backend.stretch_calls.get(), 0);
        assert_eq!(input, snapshot);
    }

    #[test]
    fn full_chain_output_is_finite_and_bounded() {
        let backend = CountingProcessor::default();
        let params = EffectParameters {
            eq_bands: vec![EqBand::new(3, 6.0), EqBand::new(7, -6.0)],
            reverb: ReverbParams {
                wet: 0.4,
                ..Default::default()
            },
            envelope: EnvelopeParams::new(0.01, 0.02, 0.8, 0.02),
            compressor: CompressorParams {
                threshold_db: -12.0,
                ratio: 4.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let out = process(&tone(8000), &params, &backend).unwrap();
        assert_eq!(out.frames(), 8000);
        assert!(out.is_finite());
        assert!(out.samples().iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn render_to_writes_audio_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.wav");
        let destination = dir.path().join("out.wav");
        WavWriter.commit(&tone(3000), &source).unwrap();

        let params = EffectParameters {
            tempo_ratio: 1.5,
            ..Default::default()
        };
        let backend = CountingProcessor::default();
        let project = render_to(
            &WavDecoder,
            &source,
            &params,
            &backend,
            &WavWriter,
            &destination,
        )
        .unwrap();

        assert_eq!(WavDecoder.decode(&destination).unwrap().frames(), 2000);
        let stored = SamplerProjectData::read(&sidecar_path(&destination)).unwrap();
        assert_eq!(stored, project);
        assert_eq!(stored.to_parameters(), params);
    }

    #[test]
    fn failed_render_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.wav");
        let destination = dir.path().join("out.wav");
        WavWriter.commit(&tone(1000), &source).unwrap();

        let backend = CountingProcessor {
            fail: true,
            ..Default::default()
        };
        let params = EffectParameters {
            semitones: 1,
            ..Default::default()
        };
        let result = render_to(
            &WavDecoder,
            &source,
            &params,
            &backend,
            &WavWriter,
            &destination,
        );
        assert!(result.is_err());
        assert!(!destination.exists());
        assert!(!sidecar_path(&destination).exists());
    }

    #[test]
    fn unwritable_sidecar_leaves_asset_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.wav");
        fs::write(&destination, b"previous take").unwrap();
        fs::create_dir(temp_path(&sidecar_path(&destination))).unwrap();

        let result = commit(&WavWriter, &tone(500), &EffectParameters::default(), &destination);
        assert!(result.is_err());
        assert_eq!(fs::read(&destination).unwrap(), b"previous take");
        assert!(!sidecar_path(&destination).exists());
    }

    #[test]
    fn failed_sidecar_rename_restores_previous_asset() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.wav");
        fs::write(&destination, b"previous take").unwrap();
        // A directory in the sidecar's place makes the final rename fail.
        fs::create_dir(sidecar_path(&destination)).unwrap();

        let result = commit(&WavWriter, &tone(500), &EffectParameters::default(), &destination);
        assert!(result.is_err());
        assert_eq!(fs::read(&destination).unwrap(), b"previous take");
        assert!(!backup_path(&destination).exists());
        assert!(!temp_path(&sidecar_path(&destination)).exists());
    }

    #[test]
    fn renders_into_one_directory_share_the_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.wav");
        let second = dir.path().join("b.wav");
        let slow = EffectParameters {
            tempo_ratio: 0.5,
            ..Default::default()
        };
        let shifted = EffectParameters {
            semitones: 4,
            ..Default::default()
        };

        commit(&WavWriter, &tone(500), &slow, &first).unwrap();
        commit(&WavWriter, &tone(500), &shifted, &second).unwrap();

        let stored = SamplerProjectData::read(&sidecar_path(&first)).unwrap();
        assert_eq!(stored.audio_files.len(), 2);
        assert_eq!(stored.parameters_for("a.wav"), slow);
        assert_eq!(stored.parameters_for("b.wav"), shifted);
    }
}
