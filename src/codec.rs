//! Decoder and writer collaborators.
//!
//! The pipeline itself never touches the filesystem; these traits are the
//! seams where decoded audio comes in and processed audio goes out. Writers
//! commit atomically: everything is written to a temporary file next to the
//! destination and renamed over it only once complete, so a failed or
//! cancelled render never leaves a half-written asset behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::buffer::SampleBuffer;
use crate::error::{FxError, Result};

/// Turns a source file into a decoded buffer.
pub trait Decoder {
    fn decode(&self, source: &Path) -> Result<SampleBuffer>;
}

/// Persists a processed buffer.
pub trait BufferWriter {
    fn commit(&self, buffer: &SampleBuffer, destination: &Path) -> Result<()>;
}

impl<D: Decoder + ?Sized> Decoder for &D {
    fn decode(&self, source: &Path) -> Result<SampleBuffer> {
        (**self).decode(source)
    }
}

impl<W: BufferWriter + ?Sized> BufferWriter for &W {
    fn commit(&self, buffer: &SampleBuffer, destination: &Path) -> Result<()> {
        (**self).commit(buffer, destination)
    }
}

// ── WAV ─────────────────────────────────────────────────────

/// Reads integer (8–32 bit) and 32-bit float WAV files.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl Decoder for WavDecoder {
    fn decode(&self, source: &Path) -> Result<SampleBuffer> {
        let fail = |e: hound::Error| FxError::decode(format!("{}: {e}", source.display()));

        let reader = hound::WavReader::open(source).map_err(fail)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(fail)?,
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(fail)?
            }
        };

        debug!(
            "decoded {} ({} Hz, {} ch, {} samples)",
            source.display(),
            spec.sample_rate,
            spec.channels,
            samples.len()
        );
        decoded_buffer(source, samples, spec.sample_rate, spec.channels)
    }
}

/// A file whose header yields an unusable layout is a decode failure, not a
/// caller configuration error.
fn decoded_buffer(
    source: &Path,
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
) -> Result<SampleBuffer> {
    SampleBuffer::new(samples, sample_rate, channels)
        .map_err(|e| FxError::decode(format!("{}: {e}", source.display())))
}

/// Writes 32-bit float WAV files atomically.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavWriter;

impl BufferWriter for WavWriter {
    fn commit(&self, buffer: &SampleBuffer, destination: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: buffer.channels(),
            sample_rate: buffer.sample_rate(),
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        write_atomically(destination, |tmp| {
            let mut writer = hound::WavWriter::create(tmp, spec).map_err(encode_error)?;
            for &s in buffer.samples() {
                writer.write_sample(s).map_err(encode_error)?;
            }
            writer.finalize().map_err(encode_error)
        })?;

        info!(
            "wrote {} ({:.2} s)",
            destination.display(),
            buffer.duration_seconds()
        );
        Ok(())
    }
}

fn encode_error(e: hound::Error) -> FxError {
    match e {
        hound::Error::IoError(io) => FxError::Io(io),
        other => FxError::Io(io::Error::other(other)),
    }
}

// ── MP3 ─────────────────────────────────────────────────────

/// Decodes MP3 files into interleaved floats.
#[cfg(feature = "mp3")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Mp3Decoder;

#[cfg(feature = "mp3")]
impl Decoder for Mp3Decoder {
    fn decode(&self, source: &Path) -> Result<SampleBuffer> {
        let file = fs::File::open(source)
            .map_err(|e| FxError::decode(format!("{}: {e}", source.display())))?;
        let mut decoder = minimp3::Decoder::new(file);

        let mut samples = Vec::new();
        let mut format: Option<(u32, u16)> = None;
        loop {
            match decoder.next_frame() {
                Ok(frame) => {
                    let this = (frame.sample_rate as u32, frame.channels as u16);
                    match format {
                        None => format = Some(this),
                        Some(f) if f != this => {
                            return Err(FxError::decode(format!(
                                "{}: stream changes format mid-file",
                                source.display()
                            )));
                        }
                        Some(_) => {}
                    }
                    samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
                }
                Err(minimp3::Error::Eof) => break,
                Err(minimp3::Error::SkippedData) => continue,
                Err(e) => {
                    return Err(FxError::decode(format!("{}: {e:?}", source.display())));
                }
            }
        }

        let Some((sample_rate, channels)) = format else {
            return Err(FxError::decode(format!(
                "{}: no audio frames",
                source.display()
            )));
        };
        decoded_buffer(source, samples, sample_rate, channels)
    }
}

/// Picks a decoder from the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDecoder;

impl Decoder for AutoDecoder {
    fn decode(&self, source: &Path) -> Result<SampleBuffer> {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("wav") | Some("wave") => WavDecoder.decode(source),
            #[cfg(feature = "mp3")]
            Some("mp3") => Mp3Decoder.decode(source),
            _ => Err(FxError::decode(format!(
                "{}: unsupported audio format",
                source.display()
            ))),
        }
    }
}

// ── Atomic replacement ──────────────────────────────────────

/// Temporary sibling used while `destination` is being written.
pub(crate) fn temp_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!("tmp_{name}"))
}

/// Run `write` against a temp file, then rename it over `destination`.
/// The temp file is removed if `write` fails.
pub(crate) fn write_atomically<F>(destination: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp = temp_path(destination);
    if let Err(e) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, destination).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })?;
    Ok(())
}
