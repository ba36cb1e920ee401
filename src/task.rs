//! Background rendering on the tokio blocking pool.
//!
//! Cancellation is coarse: the flag is checked before decoding, after
//! processing, and again before anything is written. A cancelled task never
//! commits, so the destination keeps whatever it held before.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use tokio::task::JoinHandle;

use crate::buffer::SampleBuffer;
use crate::codec::{BufferWriter, Decoder};
use crate::error::{FxError, Result};
use crate::params::EffectParameters;
use crate::pipeline;
use crate::processor::AudioProcessor;
use crate::project::SamplerProjectData;

pub struct RenderTask {
    handle: JoinHandle<Result<SampleBuffer>>,
    cancelled: Arc<AtomicBool>,
    params: EffectParameters,
}

/// Cancels a [`RenderTask`] from elsewhere, including while its `join` or
/// `commit` is being awaited.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl RenderTask {
    /// Start rendering `source` on a blocking worker.
    pub fn spawn<D, P>(
        decoder: D,
        source: PathBuf,
        params: EffectParameters,
        processor: P,
    ) -> Self
    where
        D: Decoder + Send + 'static,
        P: AudioProcessor + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let job_params = params.clone();

        let handle = tokio::task::spawn_blocking(move || {
            if flag.load(Ordering::Acquire) {
                return Err(FxError::Cancelled);
            }
            debug!("render started: {}", source.display());
            let output = pipeline::render(&decoder, &source, &job_params, &processor)?;
            if flag.load(Ordering::Acquire) {
                debug!("render cancelled: {}", source.display());
                return Err(FxError::Cancelled);
            }
            Ok(output)
        });

        RenderTask {
            handle,
            cancelled,
            params,
        }
    }

    /// Request cancellation. The running stage finishes but its result is
    /// discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancelled.clone())
    }

    /// Wait for the rendered buffer without writing it.
    pub async fn join(self) -> Result<SampleBuffer> {
        let output = self
            .handle
            .await
            .map_err(|e| FxError::processing(format!("render task failed: {e}")))??;
        if self.cancelled.load(Ordering::Acquire) {
            return Err(FxError::Cancelled);
        }
        Ok(output)
    }

    /// Wait for the render and write the audio plus sidecar to
    /// `destination`. Returns [`FxError::Cancelled`] without touching the
    /// filesystem if the task was cancelled.
    pub async fn commit<W: BufferWriter>(
        self,
        writer: &W,
        destination: &Path,
    ) -> Result<SamplerProjectData> {
        let params = self.params.clone();
        let output = self.join().await?;
        let project = pipeline::commit(writer, &output, &params, destination)?;
        info!("render committed: {}", destination.display());
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{WavDecoder, WavWriter};
    use crate::processor::PhaseVocoderProcessor;

    struct MemoryDecoder(SampleBuffer);

    impl Decoder for MemoryDecoder {
        fn decode(&self, _source: &Path) -> Result<SampleBuffer> {
            Ok(self.0.clone())
        }
    }

    fn clip() -> SampleBuffer {
        let samples = (0..8000).map(|i| (i as f32 * 0.02).sin() * 0.4).collect();
        SampleBuffer::mono(samples, 16000).unwrap()
    }

    #[tokio::test]
    async fn commit_writes_rendered_audio() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.wav");
        let params = EffectParameters {
            tempo_ratio: 2.0,
            ..Default::default()
        };

        let task = RenderTask::spawn(
            MemoryDecoder(clip()),
            PathBuf::from("clip.wav"),
            params,
            PhaseVocoderProcessor::new(),
        );
        task.commit(&WavWriter, &destination).await.unwrap();

        let written = WavDecoder.decode(&destination).unwrap();
        assert_eq!(written.frames(), 4000);
        assert!(pipeline::sidecar_path(&destination).exists());
    }

    #[tokio::test]
    async fn cancelled_task_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.wav");
        std::fs::write(&destination, b"previous take").unwrap();

        let task = RenderTask::spawn(
            MemoryDecoder(clip()),
            PathBuf::from("clip.wav"),
            EffectParameters::default(),
            PhaseVocoderProcessor::new(),
        );
        task.cancel();
        assert!(task.is_cancelled());

        let result = task.commit(&WavWriter, &destination).await;
        assert!(matches!(result, Err(FxError::Cancelled)));
        assert_eq!(std::fs::read(&destination).unwrap(), b"previous take");
        assert!(!pipeline::sidecar_path(&destination).exists());
    }

    /// Blocks in `decode` until released, so cancellation lands mid-render.
    struct GatedDecoder {
        clip: SampleBuffer,
        gate: std::sync::mpsc::Receiver<()>,
    }

    impl Decoder for GatedDecoder {
        fn decode(&self, _source: &Path) -> Result<SampleBuffer> {
            let _ = self.gate.recv();
            Ok(self.clip.clone())
        }
    }

    #[tokio::test]
    async fn cancel_handle_works_while_commit_is_pending() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.wav");
        let (release, gate) = std::sync::mpsc::channel();

        let task = RenderTask::spawn(
            GatedDecoder { clip: clip(), gate },
            PathBuf::from("clip.wav"),
            EffectParameters::default(),
            PhaseVocoderProcessor::new(),
        );
        let handle = task.cancel_handle();
        let pending = tokio::spawn(async move { task.commit(&WavWriter, &destination).await });

        handle.cancel();
        assert!(handle.is_cancelled());
        let _ = release.send(());

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(FxError::Cancelled)));
        assert!(!dir.path().join("out.wav").exists());
    }

    #[tokio::test]
    async fn render_errors_surface_through_join() {
        let task = RenderTask::spawn(
            WavDecoder,
            PathBuf::from("/nonexistent/input.wav"),
            EffectParameters::default(),
            PhaseVocoderProcessor::new(),
        );
        assert!(matches!(task.join().await, Err(FxError::Decode(_))));
    }
}
