pub mod buffer;
pub mod codec;
pub mod dsp;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod processor;
pub mod project;
#[cfg(feature = "runtime")]
pub mod task;

pub use crate::buffer::SampleBuffer;
pub use crate::error::FxError;
pub use crate::params::EffectParameters;
pub use crate::processor::{AudioProcessor, PhaseVocoderProcessor};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the samplefx-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: run interleaved f32 samples through the effect chain.
/// `params` is an `EffectParameters` object (camelCase keys, all optional).
#[wasm_bindgen]
pub fn process_samples(
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    params: JsValue,
) -> Result<Vec<f32>, JsValue> {
    let params: EffectParameters =
        serde_wasm_bindgen::from_value(params).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let input = SampleBuffer::new(samples, sample_rate, channels)
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let output = pipeline::process(&input, &params, &PhaseVocoderProcessor::new())
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(output.into_samples())
}
