//! DSP stages for offline buffer processing.
//!
//! Each stage is built from validated parameters and never mutates its
//! input. The same code runs natively and in WASM.

pub mod compressor;
pub mod envelope;
pub mod equalizer;
pub mod filter;
pub mod reverb;
pub mod vocoder;
