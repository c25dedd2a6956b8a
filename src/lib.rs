//! # robovoice
//!
//! On-demand Piper voice models and an effects-chain playback pipeline.
//!
//! ## Features
//!
//! - **Model cache**: resolves a language code to a voice model, downloads any
//!   missing files into a per-user cache and hands back the `.onnx` path
//! - **Synthesis engines**: a common [`SynthesisEngine`] trait with a Piper
//!   implementation that drives the external `piper` binary
//! - **Playback pipeline**: routes synthesized WAV audio through a chain of
//!   external processes (SoX effects) into a playback sink (`aplay`)
//!
//! ## Quick Start
//!
//! ```ignore
//! use robovoice::cache::{CacheSettingsBuilder, HttpSource, ModelCache, ModelCatalog};
//! use robovoice::engines::piper::PiperEngine;
//! use robovoice::pipeline::{Effect, Speak, Speaker, StageChain};
//! use robovoice::SynthesisEngine;
//!
//! let settings = CacheSettingsBuilder::default()
//!     .root(robovoice::cache::default_cache_root().unwrap())
//!     .build()?;
//! let source = HttpSource::new(&settings.user_agent)?;
//! let cache = ModelCache::new(ModelCatalog::builtin(), settings, source);
//! let model_path = cache.ensure_model("en")?;
//!
//! let mut engine = PiperEngine::new();
//! engine.load_model(&model_path)?;
//!
//! let chain = StageChain::with_effect(Effect::Droid);
//! let mut speaker = Speaker::new(engine, chain);
//! speaker.speak("Hello, world!")?;
//! # Ok::<(), robovoice::BoxError>(())
//! ```

pub mod cache;
pub mod engines;
pub mod pipeline;
pub mod session;

use std::io::Cursor;
use std::path::Path;

/// Boxed error returned by synthesis engines.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The result of a synthesis (text-to-speech) operation.
///
/// Contains raw f32 audio samples and the sample rate of the output audio.
#[derive(Debug)]
pub struct SynthesisResult {
    /// Raw audio samples as f32 values in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    /// Sample rate of the audio (taken from the voice config for Piper)
    pub sample_rate: u32,
}

impl SynthesisResult {
    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Encode the audio as an in-memory 16-bit PCM WAV.
    ///
    /// PCM16 is what SoX and `aplay` accept on every platform, so this is the
    /// format handed to the playback pipeline.
    pub fn to_wav_buffer(&self) -> Result<AudioBuffer, hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &sample in &self.samples {
                let clamped = sample.clamp(-1.0, 1.0);
                writer.write_sample((clamped * i16::MAX as f32) as i16)?;
            }
            writer.finalize()?;
        }
        Ok(AudioBuffer(cursor.into_inner()))
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// One complete encoded waveform, ready to be written into a stage chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer(Vec<u8>);

impl AudioBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Common interface for text-to-speech synthesis engines.
///
/// This trait defines the standard operations that all synthesis engines must support.
/// Each engine may have different parameter types for model loading and inference configuration.
pub trait SynthesisEngine {
    /// Parameters for configuring inference behavior (speaker, speed, etc.)
    type SynthesisParams: Clone;
    /// Parameters for configuring model loading (binary location, etc.)
    type ModelParams: Default;

    /// Load a model from the specified path using default parameters.
    fn load_model(&mut self, model_path: &Path) -> Result<(), BoxError> {
        self.load_model_with_params(model_path, Self::ModelParams::default())
    }

    /// Load a model from the specified path with custom parameters.
    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), BoxError>;

    /// Unload the currently loaded model and free associated resources.
    fn unload_model(&mut self);

    /// Synthesize speech from the given text.
    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisResult, BoxError>;

    /// Synthesize speech from the given text and write to a WAV file.
    ///
    /// Default implementation calls `synthesize()` then `SynthesisResult::write_wav()`.
    fn synthesize_to_file(
        &mut self,
        text: &str,
        wav_path: &Path,
        params: Option<Self::SynthesisParams>,
    ) -> Result<(), BoxError> {
        self.synthesize(text, params)?.write_wav(wav_path)?;
        Ok(())
    }
}
