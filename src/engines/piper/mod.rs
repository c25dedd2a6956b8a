//! Piper text-to-speech engine.
//!
//! Piper voices are ONNX models with a JSON sidecar. This engine does not run
//! the model itself; it drives the `piper` command-line program, feeding text
//! on stdin and reading raw 16-bit PCM from stdout.
//!
//! # System Requirements
//!
//! **piper** must be installed and on `PATH` (or passed explicitly through
//! [`PiperModelParams::bin_path`]). Releases: <https://github.com/rhasspy/piper/releases>
//!
//! # Model Directory Layout
//!
//! ```text
//! en_GB-southern_english_female-low/
//! ├── en_GB-southern_english_female-low.onnx        # voice model
//! └── en_GB-southern_english_female-low.onnx.json   # sample rate, speakers
//! ```
//!
//! The [`cache`](crate::cache) module downloads both files.
//!
//! # Examples
//!
//! ```rust,no_run
//! use robovoice::{SynthesisEngine, engines::piper::{PiperEngine, PiperInferenceParams}};
//! use std::path::PathBuf;
//!
//! let mut engine = PiperEngine::new();
//! engine.load_model(&PathBuf::from("voices/en_GB-southern_english_female-low.onnx"))?;
//!
//! let params = PiperInferenceParams {
//!     length_scale: Some(1.2),
//!     ..Default::default()
//! };
//! engine.synthesize_to_file("Hello there.", &PathBuf::from("out.wav"), Some(params))?;
//! # Ok::<(), robovoice::BoxError>(())
//! ```

pub mod config;
pub mod engine;

pub use config::VoiceConfig;
pub use engine::{PiperEngine, PiperError, PiperInferenceParams, PiperModelParams};
