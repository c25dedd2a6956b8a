//! Speech synthesis engines.
//!
//! This module contains implementations of text-to-speech engines.
//!
//! # Available Engines
//!
//! - `piper` - Piper TTS (ONNX voices, `piper` binary required)

pub mod piper;
