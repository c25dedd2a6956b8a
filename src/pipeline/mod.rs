//! Synthesis-to-playback pipeline.
//!
//! ```text
//! text ─▶ SynthesisEngine ─▶ WAV bytes ─▶ stage 1 ─▶ … ─▶ stage n ─▶ sink
//! ```
//!
//! Every utterance is synthesized in full, encoded as WAV and written into
//! the first stage of a [`StageChain`]. The stages are separate processes
//! connected pipe to pipe, so audio starts playing as soon as the first
//! stage produces output. Every stage is started before the first byte is
//! written and reaped before [`Speak::speak`] returns.
//!
//! # Example
//!
//! ```rust,no_run
//! use robovoice::pipeline::{Effect, StageChain, StageSpec};
//!
//! // sox (deep voice) ─▶ aplay
//! let chain = StageChain::new(StageSpec::aplay()).stages(Effect::Deep.stages("sox"));
//! let wav = std::fs::read("hello.wav")?;
//! chain.run(&wav)?;
//! # Ok::<(), robovoice::BoxError>(())
//! ```

pub mod chain;
pub mod speaker;
pub mod stage;

pub use chain::{ChainReport, PipelineError, StageChain};
pub use speaker::{Speak, SpeakError, Speaker};
pub use stage::{Effect, StageSpec};
