use crate::{BoxError, SynthesisEngine};

use super::chain::{ChainReport, PipelineError, StageChain};

#[derive(thiserror::Error, Debug)]
pub enum SpeakError {
    #[error("Nothing to say")]
    EmptyInput,
    #[error("Synthesis failed: {0}")]
    Synthesis(#[source] BoxError),
    #[error("Failed to encode audio: {0}")]
    Encode(#[from] hound::Error),
    #[error("Audio pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Something that turns text into audible speech, synchronously.
pub trait Speak {
    /// Returns once playback has finished or failed. Callable again right
    /// after an error.
    fn speak(&mut self, text: &str) -> Result<(), SpeakError>;
}

/// Synthesizes with `E` and plays through a [`StageChain`].
pub struct Speaker<E: SynthesisEngine> {
    engine: E,
    chain: StageChain,
    params: Option<E::SynthesisParams>,
}

impl<E: SynthesisEngine> Speaker<E> {
    pub fn new(engine: E, chain: StageChain) -> Self {
        Self {
            engine,
            chain,
            params: None,
        }
    }

    /// Parameters passed to every synthesis call.
    pub fn with_params(mut self, params: E::SynthesisParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn chain(&self) -> &StageChain {
        &self.chain
    }

    /// Like [`Speak::speak`] but reports what went through the chain.
    pub fn speak_with_report(&mut self, text: &str) -> Result<ChainReport, SpeakError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeakError::EmptyInput);
        }

        let result = self
            .engine
            .synthesize(text, self.params.clone())
            .map_err(SpeakError::Synthesis)?;
        log::debug!(
            "Synthesized {:.2}s of audio at {} Hz",
            result.duration_secs(),
            result.sample_rate
        );
        let audio = result.to_wav_buffer()?;
        drop(result);

        Ok(self.chain.run(audio.as_bytes())?)
    }
}

impl<E: SynthesisEngine> Speak for Speaker<E> {
    fn speak(&mut self, text: &str) -> Result<(), SpeakError> {
        self.speak_with_report(text).map(|_| ())
    }
}
