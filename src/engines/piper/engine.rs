use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::{BoxError, SynthesisEngine, SynthesisResult};

use super::config::{sidecar_path, VoiceConfig};

#[derive(thiserror::Error, Debug)]
pub enum PiperError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "piper not found. Download a release from https://github.com/rhasspy/piper/releases \
         and put it on PATH"
    )]
    PiperNotFound,
    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),
    #[error("Model not loaded. Call load_model() first.")]
    ModelNotLoaded,
    #[error("Invalid voice config: {0}")]
    Config(String),
    #[error("Speaker {speaker} out of range; voice has {available} speaker(s)")]
    SpeakerOutOfRange { speaker: u32, available: u32 },
}

/// Parameters for configuring Piper model loading.
#[derive(Debug, Clone, Default)]
pub struct PiperModelParams {
    /// Path to the `piper` executable. `None` looks it up on PATH.
    pub bin_path: Option<PathBuf>,
    /// Voice config location. `None` uses `<model>.json` next to the model.
    pub config_path: Option<PathBuf>,
}

/// Parameters for configuring a Piper synthesis request.
#[derive(Debug, Clone, Default)]
pub struct PiperInferenceParams {
    /// Speaker id for multi-speaker voices.
    pub speaker: Option<u32>,
    /// Phoneme length multiplier; above 1.0 is slower.
    pub length_scale: Option<f32>,
    /// Seconds of silence after each sentence.
    pub sentence_silence: Option<f32>,
}

struct LoadedVoice {
    model_path: PathBuf,
    config_path: PathBuf,
    config: VoiceConfig,
}

/// Piper text-to-speech engine.
///
/// One `piper` process is started per [`synthesize`](SynthesisEngine::synthesize)
/// call; the whole utterance is collected before returning.
pub struct PiperEngine {
    voice: Option<LoadedVoice>,
    bin_path: PathBuf,
}

impl Default for PiperEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PiperEngine {
    /// Create a new engine that uses `piper` from PATH.
    pub fn new() -> Self {
        Self {
            voice: None,
            bin_path: PathBuf::from("piper"),
        }
    }

    /// Sample rate of the loaded voice.
    pub fn sample_rate(&self) -> Option<u32> {
        self.voice.as_ref().map(|v| v.config.audio.sample_rate)
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.voice.as_ref().map(|v| v.model_path.as_path())
    }

    fn command(&self, voice: &LoadedVoice, params: &PiperInferenceParams) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.arg("--model")
            .arg(&voice.model_path)
            .arg("--config")
            .arg(&voice.config_path)
            .arg("--output-raw")
            .arg("--quiet");
        if let Some(speaker) = params.speaker {
            cmd.arg("--speaker").arg(speaker.to_string());
        }
        if let Some(scale) = params.length_scale {
            cmd.arg("--length_scale").arg(format!("{scale:.3}"));
        }
        if let Some(silence) = params.sentence_silence {
            cmd.arg("--sentence_silence").arg(format!("{silence:.3}"));
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Drop for PiperEngine {
    fn drop(&mut self) {
        self.unload_model();
    }
}

impl SynthesisEngine for PiperEngine {
    type SynthesisParams = PiperInferenceParams;
    type ModelParams = PiperModelParams;

    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), BoxError> {
        if !model_path.is_file() {
            return Err(PiperError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Voice model not found at {}", model_path.display()),
            ))
            .into());
        }
        let config_path = params
            .config_path
            .unwrap_or_else(|| sidecar_path(model_path));
        let config = VoiceConfig::load(&config_path)?;
        log::info!(
            "Loaded Piper voice {} ({} Hz, {} speaker(s))",
            model_path.display(),
            config.audio.sample_rate,
            config.speaker_count()
        );

        if let Some(bin) = params.bin_path {
            self.bin_path = bin;
        }
        self.voice = Some(LoadedVoice {
            model_path: model_path.to_path_buf(),
            config_path,
            config,
        });
        Ok(())
    }

    fn unload_model(&mut self) {
        self.voice = None;
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisResult, BoxError> {
        let voice = self.voice.as_ref().ok_or(PiperError::ModelNotLoaded)?;
        let p = params.unwrap_or_default();
        if let Some(speaker) = p.speaker {
            let available = voice.config.speaker_count();
            if speaker >= available {
                return Err(PiperError::SpeakerOutOfRange { speaker, available }.into());
            }
        }

        let pcm = run_piper(self.command(voice, &p), text)?;
        Ok(SynthesisResult {
            samples: pcm_to_samples(&pcm),
            sample_rate: voice.config.audio.sample_rate,
        })
    }
}

/// Run one piper process and collect its raw PCM output.
///
/// stdin is written from a scoped thread while stdout is drained here, so a
/// long utterance cannot stall on a full pipe in either direction.
fn run_piper(mut cmd: Command, text: &str) -> Result<Vec<u8>, PiperError> {
    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PiperError::PiperNotFound
        } else {
            PiperError::Io(e)
        }
    })?;

    let payload = single_line(text);
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (pcm, errors) = std::thread::scope(|s| {
        let writer = s.spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(payload.as_bytes())?;
            }
            Ok(())
        });
        let err_reader = s.spawn(move || {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf);
            }
            buf
        });

        let mut pcm = Vec::new();
        let read = match stdout {
            Some(mut out) => out.read_to_end(&mut pcm).map(|_| ()),
            None => Ok(()),
        };
        let written = writer.join().unwrap_or(Ok(()));
        let errors = err_reader.join().unwrap_or_default();
        (read.and(written).map(|_| pcm), errors)
    });

    let status = child.wait()?;
    if !status.success() {
        return Err(PiperError::SynthesisFailed(format!(
            "piper exited with code {:?}: {}",
            status.code(),
            errors.trim()
        )));
    }

    // A broken pipe on stdin with a clean exit still means no audio for us.
    let pcm = pcm.map_err(PiperError::Io)?;
    if pcm.is_empty() {
        return Err(PiperError::SynthesisFailed("piper produced no audio".into()));
    }
    Ok(pcm)
}

/// piper treats every input line as an utterance; fold the text into one.
fn single_line(text: &str) -> String {
    let mut line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    line.push('\n');
    line
}

fn pcm_to_samples(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect()
}
