use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::engine::PiperError;

/// The parts of a Piper `.onnx.json` sidecar this crate cares about.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioConfig,
    #[serde(default)]
    pub num_speakers: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

impl VoiceConfig {
    /// Read and validate a voice config file.
    pub fn load(path: &Path) -> Result<Self, PiperError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| PiperError::Config(format!("{}: {e}", path.display())))?;
        if config.audio.sample_rate == 0 {
            return Err(PiperError::Config(format!(
                "{}: sample_rate must be positive",
                path.display()
            )));
        }
        Ok(config)
    }

    pub fn speaker_count(&self) -> u32 {
        self.num_speakers.unwrap_or(1)
    }
}

/// Sidecar location for a model: `voice.onnx` → `voice.onnx.json`.
pub fn sidecar_path(model_path: &Path) -> PathBuf {
    let mut name = model_path.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}
