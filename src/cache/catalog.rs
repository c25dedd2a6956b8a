use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// File name suffix that marks the loadable model among a descriptor's files.
pub const PRIMARY_SUFFIX: &str = ".onnx";

const PIPER_VOICES: &str = "https://huggingface.co/rhasspy/piper-voices/resolve/main";
const POLISH_VOICES: &str = "https://huggingface.co/WitoldG/polish_piper_models/resolve/main";

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("I/O error reading catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Catalog is empty")]
    Empty,
}

/// A single file a voice model needs, with the URL it is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredFile {
    pub name: String,
    pub url: String,
}

impl RequiredFile {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// True for the loadable model file (as opposed to its metadata).
    pub fn is_primary(&self) -> bool {
        self.name.ends_with(PRIMARY_SUFFIX)
    }
}

/// A named voice model and the files it is made of, in download order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Canonical model name; namespaces the cache directory.
    pub name: String,
    pub files: Vec<RequiredFile>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, files: Vec<RequiredFile>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }

    /// The primary artifact, if the descriptor lists one.
    ///
    /// When several files carry the primary suffix the first one in declared
    /// order wins.
    pub fn primary(&self) -> Option<&RequiredFile> {
        let mut primaries = self.files.iter().filter(|f| f.is_primary());
        let first = primaries.next();
        if let Some(extra) = primaries.next() {
            log::warn!(
                "Model '{}' lists more than one {PRIMARY_SUFFIX} file; using '{}' and ignoring '{}'",
                self.name,
                first.map(|f| f.name.as_str()).unwrap_or_default(),
                extra.name
            );
        }
        first
    }
}

/// Immutable mapping from language code to voice model.
///
/// Built once at startup and handed to [`ModelCache`](super::ModelCache);
/// nothing in the crate mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelDescriptor>,
}

impl ModelCatalog {
    pub fn new(models: impl IntoIterator<Item = (String, ModelDescriptor)>) -> Self {
        Self {
            models: models.into_iter().collect(),
        }
    }

    /// The voices shipped with the crate: British English and Polish.
    pub fn builtin() -> Self {
        let en = "en_GB-southern_english_female-low";
        let pl = "pl_PL-meski_wg_glos-medium";
        let en_base = format!("{PIPER_VOICES}/en/en_GB/southern_english_female/low");

        Self::new([
            (
                "en".to_string(),
                ModelDescriptor::new(
                    en,
                    vec![
                        RequiredFile::new(format!("{en}.onnx"), format!("{en_base}/{en}.onnx")),
                        RequiredFile::new(
                            format!("{en}.onnx.json"),
                            format!("{en_base}/{en}.onnx.json"),
                        ),
                    ],
                ),
            ),
            (
                "pl".to_string(),
                ModelDescriptor::new(
                    pl,
                    vec![
                        RequiredFile::new(format!("{pl}.onnx"), format!("{POLISH_VOICES}/{pl}.onnx")),
                        RequiredFile::new(
                            format!("{pl}.onnx.json"),
                            format!("{POLISH_VOICES}/{pl}.onnx.json"),
                        ),
                    ],
                ),
            ),
        ])
    }

    /// Load a catalog from a JSON object of the form
    /// `{"<lang>": {"name": "...", "files": [{"name": "...", "url": "..."}]}}`.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(content)?;
        if catalog.models.is_empty() {
            return Err(CatalogError::Empty);
        }
        log::info!("Loaded catalog with {} languages", catalog.models.len());
        Ok(catalog)
    }

    pub fn get(&self, language: &str) -> Option<&ModelDescriptor> {
        self.models.get(language)
    }

    /// Language codes in sorted order.
    pub fn languages(&self) -> Vec<&str> {
        self.models.keys().map(|s| s.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelDescriptor)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }
}
