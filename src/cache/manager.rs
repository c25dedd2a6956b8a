use std::fs;
use std::path::{Component, Path, PathBuf};

use derive_builder::Builder;

use super::catalog::{ModelCatalog, ModelDescriptor};
use super::download::{self, DownloadProgress, DOWNLOAD_CHUNK_SIZE};
use super::source::{DownloadError, ModelSource, TrustedHosts};

/// `User-Agent` sent with every model request.
pub const DEFAULT_USER_AGENT: &str = concat!("robovoice/", env!("CARGO_PKG_VERSION"));

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("Unknown language '{language}'. Available: {available}")]
    UnknownLanguage { language: String, available: String },
    #[error("Invalid or untrusted URL for {file}: {reason}")]
    InvalidSource {
        file: String,
        url: String,
        reason: String,
    },
    #[error("Unsafe path component '{0}' in catalog entry")]
    UnsafePath(String),
    #[error("No .onnx model file configured for model '{model}'")]
    MissingArtifact { model: String },
    #[error("Failed to download {file}: {source}")]
    Download {
        file: String,
        #[source]
        source: DownloadError,
    },
    #[error("Failed to prepare cache directory {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Configuration defects cannot be fixed by retrying; download failures can.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::Download { .. } | CacheError::Io { .. })
    }
}

/// Where and how models are cached.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct CacheSettings {
    /// Base directory; models land in `<root>/<language>/<model name>/`.
    pub root: PathBuf,
    #[builder(default = "DEFAULT_USER_AGENT.to_string()")]
    pub user_agent: String,
    #[builder(default = "DOWNLOAD_CHUNK_SIZE")]
    pub chunk_size: usize,
    #[builder(default)]
    pub trusted_hosts: TrustedHosts,
}

/// `<user cache dir>/robocrew/tts`, e.g. `~/.cache/robocrew/tts` on Linux.
pub fn default_cache_root() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("robocrew").join("tts"))
}

type ProgressFn = Box<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Resolves languages to ready-to-load model files.
pub struct ModelCache<S> {
    catalog: ModelCatalog,
    settings: CacheSettings,
    source: S,
    progress: ProgressFn,
}

impl<S: ModelSource> ModelCache<S> {
    pub fn new(catalog: ModelCatalog, settings: CacheSettings, source: S) -> Self {
        Self {
            catalog,
            settings,
            source,
            progress: Box::new(log_progress),
        }
    }

    /// Replace the default progress reporter (debug-level log lines).
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        self.progress = Box::new(progress);
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Cache directory for `language`, without touching the filesystem.
    pub fn model_dir(&self, language: &str) -> Result<PathBuf, CacheError> {
        let model = self.lookup(language)?;
        Ok(self
            .settings
            .root
            .join(safe_component(language)?)
            .join(safe_component(&model.name)?))
    }

    /// Make sure every file of `language`'s model is on disk and return the
    /// path of its primary artifact.
    ///
    /// Files that already exist with a non-zero size are left alone, so a
    /// call after a failed one picks up where the previous run stopped.
    pub fn ensure_model(&self, language: &str) -> Result<PathBuf, CacheError> {
        let model_dir = self.model_dir(language)?;
        let model = self.lookup(language)?;

        fs::create_dir_all(&model_dir).map_err(|source| CacheError::Io {
            path: model_dir.clone(),
            source,
        })?;

        for file in &model.files {
            let file_path = model_dir.join(safe_component(&file.name)?);
            if is_satisfied(&file_path) {
                log::info!("Found {}", file_path.display());
                continue;
            }

            let url = self
                .settings
                .trusted_hosts
                .check(&file.url)
                .map_err(|reason| CacheError::InvalidSource {
                    file: file.name.clone(),
                    url: file.url.clone(),
                    reason,
                })?;

            log::info!("Downloading {} ...", file.name);
            let bytes = self
                .source
                .open(&url)
                .and_then(|remote| {
                    download::stream_to_file(
                        remote,
                        &file_path,
                        self.settings.chunk_size,
                        self.progress.as_ref(),
                    )
                })
                .map_err(|source| CacheError::Download {
                    file: file.name.clone(),
                    source,
                })?;
            log::info!("Saved {} ({bytes} bytes) to {}", file.name, file_path.display());
        }

        let primary = model.primary().ok_or_else(|| CacheError::MissingArtifact {
            model: model.name.clone(),
        })?;
        Ok(model_dir.join(&primary.name))
    }

    fn lookup(&self, language: &str) -> Result<&ModelDescriptor, CacheError> {
        self.catalog
            .get(language)
            .ok_or_else(|| CacheError::UnknownLanguage {
                language: language.to_string(),
                available: self.catalog.languages().join(", "),
            })
    }
}

/// A cached file counts only when it exists and is non-empty.
fn is_satisfied(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Reject anything that is not a single plain path component.
fn safe_component(value: &str) -> Result<&str, CacheError> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.contains(['/', '\\']) => Ok(value),
        _ => Err(CacheError::UnsafePath(value.to_string())),
    }
}

fn log_progress(progress: &DownloadProgress) {
    if let Some(percent) = progress.percent() {
        log::debug!("{}: {percent}%", progress.file_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::catalog::RequiredFile;
    use crate::cache::download::part_path;
    use crate::cache::source::RemoteFile;
    use std::collections::HashMap;
    use std::io::{self, Cursor, Read};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use url::Url;

    const BASE: &str = "https://huggingface.co/test/resolve/main";

    /// Serves fixed payloads keyed by URL and counts requests.
    #[derive(Default)]
    struct FakeSource {
        files: HashMap<String, Vec<u8>>,
        requests: AtomicUsize,
        /// Cut the next transfer short after this many bytes.
        fail_once_after: Option<usize>,
        failed: AtomicBool,
    }

    impl FakeSource {
        fn serving(entries: Vec<(String, Vec<u8>)>) -> Self {
            Self {
                files: entries.into_iter().collect(),
                ..Default::default()
            }
        }

        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    struct Interrupted(Cursor<Vec<u8>>);

    impl Read for Interrupted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection dropped")),
                n => Ok(n),
            }
        }
    }

    impl ModelSource for &FakeSource {
        fn open(&self, url: &Url) -> Result<RemoteFile, DownloadError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let body = self
                .files
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| DownloadError::Status {
                    status: 404,
                    url: url.to_string(),
                })?;
            let len = body.len() as u64;

            if let Some(cut) = self.fail_once_after {
                if !self.failed.swap(true, Ordering::SeqCst) {
                    let partial = body[..cut.min(body.len())].to_vec();
                    return Ok(RemoteFile {
                        content_length: Some(len),
                        body: Box::new(Interrupted(Cursor::new(partial))),
                    });
                }
            }

            Ok(RemoteFile {
                content_length: Some(len),
                body: Box::new(Cursor::new(body)),
            })
        }
    }

    fn settings(root: &Path) -> CacheSettings {
        CacheSettingsBuilder::default()
            .root(root)
            .chunk_size(16usize)
            .build()
            .unwrap()
    }

    fn voice_catalog() -> ModelCatalog {
        ModelCatalog::new([(
            "xx".to_string(),
            ModelDescriptor::new(
                "xx-voice",
                vec![
                    RequiredFile::new("xx-voice.onnx", format!("{BASE}/xx-voice.onnx")),
                    RequiredFile::new("xx-voice.onnx.json", format!("{BASE}/xx-voice.onnx.json")),
                ],
            ),
        )])
    }

    fn voice_source() -> FakeSource {
        FakeSource::serving(vec![
            (format!("{BASE}/xx-voice.onnx"), vec![42u8; 100]),
            (
                format!("{BASE}/xx-voice.onnx.json"),
                br#"{"audio":{"sample_rate":16000}}"#.to_vec(),
            ),
        ])
    }

    #[test]
    fn unknown_language_lists_available_and_skips_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("cache");
        let source = voice_source();
        let cache = ModelCache::new(voice_catalog(), settings(&root), &source);

        let err = cache.ensure_model("fr").unwrap_err();
        match &err {
            CacheError::UnknownLanguage { language, available } => {
                assert_eq!(language, "fr");
                assert_eq!(available, "xx");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.is_retryable());
        assert!(!root.exists());
        assert_eq!(source.requests(), 0);
    }

    #[test]
    fn downloads_missing_files_in_declared_order() {
        let tmp = tempfile::tempdir().unwrap();
        let source = voice_source();
        let cache = ModelCache::new(voice_catalog(), settings(tmp.path()), &source);

        let path = cache.ensure_model("xx").expect("model should download");
        assert_eq!(path, tmp.path().join("xx").join("xx-voice").join("xx-voice.onnx"));
        assert_eq!(fs::read(&path).unwrap(), vec![42u8; 100]);
        assert_eq!(source.requests(), 2);
    }

    #[test]
    fn satisfied_cache_makes_no_requests() {
        let tmp = tempfile::tempdir().unwrap();
        let source = voice_source();
        let cache = ModelCache::new(voice_catalog(), settings(tmp.path()), &source);

        let first = cache.ensure_model("xx").unwrap();
        let second = cache.ensure_model("xx").unwrap();
        assert_eq!(first, second);
        assert_eq!(source.requests(), 2);
    }

    #[test]
    fn empty_file_is_downloaded_again() {
        let tmp = tempfile::tempdir().unwrap();
        let source = voice_source();
        let cache = ModelCache::new(voice_catalog(), settings(tmp.path()), &source);
        let dir = cache.model_dir("xx").unwrap();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("xx-voice.onnx"), b"").unwrap();
        fs::write(dir.join("xx-voice.onnx.json"), b"{}").unwrap();

        cache.ensure_model("xx").unwrap();
        assert_eq!(source.requests(), 1);
        assert_eq!(fs::metadata(dir.join("xx-voice.onnx")).unwrap().len(), 100);
        assert_eq!(fs::read(dir.join("xx-voice.onnx.json")).unwrap(), b"{}");
    }

    #[test]
    fn interrupted_download_resumes_from_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut source = voice_source();
        source.fail_once_after = Some(40);
        let cache = ModelCache::new(voice_catalog(), settings(tmp.path()), &source);
        let onnx = cache.model_dir("xx").unwrap().join("xx-voice.onnx");

        let err = cache.ensure_model("xx").unwrap_err();
        assert!(matches!(err, CacheError::Download { ref file, .. } if file == "xx-voice.onnx"));
        assert!(err.is_retryable());
        assert!(!onnx.exists());
        assert_eq!(fs::metadata(part_path(&onnx)).unwrap().len(), 40);
        assert!(!onnx.with_file_name("xx-voice.onnx.json").exists());

        let path = cache.ensure_model("xx").expect("retry should succeed");
        assert_eq!(path, onnx);
        assert_eq!(fs::read(&onnx).unwrap(), vec![42u8; 100]);
    }

    #[test]
    fn untrusted_url_aborts_before_later_files() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::new([(
            "xx".to_string(),
            ModelDescriptor::new(
                "xx-voice",
                vec![
                    RequiredFile::new("present.onnx.json", format!("{BASE}/present.onnx.json")),
                    RequiredFile::new("bad.onnx", "https://mirror.example.com/bad.onnx"),
                    RequiredFile::new("later.bin", format!("{BASE}/later.bin")),
                ],
            ),
        )]);
        let source = FakeSource::serving(vec![(format!("{BASE}/later.bin"), b"later".to_vec())]);
        let cache = ModelCache::new(catalog, settings(tmp.path()), &source);
        let dir = cache.model_dir("xx").unwrap();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("present.onnx.json"), b"{}").unwrap();

        let err = cache.ensure_model("xx").unwrap_err();
        match &err {
            CacheError::InvalidSource { file, .. } => assert_eq!(file, "bad.onnx"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("bad.onnx"));
        assert!(!err.is_retryable());
        assert_eq!(source.requests(), 0);
        assert!(dir.join("present.onnx.json").exists());
        assert!(!dir.join("bad.onnx").exists());
        assert!(!dir.join("later.bin").exists());
    }

    #[test]
    fn descriptor_without_primary_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::new([(
            "xx".to_string(),
            ModelDescriptor::new(
                "xx-voice",
                vec![RequiredFile::new("xx-voice.onnx.json", format!("{BASE}/xx-voice.onnx.json"))],
            ),
        )]);
        let source = voice_source();
        let cache = ModelCache::new(catalog, settings(tmp.path()), &source);

        let err = cache.ensure_model("xx").unwrap_err();
        assert!(matches!(err, CacheError::MissingArtifact { ref model } if model == "xx-voice"));
    }

    #[test]
    fn path_traversal_in_catalog_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::new([(
            "xx".to_string(),
            ModelDescriptor::new(
                "../escape",
                vec![RequiredFile::new("x.onnx", format!("{BASE}/x.onnx"))],
            ),
        )]);
        let source = voice_source();
        let cache = ModelCache::new(catalog, settings(tmp.path()), &source);

        assert!(matches!(
            cache.ensure_model("xx"),
            Err(CacheError::UnsafePath(ref p)) if p == "../escape"
        ));
    }

    #[test]
    fn missing_remote_file_is_a_download_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FakeSource::default();
        let cache = ModelCache::new(voice_catalog(), settings(tmp.path()), &source);

        let err = cache.ensure_model("xx").unwrap_err();
        assert!(matches!(
            err,
            CacheError::Download { source: DownloadError::Status { status: 404, .. }, .. }
        ));
    }

    #[test]
    fn builtin_english_model_lands_two_files() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::builtin();
        let en = catalog.get("en").unwrap().clone();
        let payloads: Vec<(String, Vec<u8>)> = en
            .files
            .iter()
            .map(|f| (f.url.clone(), f.name.as_bytes().to_vec()))
            .collect();
        let source = FakeSource::serving(payloads);
        let progressed = std::sync::Arc::new(AtomicUsize::new(0));
        let seen = progressed.clone();
        let cache = ModelCache::new(catalog, settings(tmp.path()), &source)
            .with_progress(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });

        let path = cache.ensure_model("en").unwrap();
        assert!(path.ends_with("en_GB-southern_english_female-low.onnx"));

        let dir = tmp.path().join("en").join(&en.name);
        let entries: Vec<_> = fs::read_dir(&dir).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|p| fs::metadata(p).unwrap().len() > 0));
        assert!(progressed.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn safe_component_accepts_only_plain_names() {
        assert!(safe_component("en_GB-voice.onnx").is_ok());
        assert!(safe_component("..").is_err());
        assert!(safe_component("a/b").is_err());
        assert!(safe_component("/abs").is_err());
        assert!(safe_component("").is_err());
    }
}
