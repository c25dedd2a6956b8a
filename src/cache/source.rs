use std::io::Read;

use url::Url;

/// Host every built-in voice is published on.
pub const HUGGING_FACE_HOST: &str = "huggingface.co";

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server answered {status} for {url}")]
    Status { status: u16, url: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Origins a model file may be downloaded from.
///
/// A URL passes when it uses `https` on the default port and its host matches
/// one of the listed hosts exactly. Anything else is rejected before a
/// connection is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedHosts {
    hosts: Vec<String>,
}

impl Default for TrustedHosts {
    fn default() -> Self {
        Self::new([HUGGING_FACE_HOST])
    }
}

impl TrustedHosts {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Parse `raw` and check it against the allow-list.
    ///
    /// The error is a human-readable reason suitable for a diagnostic.
    pub fn check(&self, raw: &str) -> Result<Url, String> {
        let url = Url::parse(raw).map_err(|e| format!("not a valid URL ({e})"))?;
        if url.scheme() != "https" {
            return Err(format!("scheme '{}' is not https", url.scheme()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| "URL has no host".to_string())?
            .to_ascii_lowercase();
        if let Some(port) = url.port() {
            return Err(format!("port {port} is not the https default"));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err("URL carries credentials".to_string());
        }
        if !self.hosts.iter().any(|h| *h == host) {
            return Err(format!("host '{host}' is not trusted"));
        }
        Ok(url)
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}

/// An opened remote resource.
pub struct RemoteFile {
    /// Declared total size, when the server sends one.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

/// Something that can open a model file URL for reading.
pub trait ModelSource {
    fn open(&self, url: &Url) -> Result<RemoteFile, DownloadError>;
}

/// Blocking HTTPS source backed by `reqwest`.
#[cfg(feature = "http")]
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpSource {
    /// Build a client that identifies itself with `user_agent`.
    pub fn new(user_agent: &str) -> Result<Self, DownloadError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(std::time::Duration::from_secs(10))
            // Model files are tens of MB; only bound the connect phase.
            .timeout(None)
            .build()?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl ModelSource for HttpSource {
    fn open(&self, url: &Url) -> Result<RemoteFile, DownloadError> {
        let response = self.client.get(url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(RemoteFile {
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::TrustedHosts;

    #[test]
    fn accepts_https_on_trusted_host() {
        let hosts = TrustedHosts::default();
        let url = hosts
            .check("https://huggingface.co/rhasspy/piper-voices/resolve/main/x.onnx")
            .expect("trusted");
        assert_eq!(url.host_str(), Some("huggingface.co"));
    }

    #[test]
    fn rejects_plain_http() {
        let err = TrustedHosts::default()
            .check("http://huggingface.co/x.onnx")
            .unwrap_err();
        assert!(err.contains("https"), "{err}");
    }

    #[test]
    fn rejects_lookalike_hosts() {
        let hosts = TrustedHosts::default();
        assert!(hosts.check("https://huggingface.co.evil.example/x.onnx").is_err());
        assert!(hosts.check("https://evil.example/huggingface.co/x.onnx").is_err());
        assert!(hosts.check("https://huggingface.co@evil.example/x.onnx").is_err());
    }

    #[test]
    fn rejects_non_default_port() {
        let hosts = TrustedHosts::default();
        let err = hosts.check("https://huggingface.co:8443/x.onnx").unwrap_err();
        assert!(err.contains("8443"), "{err}");
        // An explicit :443 is the same origin.
        assert!(hosts.check("https://huggingface.co:443/x.onnx").is_ok());
    }

    #[test]
    fn rejects_placeholders() {
        let hosts = TrustedHosts::default();
        assert!(hosts.check("TODO: fill in").is_err());
        assert!(hosts.check("").is_err());
    }

    #[test]
    fn host_match_is_case_insensitive() {
        let hosts = TrustedHosts::new(["Example.ORG"]);
        assert!(hosts.check("https://EXAMPLE.org/model.onnx").is_ok());
    }
}
