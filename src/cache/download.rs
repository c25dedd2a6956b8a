use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use super::source::{DownloadError, RemoteFile};

/// Read size for streaming transfers (1 MiB).
pub const DOWNLOAD_CHUNK_SIZE: usize = 1024 * 1024;

/// Marker appended to the destination name while a transfer is in flight.
pub const PART_SUFFIX: &str = ".part";

/// Running state of a single file transfer.
///
/// Emitted after every chunk. `total` is only known when the server declared
/// a length; without it no percentage can be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub file_name: String,
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<u64> {
        match self.total {
            Some(total) if total > 0 => Some((self.downloaded * 100 / total).min(100)),
            _ => None,
        }
    }
}

/// Sibling path used while `dest` is being written.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(PART_SUFFIX);
    dest.with_file_name(name)
}

/// Stream `remote` into `dest`.
///
/// Bytes go to [`part_path`] first; `dest` only appears through the final
/// rename once the data is flushed and synced. On error the `.part` file is
/// left where it is and `dest` is untouched. Returns the number of bytes
/// written.
pub fn stream_to_file(
    remote: RemoteFile,
    dest: &Path,
    chunk_size: usize,
    progress: &dyn Fn(&DownloadProgress),
) -> Result<u64, DownloadError> {
    let tmp = part_path(dest);
    let mut body = remote.body;
    let mut out = File::create(&tmp)?;

    let mut state = DownloadProgress {
        file_name: dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        downloaded: 0,
        total: remote.content_length,
    };
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        out.write_all(&buf[..n])?;
        state.downloaded += n as u64;
        progress(&state);
    }

    out.flush()?;
    out.sync_all()?;
    drop(out);

    fs::rename(&tmp, dest)?;
    Ok(state.downloaded)
}
