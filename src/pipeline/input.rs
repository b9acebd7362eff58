//! Input resolution: normalise a path, URL or in-memory upload to a local file.
//!
//! The engine is an external process and can only open files, so every
//! source ends up as a path on disk. Downloads and buffered uploads are
//! written into a `TempDir` that lives as long as the `ResolvedInput`;
//! dropping it removes the copy even if the job panics.
//!
//! A `.pptx` is a ZIP archive, so the first four bytes must be `PK\x03\x04`.
//! Checking this up front gives callers a clear input error instead of a
//! corrupt-archive message from deep inside the reader.

use crate::config::ProcessingConfig;
use crate::error::Deck2SvgError;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";
const DEFAULT_FILE_NAME: &str = "deck.pptx";

/// Where a deck comes from.
#[derive(Clone)]
pub enum DeckSource {
    /// A file on the local file system.
    Path(PathBuf),
    /// An HTTP or HTTPS URL.
    Url(String),
    /// Bytes already in memory, e.g. a multipart upload.
    Bytes { name: String, data: Arc<Vec<u8>> },
}

impl DeckSource {
    /// Interpret a command-line argument: URLs stay URLs, anything else is a path.
    pub fn parse(input: &str) -> Self {
        if is_url(input) {
            DeckSource::Url(input.to_string())
        } else {
            DeckSource::Path(PathBuf::from(input))
        }
    }

    /// Wrap an in-memory upload.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        DeckSource::Bytes {
            name: name.into(),
            data: Arc::new(data),
        }
    }

    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            DeckSource::Path(p) => p.display().to_string(),
            DeckSource::Url(u) => u.clone(),
            DeckSource::Bytes { name, data } => format!("{} ({} bytes in memory)", name, data.len()),
        }
    }
}

impl fmt::Debug for DeckSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            DeckSource::Url(u) => f.debug_tuple("Url").field(u).finish(),
            DeckSource::Bytes { name, data } => f
                .debug_struct("Bytes")
                .field("name", name)
                .field("len", &data.len())
                .finish(),
        }
    }
}

impl From<PathBuf> for DeckSource {
    fn from(path: PathBuf) -> Self {
        DeckSource::Path(path)
    }
}

impl From<&Path> for DeckSource {
    fn from(path: &Path) -> Self {
        DeckSource::Path(path.to_path_buf())
    }
}

/// A deck available as a local file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the deck was downloaded to a temp directory.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
    /// Input was in memory; the bytes were written to a temp directory.
    Buffered { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Path to the deck regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } | ResolvedInput::Buffered { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a source to a local, size-checked, ZIP-signed file.
pub async fn resolve_input(
    source: &DeckSource,
    config: &ProcessingConfig,
) -> Result<ResolvedInput, Deck2SvgError> {
    match source {
        DeckSource::Path(path) => resolve_local(path, config.max_file_size),
        DeckSource::Url(url) => download_url(url, config).await,
        DeckSource::Bytes { name, data } => buffer_bytes(name, data, config.max_file_size).await,
    }
}

fn resolve_local(path: &Path, limit: u64) -> Result<ResolvedInput, Deck2SvgError> {
    let path = path.to_path_buf();
    if !path.exists() {
        return Err(Deck2SvgError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Deck2SvgError::PermissionDenied { path });
        }
        Err(_) => return Err(Deck2SvgError::FileNotFound { path }),
    };

    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    if size > limit {
        return Err(Deck2SvgError::FileTooLarge { size, limit });
    }

    let mut head = Vec::with_capacity(4);
    let _ = file.by_ref().take(4).read_to_end(&mut head);
    check_magic(&head, &path)?;

    debug!("Resolved local deck: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, config: &ProcessingConfig) -> Result<ResolvedInput, Deck2SvgError> {
    let timeout_secs = config.download_timeout_secs;
    let limit = config.max_file_size;

    if reqwest::Url::parse(url).is_err() {
        return Err(Deck2SvgError::InvalidInput {
            input: url.to_string(),
        });
    }
    info!("Downloading deck from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Deck2SvgError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            Deck2SvgError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Deck2SvgError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(classify)?;
    if !response.status().is_success() {
        return Err(Deck2SvgError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    if let Some(size) = response.content_length() {
        if size > limit {
            return Err(Deck2SvgError::FileTooLarge { size, limit });
        }
    }

    let filename = extract_filename(url);
    let bytes = response.bytes().await.map_err(classify)?;
    if bytes.len() as u64 > limit {
        return Err(Deck2SvgError::FileTooLarge {
            size: bytes.len() as u64,
            limit,
        });
    }

    let (path, temp_dir) = write_temp(&filename, &bytes).await?;
    check_magic(&bytes, &path)?;

    info!("Downloaded {} bytes to: {}", bytes.len(), path.display());
    Ok(ResolvedInput::Downloaded {
        path,
        _temp_dir: temp_dir,
    })
}

async fn buffer_bytes(name: &str, data: &[u8], limit: u64) -> Result<ResolvedInput, Deck2SvgError> {
    let size = data.len() as u64;
    if size > limit {
        return Err(Deck2SvgError::FileTooLarge { size, limit });
    }
    let (path, temp_dir) = write_temp(&sanitize_file_name(name), data).await?;
    check_magic(data, &path)?;
    debug!("Buffered {} bytes to: {}", size, path.display());
    Ok(ResolvedInput::Buffered {
        path,
        _temp_dir: temp_dir,
    })
}

async fn write_temp(file_name: &str, bytes: &[u8]) -> Result<(PathBuf, TempDir), Deck2SvgError> {
    let temp_dir = TempDir::new().map_err(|e| Deck2SvgError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(file_name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| Deck2SvgError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;
    Ok((path, temp_dir))
}

fn check_magic(head: &[u8], path: &Path) -> Result<(), Deck2SvgError> {
    if head.len() >= 4 && head[..4] == ZIP_MAGIC {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(Deck2SvgError::NotAPresentation {
        path: path.to_path_buf(),
        magic,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return sanitize_file_name(last);
                }
            }
        }
    }
    DEFAULT_FILE_NAME.to_string()
}

/// Keep only the final component of an untrusted name.
fn sanitize_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "..")
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string())
}
