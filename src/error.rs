//! Error types for the deck2svg library.
//!
//! Errors are split by blast radius:
//!
//! * [`Deck2SvgError`] — **Fatal to a job**: the deck cannot be converted
//!   (bad input, corrupt archive, a slide that cannot be produced, a failed
//!   upload). The job is marked failed with this error's message.
//!
//! * [`SlideError`] — the cause of a single slide's failure. It never
//!   travels alone: the orchestrator wraps it in [`Deck2SvgError::Slide`]
//!   together with the slide number, because a deck with a missing slide is
//!   not a usable result.
//!
//! * [`StorageError`] / [`JobStoreError`] — returned by the collaborator
//!   traits in [`crate::storage`] and [`crate::job`].
//!
//! External-engine failures have no public error type at all: the batch
//! renderer reports them through an empty map and the slides fall back to
//! local synthesis.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the deck2svg library.
#[derive(Debug, Error)]
pub enum Deck2SvgError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Deck file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a ZIP-based presentation.
    #[error("File is not a .pptx presentation: '{path}'\nFirst bytes: {magic:?}")]
    NotAPresentation { path: PathBuf, magic: [u8; 4] },

    /// The deck exceeds the configured size limit.
    #[error("Deck is {size} bytes, larger than the {limit}-byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    // ── Deck errors ───────────────────────────────────────────────────────
    /// The archive or one of its structural parts cannot be read.
    #[error("Deck '{path}' is corrupt: {detail}")]
    CorruptDeck { path: PathBuf, detail: String },

    /// The deck opened fine but lists no slides.
    #[error("Deck '{path}' contains no slides")]
    EmptyDeck { path: PathBuf },

    // ── Slide errors ──────────────────────────────────────────────────────
    /// One slide could not be extracted, synthesised or uploaded.
    #[error("Slide {slide} failed: {source}")]
    Slide {
        slide: usize,
        #[source]
        source: SlideError,
    },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// Uploading a deck-level artifact (the result document) failed.
    #[error("Upload of '{destination}' failed: {source}")]
    UploadFailed {
        destination: String,
        #[source]
        source: StorageError,
    },

    /// The session store rejected a write.
    #[error("Session store error: {0}")]
    SessionStore(#[source] StorageError),

    /// The job store rejected an operation.
    #[error(transparent)]
    JobStore(#[from] JobStoreError),

    // ── Job lookup errors ─────────────────────────────────────────────────
    /// No job with this id was ever submitted.
    #[error("Unknown job '{job_id}'")]
    JobNotFound { job_id: String },

    /// Only failed jobs can be retried.
    #[error("Job '{job_id}' is {status} and cannot be retried; only failed jobs can")]
    JobNotRetryable { job_id: String, status: String },

    /// The session has no completed conversion yet.
    #[error("No conversion result for session '{session_id}' yet")]
    ResultNotReady { session_id: String },

    /// Session ids become storage key prefixes and must be a single safe segment.
    #[error("Invalid session id '{session_id}': {reason}")]
    InvalidSession { session_id: String, reason: String },

    /// The failed job's source was already retried or evicted.
    #[error("Job '{job_id}' no longer holds its source deck; submit the deck again")]
    SourceReleased { job_id: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a local output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error, including panics caught at the job boundary.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Deck2SvgError {
    /// Wrap a slide-level cause with its 1-indexed slide number.
    pub fn slide(slide: usize, source: SlideError) -> Self {
        Deck2SvgError::Slide { slide, source }
    }

    /// `true` for errors raised before any slide work began.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Deck2SvgError::FileNotFound { .. }
                | Deck2SvgError::PermissionDenied { .. }
                | Deck2SvgError::InvalidInput { .. }
                | Deck2SvgError::DownloadFailed { .. }
                | Deck2SvgError::DownloadTimeout { .. }
                | Deck2SvgError::NotAPresentation { .. }
                | Deck2SvgError::FileTooLarge { .. }
                | Deck2SvgError::CorruptDeck { .. }
                | Deck2SvgError::EmptyDeck { .. }
        )
    }
}

/// Why a single slide could not be produced.
#[derive(Debug, Error)]
pub enum SlideError {
    /// The slide's XML or relationships could not be parsed.
    #[error("shape extraction failed: {detail}")]
    Extraction { detail: String },

    /// A relationship points at a part that is not in the archive.
    #[error("embedded media '{target}' is missing from the deck")]
    MissingMedia { target: String },

    /// Fallback SVG generation failed.
    #[error("vector synthesis failed: {detail}")]
    Synthesis { detail: String },

    /// An embedded raster image could not be decoded for the thumbnail.
    #[error("cannot decode embedded {content_type} image: {detail}")]
    ImageDecode {
        content_type: String,
        detail: String,
    },

    /// Thumbnail composition or PNG encoding failed.
    #[error("thumbnail synthesis failed: {detail}")]
    Thumbnail { detail: String },

    /// Writing an artifact to local scratch space failed.
    #[error("could not stage '{path}': {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Uploading an artifact failed.
    #[error("upload of '{destination}' failed: {source}")]
    Upload {
        destination: String,
        #[source]
        source: StorageError,
    },

    /// The blocking worker for this slide panicked.
    #[error("slide worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Errors from [`crate::storage::ObjectStorage`] and
/// [`crate::storage::SessionStore`] implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local file system failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote service could not be reached.
    #[error("request to '{url}' failed: {reason}")]
    Request { url: String, reason: String },

    /// The remote service answered with a non-success status.
    #[error("'{url}' returned HTTP {status}: {body}")]
    Rejected {
        url: String,
        status: u16,
        body: String,
    },

    /// Destination keys must be relative and free of `..` segments.
    #[error("invalid destination '{0}'")]
    InvalidDestination(String),
}

/// Errors from [`crate::job::JobStore`] implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobStoreError {
    /// `create` was called with an id that already exists.
    #[error("job '{0}' already exists")]
    DuplicateJob(String),

    /// `update` referenced an unknown id.
    #[error("job '{0}' does not exist")]
    UnknownJob(String),

    /// Completed and failed jobs are immutable.
    #[error("job '{job_id}' is already {status} and cannot be updated")]
    TerminalJob { job_id: String, status: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slide_error_names_slide_and_cause() {
        let e = Deck2SvgError::slide(
            2,
            SlideError::MissingMedia {
                target: "ppt/media/image3.png".into(),
            },
        );
        let msg = e.to_string();
        assert!(msg.contains("Slide 2"), "got: {msg}");
        assert!(msg.contains("image3.png"), "got: {msg}");
    }

    #[test]
    fn input_errors_are_classified() {
        assert!(Deck2SvgError::EmptyDeck {
            path: PathBuf::from("a.pptx")
        }
        .is_input_error());
        assert!(!Deck2SvgError::slide(
            1,
            SlideError::Synthesis {
                detail: "x".into()
            }
        )
        .is_input_error());
    }

    #[test]
    fn too_large_display() {
        let e = Deck2SvgError::FileTooLarge {
            size: 60,
            limit: 50,
        };
        let msg = e.to_string();
        assert!(msg.contains("60 bytes"));
        assert!(msg.contains("50-byte"));
    }

    #[test]
    fn terminal_job_display() {
        let e = JobStoreError::TerminalJob {
            job_id: "j1".into(),
            status: "completed".into(),
        };
        assert!(e.to_string().contains("already completed"));
    }

    #[test]
    fn released_source_display() {
        let e = Deck2SvgError::SourceReleased {
            job_id: "j3".into(),
        };
        assert!(e.to_string().contains("submit the deck again"));
        assert!(!e.is_input_error());
    }

    #[test]
    fn retry_rejection_display() {
        let e = Deck2SvgError::JobNotRetryable {
            job_id: "j9".into(),
            status: "processing".into(),
        };
        assert!(e.to_string().contains("only failed jobs"));
    }
}
