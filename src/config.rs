//! Configuration for deck processing.
//!
//! All behaviour is controlled through [`ProcessingConfig`], built via its
//! [`ProcessingConfigBuilder`]. One struct for every knob keeps configs easy
//! to share across spawned jobs and to print when diagnosing a run.

use crate::error::Deck2SvgError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Default bucket for per-slide SVGs and thumbnails.
pub const DEFAULT_SLIDES_BUCKET: &str = "slide-visuals";

/// Default bucket for `result.json`.
pub const DEFAULT_RESULTS_BUCKET: &str = "processing-results";

/// Configuration for converting decks.
///
/// # Example
/// ```rust
/// use deck2svg::ProcessingConfig;
///
/// let config = ProcessingConfig::builder()
///     .render_timeout_secs(60)
///     .thumbnail_max_dim(320)
///     .build()
///     .unwrap();
/// assert_eq!(config.thumbnail_max_dim, 320);
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Explicit path to `soffice`. Default: None (see `locate_engine`).
    pub engine_path: Option<PathBuf>,

    /// Search for `soffice` when `engine_path` is unset. Default: true.
    ///
    /// Turning this off with no `engine_path` disables the engine entirely and
    /// every slide goes through the fallback synthesizer.
    pub locate_engine: bool,

    /// Hard limit on the single engine invocation per deck, in seconds. Default: 120.
    ///
    /// LibreOffice occasionally hangs on malformed decks; the child process
    /// is killed when the limit elapses and the job continues on the fallback path.
    pub render_timeout_secs: u64,

    /// Longest side of generated thumbnails in pixels. Range: 16–2000. Default: 250.
    pub thumbnail_max_dim: u32,

    /// Bucket receiving `slides/` and `thumbnails/` artifacts. Default: `slide-visuals`.
    pub slides_bucket: String,

    /// Bucket receiving `result.json`. Default: `processing-results`.
    pub results_bucket: String,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Largest accepted deck in bytes. Default: 50 MiB.
    pub max_file_size: u64,

    /// Jobs allowed in the processing state at once. Default: 4.
    ///
    /// Each processing job may hold one LibreOffice process, which is the
    /// dominant memory cost. Further jobs wait in the queued state.
    pub max_concurrent_jobs: usize,

    /// Parent directory for per-job scratch space. Default: system temp dir.
    pub work_dir: Option<PathBuf>,

    /// Directory of the on-disk result cache. Default: None (no caching).
    ///
    /// A deck whose bytes and output settings match an earlier successful
    /// conversion completes from the cache without rendering.
    pub cache_dir: Option<PathBuf>,

    /// Failed jobs whose source is kept for `retry`. Default: 16.
    ///
    /// The oldest retained source is dropped when the limit is exceeded;
    /// retrying its job then fails with `SourceReleased`.
    pub max_retained_sources: usize,

    /// Optional per-slide progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            locate_engine: true,
            render_timeout_secs: 120,
            thumbnail_max_dim: 250,
            slides_bucket: DEFAULT_SLIDES_BUCKET.to_string(),
            results_bucket: DEFAULT_RESULTS_BUCKET.to_string(),
            download_timeout_secs: 120,
            max_file_size: 50 * 1024 * 1024,
            max_concurrent_jobs: 4,
            work_dir: None,
            cache_dir: None,
            max_retained_sources: 16,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("engine_path", &self.engine_path)
            .field("locate_engine", &self.locate_engine)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("thumbnail_max_dim", &self.thumbnail_max_dim)
            .field("slides_bucket", &self.slides_bucket)
            .field("results_bucket", &self.results_bucket)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_file_size", &self.max_file_size)
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("work_dir", &self.work_dir)
            .field("cache_dir", &self.cache_dir)
            .field("max_retained_sources", &self.max_retained_sources)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }

    /// `true` when the engine may be used at all.
    pub fn engine_enabled(&self) -> bool {
        self.engine_path.is_some() || self.locate_engine
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.engine_path = Some(path.into());
        self
    }

    pub fn locate_engine(mut self, v: bool) -> Self {
        self.config.locate_engine = v;
        self
    }

    /// Disable the external engine: no explicit path and no searching.
    pub fn without_engine(mut self) -> Self {
        self.config.engine_path = None;
        self.config.locate_engine = false;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs.max(1);
        self
    }

    pub fn thumbnail_max_dim(mut self, px: u32) -> Self {
        self.config.thumbnail_max_dim = px.clamp(16, 2000);
        self
    }

    pub fn slides_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.slides_bucket = bucket.into();
        self
    }

    pub fn results_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.results_bucket = bucket.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    pub fn max_retained_sources(mut self, n: usize) -> Self {
        self.config.max_retained_sources = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, Deck2SvgError> {
        let c = &self.config;
        if c.slides_bucket.trim().is_empty() || c.results_bucket.trim().is_empty() {
            return Err(Deck2SvgError::InvalidConfig(
                "Bucket names must not be empty".into(),
            ));
        }
        if c.max_file_size == 0 {
            return Err(Deck2SvgError::InvalidConfig(
                "Maximum deck size must be > 0".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(Deck2SvgError::InvalidConfig(
                "Download timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}
