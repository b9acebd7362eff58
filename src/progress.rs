//! Progress-callback trait for per-slide conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ProcessingConfigBuilder::progress_callback`] to receive
//! events as a job moves through its slides. The job tracker already records
//! coarse progress; callbacks carry the detail (which path each slide took,
//! which slide failed) for terminals and logs.
//!
//! # Example
//!
//! ```rust
//! use deck2svg::{ConversionProgressCallback, ProcessingConfig, SynthesisSource};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FallbackCounter {
//!     fallbacks: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for FallbackCounter {
//!     fn on_slide_complete(&self, slide: usize, total: usize, source: SynthesisSource) {
//!         if source == SynthesisSource::Fallback {
//!             self.fallbacks.fetch_add(1, Ordering::SeqCst);
//!         }
//!         eprintln!("slide {slide}/{total} done");
//!     }
//! }
//!
//! let counter = Arc::new(FallbackCounter { fallbacks: AtomicUsize::new(0) });
//!
//! let config = ProcessingConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::SynthesisSource;
use std::sync::Arc;

/// Called by the orchestrator as it processes a job.
///
/// Implementations must be `Send + Sync`: jobs run on spawned tasks and
/// several jobs may share one callback. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the deck is open and its slide count is known.
    fn on_job_start(&self, job_id: &str, total_slides: usize) {
        let _ = (job_id, total_slides);
    }

    /// Called after the single engine run.
    ///
    /// # Arguments
    /// * `engine_slides` — slides the engine produced (0 or `total_slides`)
    /// * `total_slides`  — slides in the deck
    fn on_batch_render(&self, engine_slides: usize, total_slides: usize) {
        let _ = (engine_slides, total_slides);
    }

    /// Called before a slide is extracted.
    fn on_slide_start(&self, slide: usize, total_slides: usize) {
        let _ = (slide, total_slides);
    }

    /// Called when both artifacts of a slide are uploaded.
    fn on_slide_complete(&self, slide: usize, total_slides: usize, source: SynthesisSource) {
        let _ = (slide, total_slides, source);
    }

    /// Called when a slide fails; the job aborts right after.
    fn on_slide_error(&self, slide: usize, total_slides: usize, error: &str) {
        let _ = (slide, total_slides, error);
    }

    /// Called once the result document is stored.
    fn on_job_complete(&self, job_id: &str, total_slides: usize) {
        let _ = (job_id, total_slides);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessingConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
