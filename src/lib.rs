//! # deck2svg
//!
//! Convert PowerPoint decks (`.pptx`) into per-slide SVG images, PNG
//! thumbnails and positioned, styled text descriptors for translation
//! overlays.
//!
//! ## Why this crate?
//!
//! A translation editor needs to show each slide as it looks and lay
//! translated text over the original at the same position and size. That
//! takes two things from every slide: a faithful picture, and the geometry
//! and styling of every text box. LibreOffice produces the best pictures but
//! is slow to start and sometimes fails; the geometry has to come from the
//! OOXML itself either way. This crate runs LibreOffice once per deck and
//! falls back to a locally synthesized SVG whenever the engine's output
//! cannot be trusted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .pptx
//!  │
//!  ├─ 1. Input      local file, URL download or in-memory upload
//!  ├─ 2. Deck       open the ZIP, slide order, slide size, theme
//!  ├─ 3. Batch      one `soffice --convert-to svg` run (optional, bounded)
//!  ├─ 4. Extract    shapes → percentage geometry + collapsed text style
//!  ├─ 5. Synthesize fallback SVG when the batch is unusable; PNG thumbnail
//!  │                (engine slides: shape positions checked against the SVG)
//!  ├─ 6. Upload     {job}/slides/slide_N.svg, {job}/thumbnails/slide_N.png, result.json
//!  └─ 7. Track      job status and progress through a JobStore
//! ```
//!
//! A deck converted before with the same output settings can complete from
//! the result cache (`ProcessingConfig::cache_dir`) without rendering.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deck2svg::{ConversionService, DeckSource, InMemorySessionStore, LocalStorage, ProcessingConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ConversionService::new(
//!         ProcessingConfig::default(),
//!         Arc::new(LocalStorage::new("out")),
//!         Arc::new(InMemorySessionStore::new()),
//!     );
//!     let receipt = service.submit(DeckSource::parse("deck.pptx"), "session-1").await?;
//!     let job = service.wait(&receipt.job_id).await?;
//!     println!("{}: {}", job.job_id, job.status);
//!
//!     let result = service.get_result("session-1").await?;
//!     for slide in &result.slides {
//!         println!("slide {} → {} ({} shapes)", slide.slide_number, slide.svg_url, slide.shapes.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `deck2svg` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! deck2svg = { version = "0.3", default-features = false }
//! ```
//!
//! ## Rendering engine
//!
//! `soffice` is found through `SOFFICE_PATH`, then `PATH`, then the usual
//! install locations (see the `soffice-locate` crate). Without it every slide
//! is synthesized locally: text, fills and raster pictures are kept, vector
//! art and effects are not.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod service;
pub mod storage;
pub mod units;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{FileResultCache, ResultCache};
pub use config::{ProcessingConfig, ProcessingConfigBuilder};
pub use convert::{inspect, run_job, JobContext};
pub use error::{Deck2SvgError, JobStoreError, SlideError, StorageError};
pub use job::{InMemoryJobStore, JobStatus, JobStore, JobUpdate, ProcessingJob};
pub use output::{
    BackgroundFill, DeckResult, DeckStats, DeckSummary, EmbeddedImage, ShapeDescriptor, ShapeKind,
    SlideResult, SynthesisSource, ValidationStatus,
};
pub use pipeline::input::DeckSource;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use service::{ConversionService, SubmitReceipt};
pub use storage::{InMemorySessionStore, LocalStorage, ObjectStorage, SessionStore, SupabaseStorage};
pub use units::{Geometry, GeometryUnit, HorizontalAlign, VerticalAnchor};
