//! Pipeline stages for deck-to-SVG conversion.
//!
//! Each submodule implements one transformation step so it can be tested in
//! isolation; [`crate::convert`] strings them together for a job.
//!
//! ## Data Flow
//!
//! ```text
//!                     ┌──▶ batch ───────────────────┐  engine SVG, all or nothing
//! input ──▶ deck ─────┤                             ├──▶ upload
//!                     └──▶ extract ─┬──▶ svg ───────┤
//!                                   └──▶ thumbnail ─┘
//! ```
//!
//! 1. [`input`]     — canonicalise a path, URL or upload to a local file
//! 2. [`deck`]      — open the archive, resolve slide order, size and theme
//! 3. [`batch`]     — one LibreOffice run over the whole deck; mapped to
//!    slides only when it yields exactly one SVG per slide
//! 4. [`extract`]   — per-slide shapes, text styling and background
//! 5. [`svg`]       — fallback vector synthesis from extracted shapes
//! 6. [`thumbnail`] — PNG preview composed from the same shapes
//! 7. [`validate`]  — engine slides only: check shape positions against
//!    the text the engine drew
//!
//! [`xml`] is the small element tree the deck reader and extractor share.

pub mod batch;
pub mod deck;
pub mod extract;
pub mod input;
pub mod svg;
pub mod thumbnail;
pub mod validate;
pub mod xml;
