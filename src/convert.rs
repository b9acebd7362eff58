//! Slide pipeline orchestrator: runs one job from source deck to stored result.
//!
//! ```text
//! Queued ──▶ Processing ──┬──▶ Completed (progress 100, result ref)
//!                         └──▶ Failed    (stage kept, error names the slide)
//! ```
//!
//! Progress is 0 while the deck is prepared, 10 once the engine batch is
//! known, then `10 + floor(80 * i / N)` after slide `i` of `N` is uploaded,
//! and 100 on completion. Slides are processed one at a time; any slide
//! failure aborts the job and no later slide is touched.
//!
//! With a [`ResultCache`] the deck is hashed right after it is resolved; a
//! hit skips straight to writing the session's `result.json`.

use crate::cache::{self, ResultCache};
use crate::config::ProcessingConfig;
use crate::error::{Deck2SvgError, SlideError};
use crate::job::{JobStore, JobUpdate};
use crate::output::{DeckResult, DeckStats, DeckSummary, SlideResult, SynthesisSource};
use crate::pipeline::batch::{self, BatchRenderMap};
use crate::pipeline::deck::Deck;
use crate::pipeline::extract::{self, SlideContent};
use crate::pipeline::input::{self, DeckSource};
use crate::pipeline::{svg, thumbnail, validate};
use crate::storage::{ObjectStorage, SessionStore};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

/// Everything a job needs besides its source.
pub struct JobContext<'a> {
    pub job_id: &'a str,
    pub session_id: &'a str,
    pub config: &'a ProcessingConfig,
    pub storage: &'a dyn ObjectStorage,
    pub sessions: &'a dyn SessionStore,
    pub jobs: &'a dyn JobStore,
    pub cache: Option<&'a dyn ResultCache>,
}

/// Progress after slide `done` of `total` has been uploaded.
pub fn slide_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 90;
    }
    (10 + (80 * done) / total).min(90) as u8
}

/// Storage key of a slide's vector image. Scoped by job so a failed rerun
/// never overwrites the artifacts an earlier result points at.
pub fn svg_destination(session_id: &str, job_id: &str, slide: usize) -> String {
    format!("{}/{}/slides/slide_{}.svg", session_id, job_id, slide)
}

/// Storage key of a slide's thumbnail.
pub fn thumbnail_destination(session_id: &str, job_id: &str, slide: usize) -> String {
    format!("{}/{}/thumbnails/slide_{}.png", session_id, job_id, slide)
}

/// Storage key of a session's result document.
pub fn result_destination(session_id: &str) -> String {
    format!("{}/result.json", session_id)
}

/// Run a job to completion and record its terminal state.
///
/// The job must already exist in `ctx.jobs` in the queued state. On error
/// the job is marked Failed with the error's message before it is returned.
pub async fn run_job(ctx: &JobContext<'_>, source: &DeckSource) -> Result<DeckResult, Deck2SvgError> {
    match process(ctx, source).await {
        Ok(result) => Ok(result),
        Err(e) => {
            if e.is_input_error() {
                warn!(job_id = ctx.job_id, session_id = ctx.session_id, "Deck rejected: {}", e);
            } else {
                error!(job_id = ctx.job_id, session_id = ctx.session_id, "Job failed: {}", e);
            }
            if let Err(store_err) = ctx.jobs.update(ctx.job_id, JobUpdate::failed(e.to_string())) {
                warn!(job_id = ctx.job_id, "Could not record failure: {}", store_err);
            }
            Err(e)
        }
    }
}

async fn process(ctx: &JobContext<'_>, source: &DeckSource) -> Result<DeckResult, Deck2SvgError> {
    let total_start = Instant::now();
    let config = ctx.config;
    info!(
        job_id = ctx.job_id,
        session_id = ctx.session_id,
        "Starting conversion: {}",
        source.describe()
    );

    ctx.jobs
        .update(ctx.job_id, JobUpdate::processing(0, "Preparing deck"))?;

    // ── Step 1: Resolve input and open the deck ──────────────────────────
    let resolved = input::resolve_input(source, config).await?;
    let deck_path = resolved.path().to_path_buf();

    let cache_key = match ctx.cache {
        Some(_) => match cache::cache_key(&deck_path, config).await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(job_id = ctx.job_id, "Cannot hash deck, cache bypassed: {}", e);
                None
            }
        },
        None => None,
    };
    if let (Some(cache), Some(key)) = (ctx.cache, cache_key.as_deref()) {
        match cache.get(key).await {
            Ok(Some(cached)) => return complete_from_cache(ctx, cached, total_start).await,
            Ok(None) => {}
            Err(e) => warn!(job_id = ctx.job_id, "Result cache lookup failed: {}", e),
        }
    }

    let deck = Arc::new(open_deck(deck_path.clone()).await?);
    let total = deck.slide_count();
    let (width_px, height_px) = deck.size_px();
    info!(
        job_id = ctx.job_id,
        "Deck {} has {} slides at {}x{} px",
        deck.source().display(),
        total,
        width_px,
        height_px
    );

    ctx.sessions
        .set_slide_count(ctx.session_id, total)
        .await
        .map_err(Deck2SvgError::SessionStore)?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_job_start(ctx.job_id, total);
    }

    // ── Step 2: One engine run for the whole deck ────────────────────────
    let work_dir = create_work_dir(config)?;
    ctx.jobs
        .update(ctx.job_id, JobUpdate::stage("Rendering slides"))?;
    let render_start = Instant::now();
    let batch = batch::render_deck(&deck_path, work_dir.path(), total, config).await;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_render(batch.len(), total);
    }
    ctx.jobs.update(
        ctx.job_id,
        JobUpdate::processing(
            10,
            if batch.is_empty() {
                format!("Synthesizing {} slides", total)
            } else {
                format!("Engine rendered {} slides", total)
            },
        ),
    )?;

    // ── Step 3: Per-slide extract → synthesize → upload ──────────────────
    let staging = work_dir.path().join("staging");
    std::fs::create_dir_all(&staging).map_err(|e| Deck2SvgError::OutputWriteFailed {
        path: staging.clone(),
        source: e,
    })?;

    let mut slides = Vec::with_capacity(total);
    let mut stats = DeckStats {
        render_duration_ms,
        ..DeckStats::default()
    };

    for slide in 1..=total {
        if let Some(ref cb) = config.progress_callback {
            cb.on_slide_start(slide, total);
        }
        let result = process_slide(ctx, &deck, &batch, &staging, slide).await;
        let slide_result = match result {
            Ok(r) => r,
            Err(e) => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_slide_error(slide, total, &e.to_string());
                }
                return Err(Deck2SvgError::slide(slide, e));
            }
        };

        match slide_result.vector_source {
            SynthesisSource::Engine => stats.engine_slides += 1,
            SynthesisSource::Fallback => stats.fallback_slides += 1,
        }
        stats.total_shapes += slide_result.shapes.len();
        if let Some(ref cb) = config.progress_callback {
            cb.on_slide_complete(slide, total, slide_result.vector_source);
        }
        slides.push(slide_result);

        ctx.jobs.update(
            ctx.job_id,
            JobUpdate::processing(
                slide_progress(slide, total),
                format!("Processed slide {} of {}", slide, total),
            ),
        )?;
    }

    // ── Step 4: Store the result ─────────────────────────────────────────
    ctx.jobs
        .update(ctx.job_id, JobUpdate::stage("Storing result"))?;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    let result = DeckResult {
        session_id: ctx.session_id.to_string(),
        job_id: ctx.job_id.to_string(),
        slide_count: total,
        slides,
        stats,
        completed_at: Utc::now(),
    };

    let result_url = store_result(ctx, &result, work_dir.path()).await?;

    ctx.sessions
        .put_result(ctx.session_id, result.clone())
        .await
        .map_err(Deck2SvgError::SessionStore)?;
    if let (Some(cache), Some(key)) = (ctx.cache, cache_key.as_deref()) {
        if let Err(e) = cache.put(key, &result).await {
            warn!(job_id = ctx.job_id, "Could not cache result: {}", e);
        }
    }
    ctx.jobs
        .update(ctx.job_id, JobUpdate::completed(result_url))?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_job_complete(ctx.job_id, total);
    }

    info!(
        job_id = ctx.job_id,
        engine = result.stats.engine_slides,
        fallback = result.stats.fallback_slides,
        "Conversion complete in {}ms",
        result.stats.total_duration_ms
    );
    Ok(result)
}

/// Finish a job from a cached result of the same deck and settings.
///
/// The cached slides keep pointing at the artifacts of the job that produced
/// them; only the session's `result.json` is written.
async fn complete_from_cache(
    ctx: &JobContext<'_>,
    cached: DeckResult,
    started: Instant,
) -> Result<DeckResult, Deck2SvgError> {
    info!(
        job_id = ctx.job_id,
        cached_job = %cached.job_id,
        "Serving {} slides from the result cache",
        cached.slide_count
    );
    let total = cached.slide_count;
    ctx.sessions
        .set_slide_count(ctx.session_id, total)
        .await
        .map_err(Deck2SvgError::SessionStore)?;
    if let Some(ref cb) = ctx.config.progress_callback {
        cb.on_job_start(ctx.job_id, total);
    }
    ctx.jobs
        .update(ctx.job_id, JobUpdate::stage("Loaded from cache"))?;

    let mut result = cached;
    result.session_id = ctx.session_id.to_string();
    result.job_id = ctx.job_id.to_string();
    result.completed_at = Utc::now();
    result.stats.cached = true;
    result.stats.render_duration_ms = 0;
    result.stats.total_duration_ms = started.elapsed().as_millis() as u64;

    let work_dir = create_work_dir(ctx.config)?;
    let result_url = store_result(ctx, &result, work_dir.path()).await?;
    ctx.sessions
        .put_result(ctx.session_id, result.clone())
        .await
        .map_err(Deck2SvgError::SessionStore)?;
    ctx.jobs
        .update(ctx.job_id, JobUpdate::completed(result_url))?;
    if let Some(ref cb) = ctx.config.progress_callback {
        cb.on_job_complete(ctx.job_id, total);
    }
    Ok(result)
}

/// Write `result.json` under `dir` and upload it to the results bucket.
async fn store_result(
    ctx: &JobContext<'_>,
    result: &DeckResult,
    dir: &Path,
) -> Result<String, Deck2SvgError> {
    let result_path = dir.join("result.json");
    let json = serde_json::to_vec_pretty(result)
        .map_err(|e| Deck2SvgError::Internal(format!("cannot serialise result: {e}")))?;
    tokio::fs::write(&result_path, json)
        .await
        .map_err(|e| Deck2SvgError::OutputWriteFailed {
            path: result_path.clone(),
            source: e,
        })?;
    let destination = result_destination(ctx.session_id);
    ctx.storage
        .upload(&result_path, &ctx.config.results_bucket, &destination)
        .await
        .map_err(|e| Deck2SvgError::UploadFailed {
            destination,
            source: e,
        })
}

/// Files staged for one slide, produced on the blocking pool.
struct PreparedSlide {
    content: SlideContent,
    svg_path: PathBuf,
    thumbnail_path: PathBuf,
    source: SynthesisSource,
}

async fn process_slide(
    ctx: &JobContext<'_>,
    deck: &Arc<Deck>,
    batch: &BatchRenderMap,
    staging: &Path,
    slide: usize,
) -> Result<SlideResult, SlideError> {
    let (width, height) = deck.size_px();
    let max_dim = ctx.config.thumbnail_max_dim;
    let engine_svg = batch.get(slide).map(Path::to_path_buf);
    let deck = Arc::clone(deck);
    let staging = staging.to_path_buf();

    let prepared = tokio::task::spawn_blocking(move || {
        prepare_slide(&deck, slide, engine_svg, &staging, width, height, max_dim)
    })
    .await
    .map_err(|e| SlideError::WorkerPanicked(e.to_string()))??;

    let svg_dest = svg_destination(ctx.session_id, ctx.job_id, slide);
    let svg_url = upload(ctx, &prepared.svg_path, &svg_dest).await?;
    let thumb_dest = thumbnail_destination(ctx.session_id, ctx.job_id, slide);
    let thumbnail_url = upload(ctx, &prepared.thumbnail_path, &thumb_dest).await?;

    debug!(job_id = ctx.job_id, slide, source = ?prepared.source, "Slide uploaded");
    // Pictures are already inside the uploaded SVG.
    let mut shapes = prepared.content.shapes;
    for image in shapes.iter_mut().filter_map(|s| s.image.as_mut()) {
        image.release_payload();
    }
    Ok(SlideResult {
        slide_number: slide,
        svg_url,
        thumbnail_url,
        width,
        height,
        vector_source: prepared.source,
        background: prepared.content.background,
        shapes,
    })
}

fn prepare_slide(
    deck: &Deck,
    slide: usize,
    engine_svg: Option<PathBuf>,
    staging: &Path,
    width: u32,
    height: u32,
    max_dim: u32,
) -> Result<PreparedSlide, SlideError> {
    let mut content = extract::extract_slide(deck, slide)?;

    let (svg_path, source) = match engine_svg {
        Some(path) => {
            validate::validate_shapes(&mut content.shapes, &path, width, height);
            (path, SynthesisSource::Engine)
        }
        None => {
            let document = svg::synthesize_svg(&content, width, height)?;
            let path = staging.join(format!("slide_{}.svg", slide));
            write_staged(&path, document.as_bytes())?;
            (path, SynthesisSource::Fallback)
        }
    };

    let png = thumbnail::synthesize_thumbnail(&content, width, height, max_dim)?;
    let thumbnail_path = staging.join(format!("thumb_{}.png", slide));
    write_staged(&thumbnail_path, &png)?;

    Ok(PreparedSlide {
        content,
        svg_path,
        thumbnail_path,
        source,
    })
}

fn write_staged(path: &Path, bytes: &[u8]) -> Result<(), SlideError> {
    std::fs::write(path, bytes).map_err(|e| SlideError::Staging {
        path: path.to_path_buf(),
        source: e,
    })
}

async fn upload(ctx: &JobContext<'_>, path: &Path, destination: &str) -> Result<String, SlideError> {
    ctx.storage
        .upload(path, &ctx.config.slides_bucket, destination)
        .await
        .map_err(|e| SlideError::Upload {
            destination: destination.to_string(),
            source: e,
        })
}

async fn open_deck(path: PathBuf) -> Result<Deck, Deck2SvgError> {
    tokio::task::spawn_blocking(move || Deck::open(&path))
        .await
        .map_err(|e| Deck2SvgError::Internal(format!("deck reader panicked: {e}")))?
}

fn create_work_dir(config: &ProcessingConfig) -> Result<TempDir, Deck2SvgError> {
    let dir = match config.work_dir {
        Some(ref parent) => {
            std::fs::create_dir_all(parent).map_err(|e| Deck2SvgError::OutputWriteFailed {
                path: parent.clone(),
                source: e,
            })?;
            tempfile::Builder::new().prefix("deck2svg-").tempdir_in(parent)
        }
        None => tempfile::Builder::new().prefix("deck2svg-").tempdir(),
    };
    dir.map_err(|e| Deck2SvgError::Internal(format!("cannot create work directory: {e}")))
}

/// Slide count and dimensions without rendering anything.
pub async fn inspect(
    source: &DeckSource,
    config: &ProcessingConfig,
) -> Result<DeckSummary, Deck2SvgError> {
    let resolved = input::resolve_input(source, config).await?;
    let deck = open_deck(resolved.path().to_path_buf()).await?;
    Ok(deck.summary())
}
