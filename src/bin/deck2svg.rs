//! CLI binary for deck2svg.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ProcessingConfig`, runs one job through `ConversionService` backed by a
//! local directory, and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use deck2svg::{
    inspect, ConversionProgressCallback, ConversionService, DeckSource, InMemorySessionStore,
    JobStatus, LocalStorage, ProcessingConfig, ProgressCallback, SynthesisSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per slide.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_job_start` reports the slide count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening deck…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            fallbacks: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} slides  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.set_message("soffice…");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, slide: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&slide)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_job_start(&self, _job_id: &str, total_slides: usize) {
        self.activate_bar(total_slides);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_slides} slides…"))
        ));
    }

    fn on_batch_render(&self, engine_slides: usize, total_slides: usize) {
        let line = if engine_slides == total_slides && total_slides > 0 {
            format!("  {} LibreOffice rendered all {} slides", green("✓"), total_slides)
        } else {
            format!("  {} LibreOffice unavailable or incomplete; synthesizing SVG locally", cyan("⚠"))
        };
        self.bar.println(line);
        self.bar.set_prefix("Converting");
    }

    fn on_slide_start(&self, slide: usize, _total: usize) {
        self.start_times.lock().unwrap().insert(slide, Instant::now());
        self.bar.set_message(format!("slide {slide}"));
    }

    fn on_slide_complete(&self, slide: usize, total: usize, source: SynthesisSource) {
        let label = match source {
            SynthesisSource::Engine => "engine",
            SynthesisSource::Fallback => {
                self.fallbacks.fetch_add(1, Ordering::SeqCst);
                "fallback"
            }
        };
        self.bar.println(format!(
            "  {} Slide {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            slide,
            total,
            dim(label),
            dim(&format!("{:.1}s", self.elapsed_secs(slide))),
        ));
        self.bar.inc(1);
    }

    fn on_slide_error(&self, slide: usize, total: usize, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Slide {:>3}/{:<3}  {}  {}",
            red("✗"),
            slide,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs(slide))),
        ));
        self.bar.abandon();
    }

    fn on_job_complete(&self, _job_id: &str, total_slides: usize) {
        self.bar.finish_and_clear();
        let fallbacks = self.fallbacks.load(Ordering::SeqCst);
        eprintln!(
            "{} {} slides converted  {}",
            green("✔"),
            bold(&total_slides.to_string()),
            dim(&format!("({fallbacks} via fallback)")),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a deck; artifacts land in ./deck2svg-output
  deck2svg slides.pptx

  # Choose the output directory and session id
  deck2svg slides.pptx -o out --session q3-review

  # Convert from URL
  deck2svg https://example.com/decks/q3.pptx

  # Skip LibreOffice; synthesize every slide locally
  deck2svg --no-engine slides.pptx

  # Slide count and size only
  deck2svg --inspect-only slides.pptx

  # Full result document on stdout
  deck2svg --json slides.pptx > result.json

OUTPUT LAYOUT:
  <out>/slide-visuals/<session>/slides/slide_N.svg
  <out>/slide-visuals/<session>/thumbnails/slide_N.png
  <out>/processing-results/<session>/result.json

ENVIRONMENT VARIABLES:
  SOFFICE_PATH            Path to the LibreOffice `soffice` binary
  DECK2SVG_OUTPUT         Output directory
  DECK2SVG_BASE_URL       URL prefix for artifact links instead of file://
  RUST_LOG                Log filter (overrides -v / -q)

SETUP:
  Install LibreOffice for engine-quality SVG (optional):
    Debian/Ubuntu:  apt install libreoffice-impress
    macOS:          brew install --cask libreoffice
  Without it every slide is synthesized from the deck's XML.
"#;

/// Convert PowerPoint decks to per-slide SVG, thumbnails and positioned text.
#[derive(Parser, Debug)]
#[command(
    name = "deck2svg",
    version,
    about = "Convert PowerPoint decks to per-slide SVG, thumbnails and positioned text",
    long_about = "Convert .pptx decks (local files or URLs) into one SVG and one PNG thumbnail \
per slide plus a JSON document describing every text box's position and styling. Uses \
LibreOffice when available and a built-in synthesizer otherwise.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local .pptx file path or HTTP/HTTPS URL.
    input: String,

    /// Directory receiving the bucket trees.
    #[arg(short, long, env = "DECK2SVG_OUTPUT", default_value = "deck2svg-output")]
    output: PathBuf,

    /// Session id used in artifact paths. Default: the input's file stem.
    #[arg(long, env = "DECK2SVG_SESSION")]
    session: Option<String>,

    /// URL prefix for artifact links instead of file:// paths.
    #[arg(long, env = "DECK2SVG_BASE_URL")]
    base_url: Option<String>,

    /// Explicit path to `soffice`.
    #[arg(long, env = "SOFFICE_PATH")]
    soffice: Option<PathBuf>,

    /// Never run LibreOffice; synthesize every slide locally. Wins over --soffice.
    #[arg(long, env = "DECK2SVG_NO_ENGINE")]
    no_engine: bool,

    /// Reuse results of earlier conversions of the same deck from this directory.
    #[arg(long, env = "DECK2SVG_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// LibreOffice time limit in seconds.
    #[arg(long, env = "DECK2SVG_RENDER_TIMEOUT", default_value_t = 120)]
    render_timeout: u64,

    /// Longest thumbnail side in pixels (16–2000).
    #[arg(long, env = "DECK2SVG_THUMBNAIL_SIZE", default_value_t = 250,
          value_parser = clap::value_parser!(u32).range(16..=2000))]
    thumbnail_size: u32,

    /// Largest accepted deck in MiB.
    #[arg(long, env = "DECK2SVG_MAX_SIZE_MB", default_value_t = 50)]
    max_size_mb: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DECK2SVG_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the full result JSON on stdout.
    #[arg(long, env = "DECK2SVG_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DECK2SVG_NO_PROGRESS")]
    no_progress: bool,

    /// Print slide count and size only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DECK2SVG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DECK2SVG_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs when it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let source = DeckSource::parse(&cli.input);

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        let summary = inspect(&source, &config)
            .await
            .context("Failed to inspect deck")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
        } else {
            println!("File:         {}", cli.input);
            println!("Slides:       {}", summary.slide_count);
            println!(
                "Size:         {}x{} px ({}x{} EMU)",
                summary.width_px, summary.height_px, summary.width_emu, summary.height_emu
            );
            println!("Engine:       {}", engine_description(&cli));
        }
        return Ok(());
    }

    // ── Build config and service ─────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let mut storage = LocalStorage::new(&cli.output);
    if let Some(ref base) = cli.base_url {
        storage = storage.with_base_url(base);
    }
    let service = ConversionService::new(
        config,
        Arc::new(storage),
        Arc::new(InMemorySessionStore::new()),
    );
    let session_id = cli
        .session
        .clone()
        .unwrap_or_else(|| default_session_id(&cli.input));

    // ── Run conversion ───────────────────────────────────────────────────
    let receipt = service
        .submit(source, session_id.clone())
        .await
        .context("Failed to submit job")?;
    let job = service
        .wait(&receipt.job_id)
        .await
        .context("Failed to wait for job")?;

    if job.status != JobStatus::Completed {
        anyhow::bail!(
            "Conversion failed at '{}': {}",
            job.stage,
            job.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let result = service
        .get_result(&session_id)
        .await
        .context("Conversion finished without a result")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        println!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "{}  {} slides  ({} engine / {} fallback, {} shapes)  {}ms  →  {}",
            green("✔"),
            result.slide_count,
            result.stats.engine_slides,
            result.stats.fallback_slides,
            result.stats.total_shapes,
            result.stats.total_duration_ms,
            bold(&cli.output.display().to_string()),
        );
        if let Some(ref url) = job.result_ref {
            eprintln!("   result: {}", dim(url));
        }
    }

    Ok(())
}

/// Map CLI args to `ProcessingConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ProcessingConfig> {
    let mut builder = ProcessingConfig::builder()
        .render_timeout_secs(cli.render_timeout)
        .thumbnail_max_dim(cli.thumbnail_size)
        .max_file_size(cli.max_size_mb.saturating_mul(1024 * 1024))
        .download_timeout_secs(cli.download_timeout);

    if cli.no_engine {
        builder = builder.without_engine();
    } else if let Some(ref path) = cli.soffice {
        builder = builder.engine_path(path);
    }
    if let Some(ref dir) = cli.cache_dir {
        builder = builder.cache_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Which renderer a conversion with these arguments would use.
fn engine_description(cli: &Cli) -> String {
    if cli.no_engine {
        "disabled, slides are synthesized".to_string()
    } else if let Some(ref path) = cli.soffice {
        path.display().to_string()
    } else if soffice_locate::is_soffice_available() {
        "LibreOffice, found on this system".to_string()
    } else {
        "LibreOffice not found, slides are synthesized".to_string()
    }
}

/// File stem of the input, or of the URL's last segment.
fn default_session_id(input: &str) -> String {
    let last = input.rsplit('/').next().unwrap_or(input);
    let last = last.split(['?', '#']).next().unwrap_or(last);
    Path::new(last)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "deck".to_string())
}
