//! Batch vector rendering: one LibreOffice run per deck.
//!
//! ## Why one run, and why all-or-nothing?
//!
//! Starting `soffice` costs seconds, so the whole deck is exported in a
//! single invocation and the produced files are mapped back to slides by
//! name order. That mapping is only trustworthy when the engine produced
//! exactly one file per slide; with any other count there is no way to tell
//! which slide a file belongs to, so the whole batch is discarded.
//!
//! Nothing in this module returns an error. An empty [`BatchRenderMap`] is
//! the only failure signal: the orchestrator then synthesizes every slide
//! locally. Each failure cause is logged at WARN.

use crate::config::ProcessingConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// LibreOffice filter producing SVG from Impress documents.
const SVG_FILTER: &str = "svg:impress_svg_Export";

/// Slide number → engine-produced SVG file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRenderMap {
    files: BTreeMap<usize, PathBuf>,
}

impl BatchRenderMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Map engine output files onto slides 1..=`slide_count`.
    ///
    /// Files are ordered by [`natural_cmp`] on their names. Any count other
    /// than `slide_count` yields an empty map.
    pub fn from_files(mut files: Vec<PathBuf>, slide_count: usize) -> Self {
        if files.len() != slide_count || slide_count == 0 {
            return Self::empty();
        }
        files.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
        Self {
            files: files
                .into_iter()
                .enumerate()
                .map(|(i, path)| (i + 1, path))
                .collect(),
        }
    }

    /// Engine file for a 1-indexed slide.
    pub fn get(&self, slide: usize) -> Option<&Path> {
        self.files.get(&slide).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

static NAME_TOKENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+|\D+").unwrap());

/// Compare names so that digit runs sort numerically: `deck9` < `deck10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ta = NAME_TOKENS.find_iter(a).map(|m| m.as_str());
    let mut tb = NAME_TOKENS.find_iter(b).map(|m| m.as_str());
    loop {
        match (ta.next(), tb.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u128>(), y.parse::<u128>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny).then_with(|| x.len().cmp(&y.len())),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ── Engine invocation ────────────────────────────────────────────────────

/// Why an engine run produced nothing usable. Logged, never returned.
#[derive(Debug, Error)]
enum EngineError {
    #[error("could not start '{engine}': {source}")]
    Spawn {
        engine: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {secs}s; process killed")]
    Timeout { secs: u64 },

    #[error("exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decide which `soffice` to run, if any.
///
/// An explicit `engine_path` wins and is verified; otherwise the binary is
/// searched for when `locate_engine` is set.
pub fn resolve_engine(config: &ProcessingConfig) -> Option<PathBuf> {
    if !config.engine_enabled() {
        debug!("Engine disabled by configuration");
        return None;
    }
    if let Some(ref path) = config.engine_path {
        return match soffice_locate::verify_soffice(path) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Configured engine unusable: {}", e);
                None
            }
        };
    }
    match soffice_locate::locate_soffice() {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

/// Export every slide of `deck_path` to SVG with one engine run.
///
/// Scratch output goes under `work_dir`, which the caller owns and removes.
pub async fn render_deck(
    deck_path: &Path,
    work_dir: &Path,
    slide_count: usize,
    config: &ProcessingConfig,
) -> BatchRenderMap {
    let Some(engine) = resolve_engine(config) else {
        info!("No rendering engine available; all slides use the fallback synthesizer");
        return BatchRenderMap::empty();
    };

    let out_dir = work_dir.join("engine-svg");
    let profile_dir = work_dir.join("engine-profile");
    let start = Instant::now();

    if let Err(e) = run_engine(
        &engine,
        deck_path,
        &out_dir,
        &profile_dir,
        config.render_timeout_secs,
    )
    .await
    {
        warn!("Engine render failed, all slides use the fallback: {}", e);
        return BatchRenderMap::empty();
    }

    let files = match collect_svg_files(&out_dir).await {
        Ok(files) => files,
        Err(e) => {
            warn!("Cannot list engine output in {}: {}", out_dir.display(), e);
            return BatchRenderMap::empty();
        }
    };

    let produced = files.len();
    let map = BatchRenderMap::from_files(files, slide_count);
    if map.is_empty() {
        warn!(
            produced,
            expected = slide_count,
            "Engine output does not match slide count; discarding batch"
        );
    } else {
        info!(
            slides = map.len(),
            "Engine rendered deck in {}ms",
            start.elapsed().as_millis()
        );
    }
    map
}

async fn run_engine(
    engine: &Path,
    deck_path: &Path,
    out_dir: &Path,
    profile_dir: &Path,
    timeout_secs: u64,
) -> Result<(), EngineError> {
    tokio::fs::create_dir_all(out_dir).await?;
    tokio::fs::create_dir_all(profile_dir).await?;

    let mut cmd = Command::new(engine);
    cmd.arg("--headless")
        .arg("--invisible")
        .arg("--nodefault")
        .arg("--norestore")
        .arg("--nolockcheck")
        .arg(format!(
            "-env:UserInstallation={}",
            soffice_locate::profile_url(profile_dir)
        ))
        .arg("--convert-to")
        .arg(SVG_FILTER)
        .arg("--outdir")
        .arg(out_dir)
        .arg(deck_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the child on timeout kills it.
        .kill_on_drop(true);

    debug!("Running {:?}", cmd.as_std());

    let child = cmd.spawn().map_err(|source| EngineError::Spawn {
        engine: engine.to_path_buf(),
        source,
    })?;

    let output = match tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        child.wait_with_output(),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => return Err(EngineError::Timeout { secs: timeout_secs }),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::Failed {
            status: output.status.to_string(),
            stderr: stderr.trim().chars().take(500).collect(),
        });
    }
    Ok(())
}

async fn collect_svg_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_svg = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
        if is_svg && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}
