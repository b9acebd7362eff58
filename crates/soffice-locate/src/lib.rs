//! # soffice-locate
//!
//! Find an installed [LibreOffice](https://www.libreoffice.org/) `soffice`
//! binary so callers can run headless conversions without asking users to
//! configure a path by hand.
//!
//! ## How it works
//!
//! On the first call to [`locate_soffice`]:
//!
//! 1. Honours `SOFFICE_PATH` when it points at an executable file.
//! 2. Searches every directory on `PATH` for `soffice` / `libreoffice`.
//! 3. Probes the well-known install locations for the current platform.
//!
//! The first hit is cached for the lifetime of the process. A miss is not
//! cached, so installing LibreOffice while a service is running is picked up
//! on the next call.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use soffice_locate::{locate_soffice, profile_url};
//!
//! let soffice = locate_soffice().expect("LibreOffice not installed");
//! let profile = profile_url(std::path::Path::new("/tmp/job-42/profile"));
//! println!("{} -env:UserInstallation={profile}", soffice.display());
//! ```
//!
//! ## Platform support
//!
//! | OS      | Probed locations                                         |
//! |---------|----------------------------------------------------------|
//! | macOS   | `/Applications/LibreOffice.app`, `~/Applications/...`    |
//! | Linux   | `/usr/bin`, `/usr/lib/libreoffice`, `/opt/libreoffice*`, snap |
//! | Windows | `Program Files` and `Program Files (x86)`                |
//!
//! ## Environment variable overrides
//!
//! - `SOFFICE_PATH` — path to an existing `soffice` executable.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable that points directly at a `soffice` executable.
pub const ENV_OVERRIDE: &str = "SOFFICE_PATH";

/// Executable names searched on `PATH`, in order.
#[cfg(not(windows))]
const BINARY_NAMES: &[&str] = &["soffice", "libreoffice"];
#[cfg(windows)]
const BINARY_NAMES: &[&str] = &["soffice.exe", "soffice.com"];

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by soffice-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// No candidate location held an executable `soffice`.
    #[error("LibreOffice 'soffice' not found ({} locations searched). Install LibreOffice or set {ENV_OVERRIDE}.", searched.len())]
    NotFound { searched: Vec<PathBuf> },

    /// The given path exists but cannot be executed.
    #[error("'{path}' is not an executable file")]
    NotExecutable { path: PathBuf },
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns the path to an executable `soffice`, searching on first use.
///
/// # Thread safety
///
/// Safe to call from multiple threads simultaneously; concurrent first calls
/// may each search, and the first successful result wins.
pub fn locate_soffice() -> Result<PathBuf, LocateError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = locate_uncached()?;
    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Returns `true` when [`locate_soffice`] would succeed.
pub fn is_soffice_available() -> bool {
    locate_soffice().is_ok()
}

/// Search for `soffice` without consulting or filling the process cache.
pub fn locate_uncached() -> Result<PathBuf, LocateError> {
    let mut searched = Vec::new();

    // 1. Environment variable override.
    if let Some(env_path) = std::env::var_os(ENV_OVERRIDE) {
        let p = PathBuf::from(env_path);
        if is_executable(&p) {
            return Ok(p);
        }
        // Fall through: a stale override should not hide a system install.
        searched.push(p);
    }

    // 2. PATH lookup.
    if let Some(path_var) = std::env::var_os("PATH") {
        if let Some(found) = search_dirs(std::env::split_paths(&path_var), &mut searched) {
            return Ok(found);
        }
    }

    // 3. Well-known install locations.
    for candidate in platform_candidates() {
        if is_executable(&candidate) {
            return Ok(candidate);
        }
        searched.push(candidate);
    }

    Err(LocateError::NotFound { searched })
}

/// Validate an explicitly configured `soffice` path.
pub fn verify_soffice(path: &Path) -> Result<PathBuf, LocateError> {
    if is_executable(path) {
        Ok(path.to_path_buf())
    } else {
        Err(LocateError::NotExecutable {
            path: path.to_path_buf(),
        })
    }
}

/// Build the `file://` URL LibreOffice expects for `-env:UserInstallation`.
///
/// Each concurrent `soffice` process needs its own profile directory; two
/// instances sharing one profile block on its lock file.
pub fn profile_url(dir: &Path) -> String {
    let raw = dir.to_string_lossy().replace('\\', "/");
    let escaped = raw.replace(' ', "%20");
    if escaped.starts_with('/') {
        format!("file://{escaped}")
    } else {
        format!("file:///{escaped}")
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn search_dirs<I>(dirs: I, searched: &mut Vec<PathBuf>) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    for dir in dirs {
        for name in BINARY_NAMES {
            let candidate = dir.join(OsStr::new(name));
            if is_executable(&candidate) {
                return Some(candidate);
            }
            searched.push(candidate);
        }
    }
    None
}

fn platform_candidates() -> Vec<PathBuf> {
    let mut out = Vec::new();

    match std::env::consts::OS {
        "macos" => {
            out.push(PathBuf::from(
                "/Applications/LibreOffice.app/Contents/MacOS/soffice",
            ));
            if let Some(home) = dirs::home_dir() {
                out.push(home.join("Applications/LibreOffice.app/Contents/MacOS/soffice"));
            }
        }
        "windows" => {
            for var in ["ProgramFiles", "ProgramFiles(x86)"] {
                if let Some(base) = std::env::var_os(var) {
                    out.push(
                        PathBuf::from(base)
                            .join("LibreOffice")
                            .join("program")
                            .join("soffice.exe"),
                    );
                }
            }
        }
        _ => {
            out.push(PathBuf::from("/usr/bin/soffice"));
            out.push(PathBuf::from("/usr/local/bin/soffice"));
            out.push(PathBuf::from("/usr/lib/libreoffice/program/soffice"));
            out.push(PathBuf::from("/snap/bin/libreoffice"));
            // Vendor tarballs install as /opt/libreoffice7.6 etc.
            if let Ok(entries) = std::fs::read_dir("/opt") {
                let mut versioned: Vec<PathBuf> = entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .and_then(OsStr::to_str)
                            .is_some_and(|n| n.starts_with("libreoffice"))
                    })
                    .collect();
                // Newest first.
                versioned.sort();
                versioned.reverse();
                out.extend(versioned.into_iter().map(|p| p.join("program/soffice")));
            }
        }
    }

    out
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
