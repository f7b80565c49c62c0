//! Working directory selection for one agent call

use crate::config::{BridgeConfig, Environment};
use crate::path_rewriter::is_temp_path;
use std::path::{Component, Path, PathBuf};

/// Caller values that mean "no directory" when they arrive through a host bridge
const ABSENT_MARKERS: &[&str] = &["undefined", "null"];

/// Where the resolved directory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorySource {
    Requested,
    ProjectPath,
    CurrentDir,
    HomeDir,
    Fallback,
}

/// The directory chosen for a call; stable for the call's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory {
    pub path: PathBuf,
    pub source: DirectorySource,
}

/// Pick the effective working directory
///
/// Candidates in order: the caller's directory, the declared project path,
/// the current directory, the home directory. Temp directories are skipped
/// only when a project path is declared. The first candidate that exists as a
/// directory wins.
pub fn resolve(
    requested: Option<&str>,
    config: &BridgeConfig,
    environment: &Environment,
) -> WorkingDirectory {
    let project_path = environment.project_path().map(str::trim).filter(|p| !p.is_empty());
    let base = environment.current_dir();

    let requested = requested
        .map(str::trim)
        .filter(|p| !p.is_empty() && !ABSENT_MARKERS.contains(p));

    let candidates = [
        (requested.map(PathBuf::from), DirectorySource::Requested),
        (project_path.map(PathBuf::from), DirectorySource::ProjectPath),
        (base.map(Path::to_path_buf), DirectorySource::CurrentDir),
        (environment.home_dir().map(Path::to_path_buf), DirectorySource::HomeDir),
    ];

    for (candidate, source) in candidates {
        let Some(candidate) = candidate else {
            continue;
        };
        let path = absolutize(&candidate, base);

        if project_path.is_some() && is_temp_path(&path, &config.temp_path_prefixes) {
            tracing::debug!("Skipping temp directory candidate {}", path.display());
            continue;
        }
        if path.is_dir() {
            tracing::info!("Using working directory {} ({:?})", path.display(), source);
            return WorkingDirectory { path, source };
        }
        tracing::debug!("Working directory candidate {} does not exist", path.display());
    }

    let path = project_path
        .map(|p| absolutize(Path::new(p), base))
        .or_else(|| environment.home_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("/"));
    tracing::warn!("No candidate directory exists, falling back to {}", path.display());
    WorkingDirectory {
        path,
        source: DirectorySource::Fallback,
    }
}

/// Make the resolved directory the process working directory
///
/// Failure is logged and otherwise ignored.
pub fn enter(directory: &WorkingDirectory) -> bool {
    match std::env::set_current_dir(&directory.path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                "Failed to change directory to {}: {}",
                directory.path.display(),
                e
            );
            false
        }
    }
}

/// Directories the agent may access besides its cwd, deduplicated in order
pub fn additional_directories(cwd: &Path, environment: &Environment) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let declared = environment.project_paths().into_iter().map(PathBuf::from);
    for dir in std::iter::once(cwd.to_path_buf()).chain(declared) {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Lexically resolve `path` against `base`, removing `.` and `..` components
///
/// Without a base directory relative paths are anchored at the filesystem root.
fn absolutize(path: &Path, base: Option<&Path>) -> PathBuf {
    let joined = if path.is_relative() {
        base.unwrap_or_else(|| Path::new("/")).join(path)
    } else {
        path.to_path_buf()
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
