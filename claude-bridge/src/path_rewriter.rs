//! Relocation of sandboxed temp paths into the project root
//!
//! The agent sometimes addresses files under a throwaway temp directory while
//! the user expects edits to land in the project. Every string `file_path`
//! field found anywhere in a tool input that starts with a temp prefix is
//! rewritten to the same relative suffix under the project root.

use serde_json::Value;
use std::path::{Path, PathBuf};

/// The field name that marks a value as a rewritable path
const FILE_PATH_FIELD: &str = "file_path";

/// Rewrites recorded while processing one tool input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// `(from, to)` pairs in traversal order
    pub rewrites: Vec<(String, String)>,
}

impl RewriteReport {
    pub fn changed(&self) -> bool {
        !self.rewrites.is_empty()
    }
}

/// Strip the longest matching temp prefix from `path`
///
/// Matching is component-aware: `/tmpfoo` is not under `/tmp`. Returns the
/// remainder after the prefix, which may be empty or start with `/`.
pub fn strip_temp_prefix<'a>(path: &'a str, prefixes: &[String]) -> Option<&'a str> {
    let mut best: Option<(usize, &'a str)> = None;
    for prefix in prefixes {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            continue;
        }
        let Some(rest) = path.strip_prefix(prefix) else {
            continue;
        };
        if !(rest.is_empty() || rest.starts_with('/')) {
            continue;
        }
        if best.map_or(true, |(len, _)| prefix.len() > len) {
            best = Some((prefix.len(), rest));
        }
    }
    best.map(|(_, rest)| rest)
}

/// Whether `path` lives under any of the temp prefixes
pub fn is_temp_path(path: &Path, prefixes: &[String]) -> bool {
    path.to_str()
        .map(|p| strip_temp_prefix(p, prefixes).is_some())
        .unwrap_or(false)
}

/// Rewrites temp-directory `file_path` values in tool inputs
#[derive(Debug, Clone)]
pub struct PathRewriter {
    project_root: Option<PathBuf>,
    temp_prefixes: Vec<String>,
}

impl PathRewriter {
    pub fn new(project_root: Option<PathBuf>, temp_prefixes: Vec<String>) -> Self {
        Self {
            project_root,
            temp_prefixes,
        }
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Rewrite `input` in place and report what changed
    pub fn rewrite(&self, tool_name: &str, input: &mut Value) -> RewriteReport {
        let mut report = RewriteReport::default();
        let Some(root) = self.project_root.as_deref() else {
            return report;
        };

        self.visit(root, input, &mut report);

        for (from, to) in &report.rewrites {
            tracing::info!("Rewrote {} path for {}: {} -> {}", FILE_PATH_FIELD, tool_name, from, to);
        }
        report
    }

    fn visit(&self, root: &Path, value: &mut Value, report: &mut RewriteReport) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    if key == FILE_PATH_FIELD {
                        if let Value::String(path) = child {
                            if let Some(relocated) = self.relocate(root, path) {
                                report.rewrites.push((path.clone(), relocated.clone()));
                                *path = relocated;
                            }
                            continue;
                        }
                    }
                    self.visit(root, child, report);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.visit(root, item, report);
                }
            }
            _ => {}
        }
    }

    fn relocate(&self, root: &Path, path: &str) -> Option<String> {
        let rest = strip_temp_prefix(path, &self.temp_prefixes)?;
        let suffix = rest.trim_start_matches('/');
        let suffix = if suffix.is_empty() {
            Path::new(path).file_name()?.to_str()?
        } else {
            suffix
        };
        Some(root.join(suffix).to_string_lossy().into_owned())
    }
}
