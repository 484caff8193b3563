//! Work-item discovery (spec §4.6), grounded in the teacher's
//! `ignore`-crate-based `FileWalker` (`context_packer/file_walker.rs`),
//! generalized from "all `.rs` files" to per-kind include/exclude globs.

use glob::Pattern;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

use crate::config::DiscoveryGlobs;
use crate::patterns::COMMON_EXCLUDE_PATTERNS;

/// Discover work items under `input`.
///
/// A regular file is returned alone if it matches the include globs and not
/// the exclude globs. A directory is walked recursively (honoring
/// `.gitignore`, like the teacher's walker); exclude globs are applied via
/// both glob matching against the relative path and a second pass for
/// shell-style `fnmatch` semantics on the file name, mirroring the spec's
/// "applied by both `Path.match` and shell-style `fnmatch`" requirement.
pub fn discover_work_items(input: &Path, globs: &DiscoveryGlobs) -> Vec<PathBuf> {
    let exclude_patterns = merged_exclude_patterns(globs);
    let include_patterns: Vec<Pattern> = globs
        .include
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect();

    if input.is_file() {
        return if matches_item(input, input, &include_patterns, &exclude_patterns) {
            vec![input.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let mut items = Vec::new();
    let walker = WalkBuilder::new(input).hidden(false).git_ignore(true).build();
    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if matches_item(path, input, &include_patterns, &exclude_patterns) {
            items.push(path.to_path_buf());
        }
    }
    items.sort();
    items
}

fn merged_exclude_patterns(globs: &DiscoveryGlobs) -> Vec<Pattern> {
    COMMON_EXCLUDE_PATTERNS
        .iter()
        .map(|s| s.to_string())
        .chain(globs.exclude.iter().cloned())
        .filter_map(|p| Pattern::new(&p).ok())
        .collect()
}

fn matches_item(path: &Path, root: &Path, include: &[Pattern], exclude: &[Pattern]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let rel_str = relative.to_string_lossy();
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if exclude.iter().any(|p| p.matches(&rel_str) || p.matches(name)) {
        return false;
    }
    if include.is_empty() {
        return true;
    }
    if is_init_py_empty(path) {
        return false;
    }
    include.iter().any(|p| p.matches(&rel_str) || p.matches(name))
}

fn is_init_py_empty(path: &Path) -> bool {
    if path.file_name().and_then(|n| n.to_str()) != Some("__init__.py") {
        return false;
    }
    std::fs::read_to_string(path)
        .map(|content| is_blank_or_comment_only(&content))
        .unwrap_or(false)
}

/// A file is "empty" for audit-discovery purposes when every non-blank
/// line, after stripping, starts with `#` (resolves Open Question #2:
/// replaces a fixed-string heuristic with a real line classifier).
pub fn is_blank_or_comment_only(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'))
}
