//! Path utilities for the remote workspace tree.
//!
//! Paths handled here are *logical* paths inside a workspace root, always
//! separated by `/` regardless of the host platform. The canonical form has
//! no leading or trailing separator and no empty components, so the root of
//! the workspace is the empty string. Every path comparison in the crate goes
//! through [`normalize`].

use std::path::PathBuf;

/// Path separator used on the wire and in canonical paths.
pub const SEPARATOR: char = '/';

/// Canonicalize a logical path.
///
/// Collapses repeated separators and strips leading/trailing ones:
/// - `/a//b/` -> `a/b`
/// - `a/b` -> `a/b`
/// - `/` -> `` (root)
///
/// Backslashes are treated as separators as well, since Windows servers may
/// report them.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for component in path
        .split(|c| c == SEPARATOR || c == '\\')
        .filter(|c| !c.is_empty())
    {
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(component);
    }
    out
}

/// Canonicalize a workspace root as understood by the server.
///
/// Roots are opaque server-side locations, so unlike [`normalize`] a leading
/// separator is kept: `/home//me/proj/` -> `/home/me/proj`.
pub fn normalize_root(root: &str) -> String {
    let trimmed = root.trim();
    let inner = normalize(trimmed);
    if trimmed.starts_with(SEPARATOR) {
        format!("{SEPARATOR}{inner}")
    } else {
        inner
    }
}

/// Compose a child path. A `None` (or root) parent yields the root-relative `name`.
pub fn join(parent: Option<&str>, name: &str) -> String {
    match parent.map(normalize) {
        Some(parent) if !parent.is_empty() => normalize(&format!("{parent}/{name}")),
        _ => normalize(name),
    }
}

/// The parent of `path`, or the root (empty string) for top-level entries.
pub fn parent_of(path: &str) -> String {
    let path = normalize(path);
    match path.rfind(SEPARATOR) {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

/// Last component of `path` (empty for the root).
pub fn file_name(path: &str) -> String {
    let path = normalize(path);
    match path.rfind(SEPARATOR) {
        Some(idx) => path[idx + 1..].to_string(),
        None => path,
    }
}

/// True if `path` equals `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    let path = normalize(path);
    let ancestor = normalize(ancestor);
    if ancestor.is_empty() || path == ancestor {
        return true;
    }
    path.strip_prefix(&ancestor)
        .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

/// Replace the `from` prefix of `path` with `to`.
///
/// Returns `None` when `path` is not within `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_within(path, from) {
        return None;
    }
    let path = normalize(path);
    let from = normalize(from);
    let rest = path[from.len()..].trim_start_matches(SEPARATOR);
    Some(join(Some(to), rest))
}

/// Leading-slash form the server expects in URLs and request bodies (`/a/b`).
pub fn to_wire(path: &str) -> String {
    format!("{SEPARATOR}{}", normalize(path))
}

/// Expand tilde (~) in a local filesystem path to the user's home directory.
///
/// If the home directory cannot be determined, the path is returned unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(suffix) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(suffix.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}
