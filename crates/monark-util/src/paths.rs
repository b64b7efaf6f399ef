//! Repo-relative path helpers.
//!
//! Module directories are `/`-separated paths relative to the repository
//! root, with no leading or trailing slash. A versioned library lives in a
//! directory like `contrib/libs/foo/1.2`, whose *library* is the parent
//! `contrib/libs/foo` and whose *version* is the basename `1.2`.

/// Parent directory of a repo-relative path, or `""` for a top-level entry.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Last component of a repo-relative path.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// Component-wise prefix test: `a/b` is a prefix of `a/b` and `a/b/c`,
/// but not of `a/bc`.
pub fn is_prefix_of(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
