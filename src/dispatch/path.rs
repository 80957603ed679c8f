/*!
 * Path Classification
 * Leading-component routing for path-based calls
 */

/// A path is backend-routed iff its first component, after an optional
/// leading separator, equals the configured backend prefix. Everything
/// else falls through to the fallback filesystem, including prefixes that
/// merely start with the configured string.
pub fn is_backend_path(prefix: &str, path: &str) -> bool {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.split_once('/') {
        Some((first, _)) => first == prefix,
        None => trimmed == prefix,
    }
}
