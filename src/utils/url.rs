//! URL helpers for building backend endpoints.
//!
//! Base URLs come from user configuration and may or may not carry trailing
//! slashes; endpoint paths may or may not carry leading ones.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use air4::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://127.0.0.1:8000/"), "http://127.0.0.1:8000");
/// assert_eq!(normalize_base_url("http://127.0.0.1:8000///"), "http://127.0.0.1:8000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them.
///
/// # Examples
///
/// ```
/// use air4::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://127.0.0.1:8000/", "/chat/stream"),
///     "http://127.0.0.1:8000/chat/stream"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Short `host[:port]` form of a base URL for user-facing messages.
///
/// # Examples
///
/// ```
/// use air4::utils::url::host_label;
///
/// assert_eq!(host_label("http://127.0.0.1:8000/api"), "127.0.0.1:8000");
/// ```
pub fn host_label(base_url: &str) -> String {
    let without_scheme = base_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(base_url);
    without_scheme
        .split('/')
        .next()
        .filter(|host| !host.is_empty())
        .unwrap_or(without_scheme)
        .to_string()
}
