//! Return-path validation for login and logout redirects

use url::Url;

/// Check that `url` is a same-origin relative path.
///
/// The value is percent-decoded first so that `/%2F/evil.com` is caught the
/// same way as `//evil.com`. Backslashes are rejected because some browsers
/// treat them as forward slashes.
///
/// ```
/// use bnoidc::url_validation::validate_return_url;
///
/// assert!(validate_return_url("/"));
/// assert!(validate_return_url("/some-path?otherParam=value"));
/// assert!(!validate_return_url("https://evil.com"));
/// assert!(!validate_return_url("//evil.com"));
/// assert!(!validate_return_url("/%2F/evil.com"));
/// assert!(!validate_return_url("/\\evil.com"));
/// ```
pub fn validate_return_url(url: &str) -> bool {
    let Ok(decoded) = percent_encoding::percent_decode_str(url).decode_utf8() else {
        return false;
    };

    if !decoded.starts_with('/') || decoded.starts_with("//") {
        return false;
    }
    if decoded.contains("://") || decoded.contains('\\') {
        return false;
    }

    let Ok(base) = Url::parse("http://localhost") else {
        return false;
    };
    base.join(&decoded)
        .map(|joined| joined.host_str() == Some("localhost"))
        .unwrap_or(false)
}

/// Keep `candidate` when it is a safe return path, otherwise use `fallback`.
pub fn sanitize_return_to(candidate: Option<&str>, fallback: &str) -> String {
    match candidate {
        Some(path) if validate_return_url(path) => path.to_string(),
        Some(path) => {
            tracing::warn!("rejected unsafe return-to value: {path:?}");
            fallback.to_string()
        }
        None => fallback.to_string(),
    }
}
