/// Checks if a host matches an allowed-domain pattern
///
/// Two forms are supported:
/// 1. Exact: "shop.example.com" matches only "shop.example.com"
/// 2. Wildcard: "*.example.com" matches "example.com" and any subdomain of it
///
/// Both arguments are expected to be lowercase already.
///
/// # Examples
///
/// ```
/// use storefront_crawler::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "www.example.com"));
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(!matches_wildcard("*.example.com", "cdn.example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Returns true if `host` matches any of the allowed-domain patterns
///
/// An empty pattern list allows every host.
pub fn matches_any(patterns: &[String], host: &str) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| matches_wildcard(p, host))
}
