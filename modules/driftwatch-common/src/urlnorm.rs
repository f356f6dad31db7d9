use anyhow::Result;
use url::Url;

/// Canonicalize a URL for equality checks: lowercase scheme and host,
/// drop default ports, resolve `./` and `../` path segments, strip the
/// fragment, and trim the trailing slash. Query parameter order is
/// preserved, since reordering would alias distinct endpoints.
pub fn canonicalize_url(raw: &str) -> Result<String> {
    let mut parsed = Url::parse(raw.trim())?;

    // Remove fragment
    parsed.set_fragment(None);

    // Remove default ports (the parser handles http/https; keep the guard
    // for URLs carried through with an explicit default)
    if parsed.port() == Some(80) && parsed.scheme() == "http"
        || parsed.port() == Some(443) && parsed.scheme() == "https"
    {
        let _ = parsed.set_port(None);
    }

    let mut result = parsed.to_string();

    // Remove trailing slash (unless path is just "/")
    if result.ends_with('/') && parsed.path() != "/" {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(
            canonicalize_url("HTTP://Example.COM/Path").unwrap(),
            "http://example.com/Path"
        );
    }

    #[test]
    fn strips_default_ports() {
        assert_eq!(
            canonicalize_url("http://example.com:80/a").unwrap(),
            "http://example.com/a"
        );
        assert_eq!(
            canonicalize_url("https://example.com:443/a").unwrap(),
            "https://example.com/a"
        );
        // Non-default ports survive
        assert_eq!(
            canonicalize_url("http://example.com:8080/a").unwrap(),
            "http://example.com:8080/a"
        );
    }

    #[test]
    fn resolves_dot_segments() {
        assert_eq!(
            canonicalize_url("http://example.com/a/./b/../c").unwrap(),
            "http://example.com/a/c"
        );
        // `..` never climbs above the root
        assert_eq!(
            canonicalize_url("http://example.com/../../x").unwrap(),
            "http://example.com/x"
        );
    }

    #[test]
    fn preserves_query_order_and_drops_fragment() {
        assert_eq!(
            canonicalize_url("http://example.com/p?z=1&a=2#frag").unwrap(),
            "http://example.com/p?z=1&a=2"
        );
    }

    #[test]
    fn trims_trailing_slash_except_root() {
        assert_eq!(
            canonicalize_url("http://example.com/a/").unwrap(),
            "http://example.com/a"
        );
        assert_eq!(
            canonicalize_url("http://example.com/").unwrap(),
            "http://example.com/"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(canonicalize_url("not a url").is_err());
    }
}
