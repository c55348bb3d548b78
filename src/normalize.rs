use url::Url;

/// Produce the canonical form of a URL used as the crawler's dedup key:
/// lowercased scheme and host, default port dropped, query parameters
/// sorted, fragment removed, trailing slash stripped from non-root paths.
///
/// Returns the input unchanged when it does not parse as an absolute URL.
pub fn normalize_url(raw: &str) -> String {
    let parsed = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return raw.to_string(),
    };

    let scheme = parsed.scheme().to_ascii_lowercase();
    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();

    // Url::port() already reports None for the scheme's default port.
    let mut netloc = host;
    if let Some(port) = parsed.port() {
        netloc = format!("{netloc}:{port}");
    }

    let path = parsed.path();
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    let path = if path.is_empty() { "/" } else { path };

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let query = if pairs.is_empty() {
        String::new()
    } else {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            ser.append_pair(k, v);
        }
        format!("?{}", ser.finish())
    };

    format!("{scheme}://{netloc}{path}{query}")
}

/// Hostname of a URL, lowercased; empty when absent or unparsable.
pub fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment() {
        assert_eq!(
            normalize_url("https://example.com/page#section"),
            "https://example.com/page"
        );
    }

    #[test]
    fn strips_trailing_slash_except_root() {
        assert_eq!(
            normalize_url("https://example.com/page/"),
            "https://example.com/page"
        );
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
        assert_eq!(normalize_url("https://example.com"), "https://example.com/");
    }

    #[test]
    fn sorts_query_params_and_keeps_blank_values() {
        assert_eq!(
            normalize_url("https://example.com/p?b=2&a=1&c="),
            "https://example.com/p?a=1&b=2&c="
        );
    }

    #[test]
    fn drops_default_ports_only() {
        assert_eq!(
            normalize_url("https://example.com:443/x"),
            "https://example.com/x"
        );
        assert_eq!(
            normalize_url("http://example.com:80/x"),
            "http://example.com/x"
        );
        assert_eq!(
            normalize_url("http://example.com:8080/x"),
            "http://example.com:8080/x"
        );
    }

    #[test]
    fn lowercases_host() {
        assert_eq!(
            normalize_url("https://EXAMPLE.com/Path"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "https://Example.com:443/a/b/?z=1&a=2#frag",
            "http://example.com:8080/",
            "https://example.com/p?b=&a=1",
        ];
        for raw in inputs {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once);
        }
    }
}
