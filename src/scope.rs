use regex::Regex;
use url::Url;

const STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf",
    ".eot", ".mp4", ".mp3", ".avi", ".zip", ".gz", ".tar", ".pdf", ".doc", ".docx", ".xls",
    ".xlsx",
];

/// Decides whether a URL stays within the defined scan scope.
#[derive(Debug)]
pub struct Scope {
    target_host: String,
    include_subdomains: bool,
    exclude_regexes: Vec<Regex>,
}

impl Scope {
    pub fn new(target_url: &str, include_subdomains: bool, exclude_patterns: &[String]) -> Self {
        let target_host = Url::parse(target_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .unwrap_or_default();
        let exclude_regexes = exclude_patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self {
            target_host,
            include_subdomains,
            exclude_regexes,
        }
    }

    pub fn is_in_scope(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return false,
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
        let host_ok = if self.include_subdomains {
            host == self.target_host || host.ends_with(&format!(".{}", self.target_host))
        } else {
            host == self.target_host
        };
        if !host_ok {
            return false;
        }

        let path = parsed.path().to_ascii_lowercase();
        if STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            return false;
        }

        !self.exclude_regexes.iter().any(|re| re.is_match(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_domain_in_scope() {
        let scope = Scope::new("https://example.com", false, &[]);
        assert!(scope.is_in_scope("https://example.com/page"));
        assert!(scope.is_in_scope("https://example.com/page?q=1"));
        assert!(scope.is_in_scope("http://example.com/page"));
    }

    #[test]
    fn foreign_domain_out_of_scope() {
        let scope = Scope::new("https://example.com", false, &[]);
        assert!(!scope.is_in_scope("https://evil.com/page"));
    }

    #[test]
    fn subdomains_gated_by_flag() {
        let strict = Scope::new("https://example.com", false, &[]);
        assert!(!strict.is_in_scope("https://sub.example.com/page"));

        let loose = Scope::new("https://example.com", true, &[]);
        assert!(loose.is_in_scope("https://sub.example.com/page"));
        // Suffix tricks must not slip through the subdomain rule.
        assert!(!loose.is_in_scope("https://notexample.com/page"));
    }

    #[test]
    fn static_resources_filtered() {
        let scope = Scope::new("https://example.com", false, &[]);
        assert!(!scope.is_in_scope("https://example.com/style.css"));
        assert!(!scope.is_in_scope("https://example.com/app.JS"));
        assert!(!scope.is_in_scope("https://example.com/image.png"));
        assert!(scope.is_in_scope("https://example.com/csstuff"));
    }

    #[test]
    fn exclude_patterns_apply_to_full_url() {
        let scope = Scope::new(
            "https://example.com",
            false,
            &["/logout".to_string(), "/admin.*".to_string()],
        );
        assert!(!scope.is_in_scope("https://example.com/logout"));
        assert!(!scope.is_in_scope("https://example.com/admin/users"));
        assert!(scope.is_in_scope("https://example.com/dashboard"));
    }

    #[test]
    fn non_http_schemes_rejected() {
        let scope = Scope::new("https://example.com", false, &[]);
        assert!(!scope.is_in_scope("ftp://example.com/file"));
        assert!(!scope.is_in_scope("javascript:alert(1)"));
    }
}
