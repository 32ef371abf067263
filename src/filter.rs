use crate::config::CrawlConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Second-level labels under which registrations happen one level deeper
/// (`example.co.uk`, `example.com.au`).
const SHARED_SECOND_LEVEL: &[&str] = &["co", "com", "net", "org", "gov", "edu", "ac", "or", "ne"];

/// Static assets that never yield crawlable pages
const ASSET_PATTERN: &str = r"(?i)\.(jpg|jpeg|png|gif|webp|css|js|ico|svg|woff|woff2|ttf|eot|pdf|zip|gz|mp3|mp4)$";

/// Canonical rewriting of URLs so equivalent addresses compare equal
#[derive(Debug, Clone, Copy)]
pub struct UrlNormalizer {
    /// Whether query parameters are sorted into a canonical order
    pub sort_query_params: bool,
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self {
            sort_query_params: true,
        }
    }
}

impl UrlNormalizer {
    pub fn new(sort_query_params: bool) -> Self {
        Self { sort_query_params }
    }

    /// Parse and normalize a URL string, returning `None` for anything that
    /// is not an absolute http(s) URL.
    pub fn normalize_str(&self, raw: &str) -> Option<Url> {
        let url = Url::parse(raw.trim()).ok()?;
        self.normalize(&url)
    }

    /// Normalize a parsed URL.
    ///
    /// Scheme and host are lower-cased and default ports removed by the
    /// parser itself. On top of that the fragment is dropped, a trailing
    /// slash is removed from non-root paths and, when enabled, query
    /// parameters are sorted.
    pub fn normalize(&self, url: &Url) -> Option<Url> {
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return None;
        }

        let mut normalized = url.clone();
        normalized.set_fragment(None);

        let path = normalized.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            normalized.set_path(path.trim_end_matches('/'));
            if normalized.path().is_empty() {
                normalized.set_path("/");
            }
        }

        match normalized.query() {
            Some("") => normalized.set_query(None),
            Some(query) if self.sort_query_params => {
                let mut params: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
                params.sort_unstable();
                let sorted = params.join("&");
                normalized.set_query(Some(&sorted));
            }
            _ => {}
        }

        Some(normalized)
    }
}

/// Registrable domain of a host: the part a registrant controls.
///
/// Uses the last two labels, or three when the second-to-last label is a
/// shared second level such as `co.uk`. IP addresses are returned as-is.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() || host.starts_with('[') {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let n = labels.len();
    let keep = if labels[n - 1].len() == 2 && SHARED_SECOND_LEVEL.contains(&labels[n - 2]) {
        3
    } else {
        2
    };
    labels[n - keep.min(n)..].join(".")
}

/// Configuration for URL filtering in crawlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlFilterConfig {
    /// Whether to allow crawling external domains/sites
    #[serde(default)]
    pub allow_external: bool,

    /// Registrable domain links must belong to unless external links are allowed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_domain: Option<String>,

    /// Regex patterns for URLs to include (if empty, all URLs are included unless excluded)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns for URLs to exclude (these take precedence over include patterns)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for UrlFilterConfig {
    fn default() -> Self {
        Self {
            allow_external: false,
            required_domain: None,
            include_patterns: Vec::new(),
            exclude_patterns: vec![ASSET_PATTERN.to_string()],
        }
    }
}

impl UrlFilterConfig {
    /// Build the filter configuration for a session rooted at `seed`
    pub fn for_session(seed: &Url, config: &CrawlConfig) -> Self {
        let mut exclude_patterns = vec![ASSET_PATTERN.to_string()];
        exclude_patterns.extend(config.exclude_patterns.iter().cloned());

        Self {
            allow_external: config.allow_external,
            required_domain: seed.host_str().map(registrable_domain),
            include_patterns: config.include_patterns.clone(),
            exclude_patterns,
        }
    }
}

/// Decides which discovered links are offered to the frontier
#[derive(Debug)]
pub struct UrlFilter {
    config: UrlFilterConfig,
    include_regexes: Vec<Regex>,
    exclude_regexes: Vec<Regex>,
}

impl UrlFilter {
    /// Create a new URL filter from configuration
    pub fn new(config: UrlFilterConfig) -> Result<Self, regex::Error> {
        let include_regexes = config
            .include_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude_regexes = config
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            include_regexes,
            exclude_regexes,
        })
    }

    /// Determine if a URL should be crawled based on all filtering rules
    pub fn should_crawl(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        if !self.is_in_domain_scope(url) {
            return false;
        }

        let url_str = url.as_str();
        if self.exclude_regexes.iter().any(|re| re.is_match(url_str)) {
            return false;
        }

        self.include_regexes.is_empty() || self.include_regexes.iter().any(|re| re.is_match(url_str))
    }

    /// Check if a URL is within the allowed domain scope
    fn is_in_domain_scope(&self, url: &Url) -> bool {
        if self.config.allow_external {
            return true;
        }

        match (&self.config.required_domain, url.host_str()) {
            (Some(required), Some(host)) => registrable_domain(host) == *required,
            // No domain to compare against: only external crawling admits it
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> Option<String> {
        UrlNormalizer::default()
            .normalize_str(raw)
            .map(|u| u.to_string())
    }

    #[test]
    fn test_normalize_basics() {
        assert_eq!(
            norm("HTTPS://Example.COM/path").as_deref(),
            Some("https://example.com/path")
        );
        assert_eq!(
            norm("https://example.com/page#section").as_deref(),
            Some("https://example.com/page")
        );
        assert_eq!(
            norm("https://example.com/path/").as_deref(),
            Some("https://example.com/path")
        );
        assert_eq!(
            norm("https://example.com/").as_deref(),
            Some("https://example.com/")
        );
    }

    #[test]
    fn test_normalize_removes_default_ports() {
        assert_eq!(
            norm("https://example.com:443/path").as_deref(),
            Some("https://example.com/path")
        );
        assert_eq!(
            norm("http://example.com:80/path").as_deref(),
            Some("http://example.com/path")
        );
        assert_eq!(
            norm("http://example.com:8080/path").as_deref(),
            Some("http://example.com:8080/path")
        );
    }

    #[test]
    fn test_query_order_is_a_policy() {
        let sorting = UrlNormalizer::new(true);
        let a = sorting.normalize_str("https://example.com/p?z=1&a=2").unwrap();
        let b = sorting.normalize_str("https://example.com/p?a=2&z=1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://example.com/p?a=2&z=1");

        let preserving = UrlNormalizer::new(false);
        let a = preserving.normalize_str("https://example.com/p?z=1&a=2").unwrap();
        let b = preserving.normalize_str("https://example.com/p?a=2&z=1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_non_http() {
        assert!(norm("ftp://example.com").is_none());
        assert!(norm("javascript:void(0)").is_none());
        assert!(norm("mailto:test@example.com").is_none());
        assert!(norm("/relative/path").is_none());
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("a.b.example.com"), "example.com");
        assert_eq!(registrable_domain("shop.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("127.0.0.1"), "127.0.0.1");
        assert_eq!(registrable_domain("localhost"), "localhost");
    }

    #[test]
    fn test_domain_restriction() {
        let seed = Url::parse("https://www.example.com/").unwrap();
        let config = CrawlConfig::new(seed.as_str());
        let filter = UrlFilter::new(UrlFilterConfig::for_session(&seed, &config)).unwrap();

        assert!(filter.should_crawl(&Url::parse("https://example.com/page").unwrap()));
        assert!(filter.should_crawl(&Url::parse("https://blog.example.com/post").unwrap()));
        assert!(!filter.should_crawl(&Url::parse("https://other.com/page").unwrap()));
        assert!(!filter.should_crawl(&Url::parse("https://example.com/logo.png").unwrap()));
    }

    #[test]
    fn test_allow_external() {
        let seed = Url::parse("https://example.com/").unwrap();
        let mut config = CrawlConfig::new(seed.as_str());
        config.allow_external = true;
        let filter = UrlFilter::new(UrlFilterConfig::for_session(&seed, &config)).unwrap();

        assert!(filter.should_crawl(&Url::parse("https://other.com/page").unwrap()));
    }

    #[test]
    fn test_regex_patterns() {
        let config = UrlFilterConfig {
            allow_external: true,
            required_domain: None,
            include_patterns: vec![r"/docs/.*\.html$".to_string()],
            exclude_patterns: vec![r"/docs/draft/".to_string()],
        };
        let filter = UrlFilter::new(config).unwrap();

        let included = Url::parse("https://example.com/docs/page.html").unwrap();
        assert!(filter.should_crawl(&included));

        let not_included = Url::parse("https://example.com/docs/page.txt").unwrap();
        assert!(!filter.should_crawl(&not_included));

        let excluded = Url::parse("https://example.com/docs/draft/page.html").unwrap();
        assert!(!filter.should_crawl(&excluded));
    }
}
