//! robots.txt fetching, parsing and per-host caching.
//!
//! Rules are fetched once per origin and kept for the session. A failed
//! fetch (timeout, non-2xx, unreadable body) caches an allow-all ruleset.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

/// Longest `Crawl-delay` honored; larger values are clamped to this
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(60);

/// One `User-agent` group of a robots.txt file
#[derive(Debug, Clone, Default, PartialEq)]
struct Group {
    agents: Vec<String>,
    allow: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<Duration>,
}

/// Parsed robots.txt ruleset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsRules {
    groups: Vec<Group>,
    sitemaps: Vec<String>,
}

impl RobotsRules {
    /// Rules that allow everything with no crawl delay
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt content
    pub fn parse(content: &str) -> Self {
        let mut rules = Self::default();
        let mut current: Option<Group> = None;
        // Consecutive user-agent lines share one group
        let mut collecting_agents = false;

        for raw_line in content.lines() {
            let line = raw_line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        if let Some(group) = current.take() {
                            rules.groups.push(group);
                        }
                        current = Some(Group::default());
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                    collecting_agents = true;
                }
                "allow" | "disallow" | "crawl-delay" => {
                    collecting_agents = false;
                    // Rules before any user-agent line belong to no group
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    match directive.as_str() {
                        "allow" if !value.is_empty() => group.allow.push(value.to_string()),
                        "disallow" if !value.is_empty() => group.disallow.push(value.to_string()),
                        "crawl-delay" => {
                            if let Some(delay) = parse_crawl_delay(value) {
                                group.crawl_delay = Some(delay);
                            }
                        }
                        _ => {}
                    }
                }
                "sitemap" => {
                    // Sitemap lines are global and do not end an agent list
                    if !value.is_empty() {
                        rules.sitemaps.push(value.to_string());
                    }
                }
                _ => {
                    collecting_agents = false;
                }
            }
        }

        if let Some(group) = current {
            rules.groups.push(group);
        }
        rules
    }

    /// Groups that apply to `user_agent`: the most specific named match, or `*`
    fn groups_for(&self, user_agent: &str) -> Vec<&Group> {
        let ua = user_agent.to_ascii_lowercase();
        let product = ua.split('/').next().unwrap_or_default().trim().to_string();

        let best_len = self
            .groups
            .iter()
            .flat_map(|g| g.agents.iter())
            .filter(|agent| agent.as_str() != "*" && !agent.is_empty())
            .filter(|agent| ua.contains(agent.as_str()) || product == agent.as_str())
            .map(|agent| agent.len())
            .max();

        match best_len {
            Some(len) => self
                .groups
                .iter()
                .filter(|g| {
                    g.agents.iter().any(|agent| {
                        agent.len() == len
                            && agent != "*"
                            && (ua.contains(agent.as_str()) || product == *agent)
                    })
                })
                .collect(),
            None => self
                .groups
                .iter()
                .filter(|g| g.agents.iter().any(|agent| agent == "*"))
                .collect(),
        }
    }

    /// Check whether `path` (path plus optional query) may be fetched
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        let mut longest_allow: Option<usize> = None;
        let mut longest_disallow: Option<usize> = None;

        for group in self.groups_for(user_agent) {
            for pattern in &group.allow {
                if path_matches(path, pattern) {
                    longest_allow = longest_allow.max(Some(pattern.len()));
                }
            }
            for pattern in &group.disallow {
                if path_matches(path, pattern) {
                    longest_disallow = longest_disallow.max(Some(pattern.len()));
                }
            }
        }

        // Longer match wins; if equal, allow wins
        match (longest_allow, longest_disallow) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }

    /// Crawl delay declared for `user_agent`
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.groups_for(user_agent)
            .into_iter()
            .filter_map(|g| g.crawl_delay)
            .max()
    }

    /// Sitemap URLs listed in the file
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// Match a path against a robots.txt pattern supporting `*` and a trailing `$`
/// Parse a `Crawl-delay` value, ignoring garbage and clamping huge values
fn parse_crawl_delay(value: &str) -> Option<Duration> {
    let secs = value.parse::<f64>().ok()?;
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    let delay = Duration::try_from_secs_f64(secs).unwrap_or(MAX_CRAWL_DELAY);
    Some(delay.min(MAX_CRAWL_DELAY))
}

fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    if !pattern.contains('*') {
        return if anchored {
            path == pattern
        } else {
            path.starts_with(pattern)
        };
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !path.starts_with(part) {
                return false;
            }
            pos = part.len();
            continue;
        }
        // The final piece of an anchored pattern must sit at the very end
        if anchored && i == parts.len() - 1 {
            return path.len() >= pos + part.len() && path.ends_with(part);
        }
        match path[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    // Trailing `*` (or an anchored pattern ending in `*`) matches the rest
    !anchored || pattern.ends_with('*') || pos == path.len()
}

/// Origin key (`scheme://host:port`) used for robots and pacing state
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Per-session robots.txt cache
#[derive(Debug)]
pub struct RobotsPolicy {
    client: reqwest::Client,
    user_agent: String,
    cache: DashMap<String, Arc<OnceCell<Arc<RobotsRules>>>>,
}

impl RobotsPolicy {
    pub fn new(client: reqwest::Client, user_agent: &str) -> Self {
        Self {
            client,
            user_agent: user_agent.to_string(),
            cache: DashMap::new(),
        }
    }

    /// Whether `url` may be fetched by `user_agent`.
    ///
    /// The first query for a host fetches its robots.txt; concurrent queries
    /// for the same host wait on that single fetch.
    pub async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        let rules = self.rules_for(url).await;
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        rules.is_allowed(&path, user_agent)
    }

    /// Crawl delay for an origin whose rules are already cached
    pub fn crawl_delay(&self, host: &str) -> Option<Duration> {
        let cell = self.cache.get(host)?.value().clone();
        cell.get().and_then(|rules| rules.crawl_delay(&self.user_agent))
    }

    /// Cached or freshly fetched rules for the origin of `url`
    pub async fn rules_for(&self, url: &Url) -> Arc<RobotsRules> {
        let key = origin_key(url);
        let cell = self
            .cache
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        cell.get_or_init(|| async { Arc::new(self.fetch_rules(&key).await) })
            .await
            .clone()
    }

    async fn fetch_rules(&self, origin: &str) -> RobotsRules {
        let robots_url = format!("{origin}/robots.txt");
        ::log::debug!("Fetching {}", robots_url);

        let response = match self.client.get(&robots_url).send().await {
            Ok(response) => response,
            Err(e) => {
                ::log::info!("robots.txt unavailable at {}: {}, allowing all", robots_url, e);
                return RobotsRules::allow_all();
            }
        };

        if !response.status().is_success() {
            ::log::debug!(
                "robots.txt at {} returned {}, allowing all",
                robots_url,
                response.status()
            );
            return RobotsRules::allow_all();
        }

        match response.text().await {
            Ok(body) => RobotsRules::parse(&body),
            Err(e) => {
                ::log::info!("Unreadable robots.txt at {}: {}, allowing all", robots_url, e);
                RobotsRules::allow_all()
            }
        }
    }
}
