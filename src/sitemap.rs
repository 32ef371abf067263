//! XML sitemap discovery used to seed the frontier.

use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;

/// Nesting of sitemap indexes followed below a root sitemap
pub const MAX_INDEX_DEPTH: u32 = 3;

/// Page URLs taken from all sitemaps of a session
pub const MAX_SITEMAP_URLS: usize = 1000;

static LOC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<loc>\s*(?:<!\[CDATA\[)?\s*(.*?)\s*(?:\]\]>)?\s*</loc>")
        .expect("static regex is valid")
});

static SITEMAP_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<sitemapindex[\s>]").expect("static regex is valid"));

/// Contents of one sitemap file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: locations of further sitemaps
    Index(Vec<String>),
    /// `<urlset>`: page locations
    UrlSet(Vec<String>),
}

/// Extract `<loc>` entries; tolerant of namespaces and malformed XML
pub fn parse(content: &str) -> SitemapDocument {
    let locs: Vec<String> = LOC
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| unescape(m.as_str()))
        .filter(|loc| loc.starts_with("http://") || loc.starts_with("https://"))
        .collect();

    if SITEMAP_INDEX.is_match(content) {
        SitemapDocument::Index(locs)
    } else {
        SitemapDocument::UrlSet(locs)
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Fetch sitemaps breadth-first, following indexes up to
/// [`MAX_INDEX_DEPTH`] levels, and return at most `limit` page URLs.
pub async fn collect_urls(client: &reqwest::Client, roots: &[String], limit: usize) -> Vec<String> {
    let mut queue: VecDeque<(String, u32)> = roots.iter().map(|r| (r.clone(), 0)).collect();
    let mut visited: HashSet<String> = HashSet::new();
    let mut pages = Vec::new();

    while let Some((sitemap_url, depth)) = queue.pop_front() {
        if pages.len() >= limit {
            break;
        }
        if !visited.insert(sitemap_url.clone()) {
            continue;
        }

        let Some(body) = fetch(client, &sitemap_url).await else {
            continue;
        };

        match parse(&body) {
            SitemapDocument::Index(children) => {
                if depth >= MAX_INDEX_DEPTH {
                    ::log::debug!("Sitemap index {} nested too deep, skipping", sitemap_url);
                    continue;
                }
                queue.extend(children.into_iter().map(|child| (child, depth + 1)));
            }
            SitemapDocument::UrlSet(locs) => {
                ::log::debug!("Sitemap {} lists {} URLs", sitemap_url, locs.len());
                let room = limit - pages.len();
                pages.extend(locs.into_iter().take(room));
            }
        }
    }

    ::log::info!("Collected {} URLs from sitemaps", pages.len());
    pages
}

async fn fetch(client: &reqwest::Client, url: &str) -> Option<String> {
    let response = match client.get(url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            ::log::debug!("Sitemap {} returned {}", url, response.status());
            return None;
        }
        Err(e) => {
            ::log::debug!("Sitemap {} unavailable: {}", url, e);
            return None;
        }
    };
    response.text().await.ok()
}
