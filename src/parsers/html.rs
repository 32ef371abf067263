use crate::parsers::text::collapse_whitespace;
use crate::parsers::{ExtractedLink, PageMeta, ParseResult};
use scraper::{Html, Node, Selector};
use std::sync::LazyLock;

/// Elements whose text is never part of the visible content
const IGNORED_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "iframe", "canvas",
];

/// Link schemes that never lead to a crawlable page
const SKIPPED_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "#"];

static META_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("meta[name]"));

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// Parses HTML content to extract title, visible text and links
pub fn parse(html: &str) -> ParseResult {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&selector("title"))
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let lines = visible_lines(&doc);
    let links = extract_links(&doc);
    let nofollow = meta_content(&doc, "robots")
        .any(|content| content.to_ascii_lowercase().contains("nofollow"));

    ::log::debug!("HTML parser found {} links", links.len());

    ParseResult {
        title,
        meta: extract_meta(&doc),
        lines,
        links,
        nofollow,
    }
}

/// `content` of every `<meta name=...>` with the given name, case-insensitive
fn meta_content<'a>(doc: &'a Html, name: &'static str) -> impl Iterator<Item = &'a str> + 'a {
    doc.select(&META_SELECTOR)
        .filter(move |meta| {
            meta.value()
                .attr("name")
                .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
        })
        .filter_map(|meta| meta.value().attr("content"))
}

fn extract_meta(doc: &Html) -> PageMeta {
    let description = meta_content(doc, "description")
        .map(collapse_whitespace)
        .find(|d| !d.is_empty());

    let keywords = meta_content(doc, "keywords")
        .next()
        .map(|content| {
            content
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let canonical_url = doc
        .select(&selector("link[rel][href]"))
        .find(|link| {
            link.value()
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")))
        })
        .and_then(|link| link.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string);

    PageMeta {
        description,
        keywords,
        canonical_url,
    }
}

/// One line per non-empty text node outside ignored elements
fn visible_lines(doc: &Html) -> Vec<String> {
    doc.root_element()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some((node, text)),
            _ => None,
        })
        .filter(|(node, _)| {
            !node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| IGNORED_ELEMENTS.contains(&el.name()))
            })
        })
        .map(|(_, text)| collapse_whitespace(text))
        .filter(|line| !line.is_empty())
        .collect()
}

/// Anchors and frame sources in document order
fn extract_links(doc: &Html) -> Vec<ExtractedLink> {
    doc.select(&selector("a[href], frame[src], iframe[src]"))
        .filter_map(|el| {
            let value = el.value();
            let href = value.attr("href").or_else(|| value.attr("src"))?.trim();
            let lowered = href.to_ascii_lowercase();
            if href.is_empty() || SKIPPED_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
                return None;
            }

            let nofollow = value
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("nofollow")));

            Some(ExtractedLink {
                href: href.to_string(),
                nofollow,
            })
        })
        .collect()
}
