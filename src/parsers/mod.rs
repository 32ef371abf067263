use serde::{Deserialize, Serialize};

pub mod html;
pub mod text;


/// Enum to represent different types of content parsers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserType {
    /// HTML parser
    Html,
    /// Plain text parser (`text/*` other than HTML)
    Text,
    /// Binary or unknown content; nothing is extracted
    Other,
}

impl ParserType {
    /// Determines the parser type from the response content type, falling
    /// back to the URL when the server sent none
    pub fn from_content_type(content_type: Option<&str>, url: &str) -> Self {
        match content_type.map(|ct| ct.to_ascii_lowercase()) {
            Some(ct) if ct.contains("text/html") || ct.contains("xhtml") => ParserType::Html,
            Some(ct) if ct.starts_with("text/") => ParserType::Text,
            Some(ct) if !ct.trim().is_empty() => ParserType::Other,
            _ => Self::from_url(url),
        }
    }

    /// Guesses the parser type from the URL path alone
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
        if path.ends_with(".txt") || path.ends_with(".md") {
            ParserType::Text
        } else if path.ends_with(".pdf")
            || path.ends_with(".jpg")
            || path.ends_with(".jpeg")
            || path.ends_with(".png")
            || path.ends_with(".gif")
            || path.ends_with(".zip")
        {
            ParserType::Other
        } else {
            ParserType::Html
        }
    }
}

/// A raw link found in a document, not yet resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// Attribute value as written in the document
    pub href: String,
    /// Whether the anchor carried `rel="nofollow"`
    pub nofollow: bool,
}

/// Descriptive `<head>` metadata of an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// `<meta name="description">`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Comma-separated `<meta name="keywords">`, trimmed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// `<link rel="canonical">` target; absolute once the page is resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
}

/// Result of parsing content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    /// Document title, if any
    pub title: Option<String>,
    pub meta: PageMeta,
    /// Visible text, one block per line with whitespace collapsed
    pub lines: Vec<String>,
    /// Links in document order
    pub links: Vec<ExtractedLink>,
    /// Page-level `<meta name="robots" content="nofollow">`
    pub nofollow: bool,
}

impl ParseResult {
    /// Creates a result with text content only (no links)
    pub fn content_only(lines: Vec<String>) -> Self {
        Self {
            lines,
            ..Self::default()
        }
    }

    /// Extracted text as a single whitespace-normalized string
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// Line-oriented text used for change detection
    pub fn line_text(&self) -> String {
        self.lines.join("\n")
    }

    /// Links that may be followed under the given nofollow policy
    pub fn followable_links(&self, respect_nofollow: bool) -> impl Iterator<Item = &str> {
        let page_blocked = respect_nofollow && self.nofollow;
        self.links
            .iter()
            .filter(move |link| !page_blocked && !(respect_nofollow && link.nofollow))
            .map(|link| link.href.as_str())
    }
}

/// Main parser that delegates to specific format parsers
pub struct Parser;

impl Parser {
    /// Parse content based on the parser type
    pub fn parse(content: &str, parser_type: ParserType) -> ParseResult {
        match parser_type {
            ParserType::Html => html::parse(content),
            ParserType::Text => text::parse(content),
            ParserType::Other => ParseResult::default(),
        }
    }
}
