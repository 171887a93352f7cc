//! HTML parser for extracting links, navigation and page text
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from <a> tags and canonical links)
//! - Navigation, header and footer links used by discovery
//! - Page title
//! - Cleaned text with script, style, nav and footer markup stripped
//!
//! Parsing is synchronous and returns owned data only, so no parsed
//! document is ever held across an `.await`.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Elements whose content never counts as page text
const STRIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "footer", "svg", "iframe",
];

/// Elements that end a line of text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "main", "aside", "header", "li", "ul", "ol", "table",
    "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "br", "blockquote", "pre", "dd",
    "dt", "dl", "form", "hr",
];

const NAV_SELECTOR: &str = "nav a[href], header a[href], footer a[href], \
     [role='navigation'] a[href], .menu a[href], #menu a[href], .nav a[href]";

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// All links found on the page (absolute URLs)
    pub links: Vec<String>,

    /// Cleaned visible text, one block per line
    pub text: String,
}

/// Parses HTML content and extracts links, title and cleaned text
///
/// # Arguments
///
/// * `html` - The raw HTML content
/// * `base_url` - The URL relative links resolve against
///
/// # Returns
///
/// A ParsedPage with the title, absolute HTTP(S) links, and visible text
///
/// # Example
///
/// ```
/// use schedule_scout::crawler::parse_page;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_page(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_page(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, base_url),
        text: document_text(&document),
    }
}

/// Links inside navigation menus, headers and footers
///
/// # Arguments
///
/// * `html` - The raw HTML content
/// * `base_url` - The URL relative links resolve against
///
/// # Returns
///
/// Absolute links in document order; unfiltered, so callers apply the
/// site's link filter
pub fn extract_nav_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(NAV_SELECTOR) else {
        return Vec::new();
    };

    let mut links: Vec<String> = document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_link(href, base_url))
        .collect();
    links.dedup();
    links
}

/// Cleaned text of an HTML fragment or document
pub fn clean_text(html: &str) -> String {
    document_text(&Html::parse_document(html))
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

fn document_text(document: &Html) -> String {
    let mut raw = String::new();
    let body = Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next());
    match body {
        Some(body) => collect_text(body, &mut raw),
        None => collect_text(document.root_element(), &mut raw),
    }

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Appends the visible text under `element`, one line per block
pub(crate) fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.extend(text.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }));
                out.push(' ');
            }
            Node::Element(el) => {
                let name = el.name();
                if STRIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if BLOCK_ELEMENTS.contains(&name) {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Whether an element name is a block-level container
pub(crate) fn is_block_element(name: &str) -> bool {
    BLOCK_ELEMENTS.contains(&name)
}

pub(crate) fn is_stripped_element(name: &str) -> bool {
    STRIPPED_ELEMENTS.contains(&name)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None for `javascript:`, `mailto:`, `tel:` and `data:` links,
/// fragment-only links, and anything that is not HTTP(S) after resolution.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => {
            Some(absolute_url.to_string())
        }
        _ => None,
    }
}
