use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::SelectorConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterLink {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct ParsedChapter {
    pub title: String,
    pub content: String,
}

static BOOK_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"/novels/(\d+)-", r"/chapters/(\d+)", r"/(\d+)"]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("book id regex"))
        .collect()
});

pub fn extract_book_id_from_url(url: &str) -> Option<String> {
    for pattern in BOOK_ID_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(url) {
            if let Some(id) = captures.get(1) {
                return Some(id.as_str().to_owned());
            }
        }
    }
    None
}

/// Extract chapter links from a rendered list page. Tries the configured
/// selector chain first, then falls back to scanning every anchor that looks
/// like a chapter of this book. Also returns the rendered next-page link, if
/// any.
pub fn parse_chapter_list(
    html: &str,
    base_url: &str,
    selectors: &SelectorConfig,
) -> (Vec<ChapterLink>, Option<String>) {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let mut elements: Vec<ElementRef> = Vec::new();
    for raw in &selectors.chapter_links {
        let Ok(selector) = Selector::parse(raw) else {
            tracing::warn!(selector = %raw, "invalid chapter link selector; skipping");
            continue;
        };
        elements = document.select(&selector).collect();
        if !elements.is_empty() {
            tracing::debug!(selector = %raw, count = elements.len(), "chapter links matched");
            break;
        }
    }

    if elements.is_empty() {
        elements = fallback_link_scan(&document, base_url);
        if !elements.is_empty() {
            tracing::debug!(count = elements.len(), "chapter links matched via fallback scan");
        }
    }

    let mut links = Vec::new();
    for element in elements {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let title = element.text().collect::<String>().trim().to_owned();
        if href.is_empty() || title.is_empty() {
            continue;
        }
        if href.to_ascii_lowercase().contains("page=") || href.contains("#comment") {
            continue;
        }
        let Some(url) = absolutize(base.as_ref(), href) else {
            continue;
        };
        links.push(ChapterLink { url, title });
    }

    let next_page_url = find_next_page(&document, base.as_ref());

    (links, next_page_url)
}

static CHAPTER_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\d+\.html").expect("chapter href regex"));

fn fallback_link_scan<'a>(document: &'a Html, base_url: &str) -> Vec<ElementRef<'a>> {
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let book_id = extract_book_id_from_url(base_url);

    if let Some(book_id) = &book_id {
        let matched: Vec<ElementRef> = document
            .select(&anchors)
            .filter(|el| {
                let href = el.value().attr("href").unwrap_or_default();
                href.contains(book_id.as_str())
                    && CHAPTER_HREF.is_match(href)
                    && !href.contains("page=")
                    && !href.contains("#comment")
            })
            .collect();
        if !matched.is_empty() {
            return matched;
        }
    }

    document
        .select(&anchors)
        .filter(|el| {
            let href = el.value().attr("href").unwrap_or_default();
            href.contains("/chapters/") && !href.contains("page")
        })
        .collect()
}

fn find_next_page(document: &Html, base: Option<&Url>) -> Option<String> {
    let selector = Selector::parse("div.pagination a, div.navigation a").ok()?;
    let last = document.select(&selector).last()?;
    if last.value().classes().any(|class| class == "disabled") {
        return None;
    }
    let href = last.value().attr("href")?;
    if href.is_empty() {
        return None;
    }
    absolutize(base, href)
}

fn absolutize(base: Option<&Url>, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_owned());
    }
    base.and_then(|base| base.join(href).ok())
        .map(|url| url.to_string())
}

static EMBEDDED_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)window\.__DATA__\s*=\s*(\{.+?\})\s*</script>").expect("embedded data regex")
});
static PAGE_HREF_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/page/(\d+)").expect("page href regex"));
static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("leading number regex"));

/// Total list-page count from the first page: the script-emitted
/// `window.__DATA__` blob, then rendered pagination controls, then 1.
pub fn detect_total_pages(html: &str) -> u32 {
    if let Some(captures) = EMBEDDED_DATA.captures(html) {
        if let Ok(data) = serde_json::from_str::<serde_json::Value>(&captures[1]) {
            if let Some(count) = data.get("pages_count").and_then(|v| v.as_u64()) {
                if count > 0 {
                    return count as u32;
                }
            }
        }
    }

    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse("div.pages a[href]") {
        let max_page = document
            .select(&selector)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| PAGE_HREF_NUMBER.captures(href))
            .filter_map(|captures| captures[1].parse::<u32>().ok())
            .max()
            .unwrap_or(1);
        if max_page > 1 {
            return max_page;
        }
    }

    if let Ok(selector) = Selector::parse("div.pagination a, div.navigation a") {
        let max_page = document
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .filter_map(|text| {
                LEADING_NUMBER
                    .find(&text)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
            })
            .max()
            .unwrap_or(1);
        if max_page > 1 {
            return max_page;
        }
    }

    1
}

/// Title and raw text content of a chapter page, with fallback strategies:
/// configured content selectors, then common main-content containers, then
/// the largest text block on the page.
pub fn parse_chapter_content(html: &str, selectors: &SelectorConfig) -> ParsedChapter {
    let document = Html::parse_document(html);

    let title = extract_title(&document, selectors);
    let content = extract_content(&document, selectors);

    ParsedChapter { title, content }
}

pub fn detect_book_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for raw in ["h1.title", "h1", "title"] {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = element.text().collect::<String>().trim().to_owned();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn extract_title(document: &Html, selectors: &SelectorConfig) -> String {
    for raw in &selectors.chapter_title {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = element.text().collect::<String>().trim().to_owned();
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

// A block shorter than this is assumed to be navigation, not chapter prose.
const MIN_CONTENT_LEN: usize = 100;

fn extract_content(document: &Html, selectors: &SelectorConfig) -> String {
    for raw in selectors
        .chapter_content
        .iter()
        .chain(selectors.content_fallbacks.iter())
    {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = element_text(element);
            if text.len() > MIN_CONTENT_LEN {
                return text;
            }
        }
    }

    let Ok(blocks) = Selector::parse("div, article, section") else {
        return String::new();
    };
    let largest = document
        .select(&blocks)
        .map(element_text)
        .max_by_key(String::len)
        .unwrap_or_default();

    if largest.len() > MIN_CONTENT_LEN {
        largest
    } else {
        String::new()
    }
}

/// Text of an element: its paragraphs when it has any, otherwise all text
/// nodes outside script/style/nav chrome.
fn element_text(element: ElementRef) -> String {
    if let Ok(paragraphs) = Selector::parse("p") {
        let parts: Vec<String> = element
            .select(&paragraphs)
            .map(|p| p.text().collect::<String>().trim().to_owned())
            .filter(|text| text.len() > 10)
            .collect();
        if !parts.is_empty() {
            return parts.join("\n\n");
        }
    }

    let mut parts = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node.ancestors().any(|ancestor| {
            ancestor.value().as_element().is_some_and(|el| {
                matches!(
                    el.name(),
                    "script" | "style" | "noscript" | "iframe" | "nav" | "header" | "footer"
                )
            })
        });
        if skipped {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_owned());
        }
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors() -> SelectorConfig {
        SelectorConfig::default()
    }

    #[test]
    fn book_id_from_novel_and_chapter_urls() {
        assert_eq!(
            extract_book_id_from_url("https://ranobes.top/novels/133485-lord-of-the-mysteries.html"),
            Some("133485".to_owned())
        );
        assert_eq!(
            extract_book_id_from_url("https://ranobes.top/chapters/133485/page/2/"),
            Some("133485".to_owned())
        );
        assert_eq!(extract_book_id_from_url("https://ranobes.top/about"), None);
    }

    #[test]
    fn chapter_list_via_configured_selector() {
        let html = r#"
            <html><body>
              <div class="cat_block cat_line"><a href="/chapters/133485/1.html">Chapter 1</a></div>
              <div class="cat_block cat_line"><a href="/chapters/133485/2.html">Chapter 2</a></div>
              <div class="cat_block cat_line"><a href="/chapters/133485/1.html#comment">3 comments</a></div>
            </body></html>"#;
        let (links, _) = parse_chapter_list(html, "https://ranobes.top", &selectors());
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://ranobes.top/chapters/133485/1.html");
        assert_eq!(links[0].title, "Chapter 1");
    }

    #[test]
    fn chapter_list_via_fallback_scan() {
        // None of the configured selectors match; the book-id href scan must.
        let html = r#"
            <html><body>
              <a href="https://ranobes.top/read/133485/77.html">Chapter 77</a>
              <a href="https://ranobes.top/read/133485/index?page=2">next</a>
              <a href="https://ranobes.top/news/1.html">news</a>
            </body></html>"#;
        let (links, _) =
            parse_chapter_list(html, "https://ranobes.top/chapters/133485/", &selectors());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Chapter 77");
    }

    #[test]
    fn total_pages_from_embedded_data() {
        let html = r#"<script>window.__DATA__ = {"pages_count":58,"book":"x"}</script>"#;
        assert_eq!(detect_total_pages(html), 58);
    }

    #[test]
    fn total_pages_from_rendered_pagination() {
        let html = r#"
            <div class="pages">
              <a href="/chapters/133485/page/2/">2</a>
              <a href="/chapters/133485/page/9/">9</a>
            </div>"#;
        assert_eq!(detect_total_pages(html), 9);
    }

    #[test]
    fn total_pages_defaults_to_one() {
        assert_eq!(detect_total_pages("<html><body>nothing</body></html>"), 1);
    }

    #[test]
    fn chapter_content_prefers_configured_container() {
        let filler = "The crimson moon hung over the silent city. ".repeat(5);
        let html = format!(
            r#"<html><body>
                 <h1 class="chapter-title">Chapter 1: Crimson</h1>
                 <nav><p>Navigation links that should never appear in content</p></nav>
                 <div class="text-content"><p>{filler}</p><p>{filler}</p></div>
               </body></html>"#
        );
        let parsed = parse_chapter_content(&html, &selectors());
        assert_eq!(parsed.title, "Chapter 1: Crimson");
        assert!(parsed.content.contains("crimson moon"));
        assert!(!parsed.content.contains("Navigation"));
    }

    #[test]
    fn chapter_content_falls_back_to_largest_block() {
        let filler = "A long paragraph of story text keeps going and going. ".repeat(10);
        let html = format!(
            r#"<html><body>
                 <div class="sidebar"><p>short</p></div>
                 <section><p>{filler}</p></section>
               </body></html>"#
        );
        let parsed = parse_chapter_content(&html, &selectors());
        assert!(parsed.content.contains("keeps going"));
    }

    #[test]
    fn next_page_link_is_absolutized() {
        let html = r#"<div class="pagination"><a href="/chapters/133485/page/2/">Next</a></div>"#;
        let (_, next) = parse_chapter_list(html, "https://ranobes.top", &selectors());
        assert_eq!(
            next.as_deref(),
            Some("https://ranobes.top/chapters/133485/page/2/")
        );
    }
}
