#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use novelgrab::access::PageFetcher;
use novelgrab::config::Config;

/// In-memory stand-in for the access layer: serves canned pages, fails on
/// demand, and records every fetch with its transport choice.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, String>,
    always_fail: HashSet<String>,
    light_fail: HashSet<String>,
    pub calls: Vec<(String, bool)>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: String) -> Self {
        self.pages.insert(url.to_owned(), body);
        self
    }

    /// The url fails on both transports.
    pub fn with_failure(mut self, url: &str) -> Self {
        self.always_fail.insert(url.to_owned());
        self
    }

    /// The url fails on the http transport but renders in the browser.
    pub fn with_light_failure(mut self, url: &str) -> Self {
        self.light_fail.insert(url.to_owned());
        self
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.iter().filter(|(u, _)| u == url).count()
    }

    pub fn fetched_urls(&self) -> Vec<&str> {
        self.calls.iter().map(|(u, _)| u.as_str()).collect()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&mut self, url: &str, force_heavy: bool) -> anyhow::Result<Option<String>> {
        self.calls.push((url.to_owned(), force_heavy));
        if self.always_fail.contains(url) {
            return Ok(None);
        }
        if !force_heavy && self.light_fail.contains(url) {
            return Ok(None);
        }
        Ok(self.pages.get(url).cloned())
    }
}

pub const BOOK_ID: &str = "133485";

/// Defaults with the target site swapped for a fake origin and every delay
/// zeroed so tests never sleep.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.site.base_url = "https://example.test".to_owned();
    config.site.chapters_url_first = "https://example.test/chapters/{book_id}/".to_owned();
    config.site.chapters_url = "https://example.test/chapters/{book_id}/page/{page}/".to_owned();
    config.rate_limit.min_secs = 0.0;
    config.rate_limit.max_secs = 0.0;
    config.retry.empty_page_wait_min_secs = 0.0;
    config.retry.empty_page_wait_max_secs = 0.0;
    config
}

pub fn first_page_url() -> String {
    format!("https://example.test/chapters/{BOOK_ID}/")
}

pub fn page_url(page: u32) -> String {
    format!("https://example.test/chapters/{BOOK_ID}/page/{page}/")
}

pub fn chapter_url(n: usize) -> String {
    format!("https://example.test/chapters/{BOOK_ID}/{n}.html")
}

/// Rendered chapter-list page with an optional script-emitted page count.
pub fn list_page(pages_count: Option<u32>, links: &[(String, String)]) -> String {
    let mut html = String::from("<html><head>");
    if let Some(count) = pages_count {
        html.push_str(&format!(
            "<script>window.__DATA__ = {{\"pages_count\":{count}}}</script>"
        ));
    }
    html.push_str("</head><body><h1 class=\"title\">Lord of the Mysteries</h1>");
    for (url, title) in links {
        html.push_str(&format!(
            "<div class=\"cat_block cat_line\"><a href=\"{url}\">{title}</a></div>"
        ));
    }
    html.push_str("</body></html>");
    html
}

/// `count` chapter links starting at chapter number `start`.
pub fn chapter_links(start: usize, count: usize) -> Vec<(String, String)> {
    (start..start + count)
        .map(|n| (chapter_url(n), format!("Chapter {n}")))
        .collect()
}

pub fn chapter_page(title: &str) -> String {
    let paragraph =
        "The crimson moon rose over Backlund and the fog swallowed the gas lamps one by one. "
            .repeat(3);
    format!(
        "<html><body><h1 class=\"chapter-title\">{title}</h1>\
         <div class=\"text-content\"><p>{paragraph}</p><p>{paragraph}</p></div></body></html>"
    )
}
