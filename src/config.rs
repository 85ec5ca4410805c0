use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use rand::Rng as _;
use serde::Deserialize;

/// Every tunable of the pipeline, loaded once and passed by reference into
/// each component. A missing config file means defaults, not an error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub browser: BrowserConfig,
    pub selectors: SelectorConfig,
    pub pagination: PaginationConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parse config: {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    /// First chapter-list page; `{book_id}` is substituted.
    pub chapters_url_first: String,
    /// Subsequent chapter-list pages; `{book_id}` and `{page}` are substituted.
    pub chapters_url: String,
    /// URL substring that marks a chapter-list page; list pages get the
    /// longer render waits in the browser transport.
    pub list_url_marker: String,
    pub user_agents: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ranobes.top".to_owned(),
            chapters_url_first: "https://ranobes.top/chapters/{book_id}/".to_owned(),
            chapters_url: "https://ranobes.top/chapters/{book_id}/page/{page}/".to_owned(),
            list_url_marker: "/chapters/".to_owned(),
            user_agents: default_user_agents(),
        }
    }
}

impl SiteConfig {
    pub fn first_page_url(&self, book_id: &str) -> String {
        self.chapters_url_first.replace("{book_id}", book_id)
    }

    pub fn page_url(&self, book_id: &str, page: u32) -> String {
        self.chapters_url
            .replace("{book_id}", book_id)
            .replace("{page}", &page.to_string())
    }
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:132.0) Gecko/20100101 Firefox/132.0",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub min_secs: f64,
    pub max_secs: f64,
    /// Multiplier for delays between chapter-list pages (bulk listing
    /// endpoints draw more attention than single chapters).
    pub list_multiplier: f64,
    /// Multiplier for delays between chapter fetches.
    pub chapter_multiplier: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_secs: 3.0,
            max_secs: 8.0,
            list_multiplier: 2.5,
            chapter_multiplier: 1.5,
        }
    }
}

impl RateLimitConfig {
    /// Uniform random delay within the configured bounds, scaled.
    pub fn delay(&self, multiplier: f64) -> Duration {
        let min = (self.min_secs * multiplier).max(0.0);
        let max = (self.max_secs * multiplier).max(min);
        let secs = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Wait `backoff_factor ^ attempt` seconds between attempts.
    pub backoff_factor: f64,
    pub timeout_secs: u64,
    /// Extended wait before the single retry of a list page that yielded
    /// zero chapters (distinct from the standard backoff).
    pub empty_page_wait_min_secs: f64,
    pub empty_page_wait_max_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
            timeout_secs: 30,
            empty_page_wait_min_secs: 15.0,
            empty_page_wait_max_secs: 25.0,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.backoff_factor.powi(attempt as i32).max(0.0))
    }

    pub fn empty_page_wait(&self) -> Duration {
        let min = self.empty_page_wait_min_secs.max(0.0);
        let max = self.empty_page_wait_max_secs.max(min);
        let secs = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        Duration::from_secs_f64(secs)
    }
}

/// Waits applied by the browser transport. These are a tuning surface for
/// the failure model, not implementation constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Fixed settle delay after navigation.
    pub settle_secs: f64,
    /// Bounded wait for the basic document-ready signal.
    pub ready_timeout_secs: f64,
    /// Extra settle after readiness on non-list pages.
    pub post_ready_settle_secs: f64,
    /// Longer settle window applied to chapter-list pages.
    pub list_settle_secs: f64,
    /// Bounded poll for the expected chapter links on list pages.
    pub link_poll_timeout_secs: f64,
    /// Settle after the link poll resolves (or times out).
    pub post_poll_settle_secs: f64,
    /// Link count the poll waits for before continuing early.
    pub min_expected_links: u32,
    /// Session restarts tolerated per fetch before giving up on it.
    pub restart_attempts: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            settle_secs: 5.0,
            ready_timeout_secs: 20.0,
            post_ready_settle_secs: 2.0,
            list_settle_secs: 10.0,
            link_poll_timeout_secs: 20.0,
            post_poll_settle_secs: 5.0,
            min_expected_links: 5,
            restart_attempts: 2,
        }
    }
}

/// Selector chains tried in order; the first one that matches wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub chapter_links: Vec<String>,
    pub chapter_title: Vec<String>,
    pub chapter_content: Vec<String>,
    pub content_fallbacks: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            chapter_links: [
                "div.cat_block.cat_line a",
                ".cat_line a",
                "a[href*='/chapters/']",
                "div[class*='chapter'] a",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            chapter_title: ["h1.chapter-title", "h1.entry-title", ".chapter-title", "h1", ".title"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            chapter_content: [
                "div.text-content",
                "div.entry-content",
                "article.text",
                "div.chapter-content",
                "div.content",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            content_fallbacks: ["main", "article", "#content", ".main-content"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Safety cap on the detected page count; a detection bug must not cause
    /// an unbounded walk.
    pub max_pages_cap: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { max_pages_cap: 100 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Export a snapshot of results every this many completed chapters.
    pub flush_every: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { flush_every: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() -> anyhow::Result<()> {
        let config = Config::load(Path::new("does/not/exist.yaml"))?;
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.pagination.max_pages_cap, 100);
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults_for_absent_sections() -> anyhow::Result<()> {
        let config: Config = serde_yaml::from_str("rate_limit:\n  min_secs: 0.5\n")?;
        assert_eq!(config.rate_limit.min_secs, 0.5);
        assert_eq!(config.rate_limit.max_secs, 8.0);
        assert_eq!(config.browser.restart_attempts, 2);
        Ok(())
    }

    #[test]
    fn url_templates_substitute_book_id_and_page() {
        let site = SiteConfig::default();
        assert_eq!(
            site.first_page_url("133485"),
            "https://ranobes.top/chapters/133485/"
        );
        assert_eq!(
            site.page_url("133485", 7),
            "https://ranobes.top/chapters/133485/page/7/"
        );
    }

    #[test]
    fn zero_rate_limit_never_sleeps() {
        let rate = RateLimitConfig {
            min_secs: 0.0,
            max_secs: 0.0,
            list_multiplier: 2.5,
            chapter_multiplier: 1.5,
        };
        assert_eq!(rate.delay(2.5), Duration::ZERO);
    }
}
