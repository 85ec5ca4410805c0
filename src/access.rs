use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use futures::StreamExt as _;
use rand::seq::SliceRandom as _;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};

use crate::config::{BrowserConfig, Config, RetryConfig, SiteConfig};

/// The single fetch seam the walker and the item loop drive. `Ok(None)` is a
/// soft failure ("this url did not complete this run"); `Err` means no
/// working transport exists at all and the run cannot proceed.
#[async_trait]
pub trait PageFetcher {
    async fn fetch(&mut self, url: &str, force_heavy: bool) -> anyhow::Result<Option<String>>;
}

enum LightOutcome {
    Content(String),
    /// Access denied or temporarily unavailable; retrying the same transport
    /// is pointless.
    Denied(u16),
    Failed(String),
}

/// Scripted HTTP client with a randomized browser identity per request. Does
/// not execute page scripts.
struct LightTransport {
    client: reqwest::Client,
    user_agents: Vec<String>,
}

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

impl LightTransport {
    fn new(site: &SiteConfig, retry: &RetryConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;

        Ok(Self {
            client,
            user_agents: site.user_agents.clone(),
        })
    }

    fn random_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
    }

    async fn get(&self, url: &str) -> LightOutcome {
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, self.random_user_agent())
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9");

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => return LightOutcome::Failed("request timeout".to_owned()),
            Err(err) if err.is_connect() => {
                return LightOutcome::Failed("connection failed".to_owned());
            }
            Err(err) => return LightOutcome::Failed(err.to_string()),
        };

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::SERVICE_UNAVAILABLE {
            return LightOutcome::Denied(status.as_u16());
        }
        if !status.is_success() {
            return LightOutcome::Failed(format!("HTTP {status}"));
        }

        match response.text().await {
            Ok(body) if body.trim().is_empty() => {
                LightOutcome::Failed("empty response body".to_owned())
            }
            Ok(body) => LightOutcome::Content(body),
            Err(err) => LightOutcome::Failed(format!("read body: {err}")),
        }
    }
}

struct BrowserSession {
    browser: Browser,
    handler: tokio::task::JoinHandle<()>,
}

/// Headless browser transport: executes page scripts and waits for dynamic
/// rendering. The session is expensive to start, so it is kept alive across
/// fetches and only restarted after a failure.
struct HeavyTransport {
    waits: BrowserConfig,
    list_url_marker: String,
    user_agents: Vec<String>,
    timeout_secs: u64,
    session: Option<BrowserSession>,
}

impl HeavyTransport {
    fn new(site: &SiteConfig, retry: &RetryConfig, waits: &BrowserConfig) -> Self {
        Self {
            waits: waits.clone(),
            list_url_marker: site.list_url_marker.clone(),
            user_agents: site.user_agents.clone(),
            timeout_secs: retry.timeout_secs,
            session: None,
        }
    }

    async fn launch(&self) -> anyhow::Result<BrowserSession> {
        let user_agent = self
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT);

        let config = ChromeConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={user_agent}"))
            .request_timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|err| anyhow::anyhow!("configure headless browser: {err}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launch headless browser (is Chrome/Chromium installed?)")?;

        let task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        tracing::info!("headless browser session started");
        Ok(BrowserSession {
            browser,
            handler: task,
        })
    }

    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.browser.close().await {
                tracing::debug!(%err, "close browser session");
            }
            let _ = session.browser.wait().await;
            session.handler.abort();
        }
    }

    async fn get(&mut self, url: &str) -> anyhow::Result<Option<String>> {
        let attempts = self.waits.restart_attempts.max(1);
        for attempt in 0..attempts {
            if attempt > 0 {
                tracing::warn!(url, attempt, "restarting browser session");
                self.teardown().await;
            }
            if self.session.is_none() {
                // A browser that cannot start at all is fatal, not a
                // per-item failure.
                self.session = Some(self.launch().await?);
            }
            let Some(session) = &self.session else {
                continue;
            };

            match self.render(session, url).await {
                Ok(html) => return Ok(Some(html)),
                Err(err) => {
                    tracing::warn!(url, attempt, error = %format!("{err:#}"), "browser fetch failed");
                }
            }
        }

        self.teardown().await;
        Ok(None)
    }

    async fn render(&self, session: &BrowserSession, url: &str) -> anyhow::Result<String> {
        let page = session.browser.new_page(url).await.context("open page")?;
        let result = self.render_page(&page, url).await;
        if let Err(err) = page.close().await {
            tracing::debug!(%err, "close page");
        }
        result
    }

    async fn render_page(&self, page: &Page, url: &str) -> anyhow::Result<String> {
        let _ = page
            .wait_for_navigation()
            .await
            .context("wait for navigation")?;

        tokio::time::sleep(Duration::from_secs_f64(self.waits.settle_secs)).await;
        self.wait_for_ready(page).await?;

        if url.contains(&self.list_url_marker) {
            // List pages render their links client-side well after load.
            tokio::time::sleep(Duration::from_secs_f64(self.waits.list_settle_secs)).await;
            self.poll_for_links(page, url).await;
            tokio::time::sleep(Duration::from_secs_f64(self.waits.post_poll_settle_secs)).await;
        } else {
            tokio::time::sleep(Duration::from_secs_f64(self.waits.post_ready_settle_secs)).await;
        }

        page.content().await.context("read rendered document")
    }

    async fn wait_for_ready(&self, page: &Page) -> anyhow::Result<()> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs_f64(self.waits.ready_timeout_secs);
        loop {
            if let Ok(result) = page.evaluate("document.readyState").await {
                if let Ok(state) = result.into_value::<String>() {
                    if state == "complete" || state == "interactive" {
                        return Ok(());
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("document never became ready");
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Bounded poll for the expected chapter links. Timing out is not an
    /// error; the caller proceeds with whatever rendered.
    async fn poll_for_links(&self, page: &Page, url: &str) {
        let expected = u64::from(self.waits.min_expected_links);
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs_f64(self.waits.link_poll_timeout_secs);
        loop {
            if let Ok(result) = page
                .evaluate("document.querySelectorAll(\"a[href$='.html']\").length")
                .await
            {
                if let Ok(count) = result.into_value::<u64>() {
                    if count > expected {
                        tracing::debug!(url, count, "chapter links rendered");
                        return;
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(url, "timed out waiting for chapter links; continuing with current render");
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

/// Fetch policy over the two transports: the scripted client with retries
/// and exponential backoff, escalating to the browser when the client is
/// denied, exhausted, or when script execution is required up front.
pub struct AccessLayer {
    light: LightTransport,
    heavy: HeavyTransport,
    retry: RetryConfig,
}

impl AccessLayer {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            light: LightTransport::new(&config.site, &config.retry)?,
            heavy: HeavyTransport::new(&config.site, &config.retry, &config.browser),
            retry: config.retry.clone(),
        })
    }

    /// Shut the browser session down cleanly. Dropping without this leaves
    /// process cleanup to the OS.
    pub async fn shutdown(&mut self) {
        self.heavy.teardown().await;
    }
}

#[async_trait]
impl PageFetcher for AccessLayer {
    async fn fetch(&mut self, url: &str, force_heavy: bool) -> anyhow::Result<Option<String>> {
        if force_heavy {
            tracing::debug!(url, "browser transport forced");
            return self.heavy.get(url).await;
        }

        for attempt in 0..self.retry.max_attempts {
            match self.light.get(url).await {
                LightOutcome::Content(body) => {
                    tracing::debug!(url, attempt, "fetched via http transport");
                    return Ok(Some(body));
                }
                LightOutcome::Denied(status) => {
                    tracing::warn!(url, status, "http transport denied; escalating to browser");
                    return self.heavy.get(url).await;
                }
                LightOutcome::Failed(reason) => {
                    tracing::debug!(url, attempt, %reason, "http transport attempt failed");
                    if attempt + 1 < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        tracing::warn!(url, "http transport exhausted retries; escalating to browser");
        self.heavy.get(url).await
    }
}
