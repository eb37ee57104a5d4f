use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::{task, time::{sleep, timeout}};

use crate::config::GLOBAL_CONFIG;
use crate::error::*;

lazy_static! {
    static ref TITLE: Regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap();
}

#[derive(Debug, Clone, Default)]
pub struct WebPage {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Clone)]
pub struct WebProbe {
    client: reqwest::Client,
}

impl WebProbe {
    pub fn new() -> Result<Self, SimpleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(GLOBAL_CONFIG.web.fetch_timeout_ms))
            .build()?;
        Ok(Self { client })
    }

    /// A port only counts as a web page once a `<title>` comes back from a
    /// plain fetch; the browser capture runs after that gate, so a thumbnail
    /// can never exist without a title.
    pub async fn probe(&self, port: u16) -> WebPage {
        let url = format!("http://127.0.0.1:{}/", port);
        let title = match self.fetch_title(&url).await {
            Ok(Some(title)) => title,
            _ => return WebPage::default(),
        };
        let thumbnail = capture_snapshot(&url).await
            .log_error("web-snapshot")
            .map(|png| base64::encode(&png));
        WebPage {
            title: Some(title),
            thumbnail,
        }
    }

    async fn fetch_title(&self, url: &str) -> Result<Option<String>, SimpleError> {
        let body = self.client.get(url).send().await?.text().await?;
        Ok(extract_title(&body))
    }
}

pub fn extract_title(body: &str) -> Option<String> {
    let cap = TITLE.captures(body)?;
    let title = cap[1].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_owned())
    }
}

/// Render the page in a throwaway headless browser and return a PNG of a
/// fixed 1280x800 viewport. The instance lives for exactly one capture;
/// teardown runs on the failure paths too.
pub async fn capture_snapshot(url: &str) -> Result<Vec<u8>, SimpleError> {
    let config = BrowserConfig::builder()
        .no_sandbox()
        .window_size(1280, 800)
        .build()?;
    let (mut browser, mut handler) = Browser::launch(config).await?;
    let events = task::spawn(async move {
        while handler.next().await.is_some() {}
    });

    let wait = Duration::from_millis(GLOBAL_CONFIG.web.browser_timeout_ms);
    let shot = match timeout(wait, navigate_and_capture(&browser, url)).await {
        Ok(result) => result,
        Err(_) => Err(SimpleError::new("navigation timed out")),
    };

    browser.close().await.log_error_consume("browser-close");
    browser.wait().await.log_error_consume("browser-wait");
    events.abort();
    shot
}

async fn navigate_and_capture(browser: &Browser, url: &str) -> Result<Vec<u8>, SimpleError> {
    let page = browser.new_page(url).await?;
    page.wait_for_navigation().await?;
    // Give client-rendered pages a moment to paint before the shot.
    sleep(Duration::from_millis(GLOBAL_CONFIG.web.settle_ms)).await;
    let png = page.screenshot(ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .build())
        .await?;
    Ok(png)
}
