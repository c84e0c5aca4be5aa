//! Headless Chromium driver

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::driver::{BrowserDriver, Viewport};
use super::DemoError;

fn browser_err(e: impl std::fmt::Display) -> DemoError {
    DemoError::Browser(e.to_string())
}

pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumDriver {
    pub async fn launch(headless: bool, viewport: Viewport) -> Result<Self, DemoError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(Duration::from_secs(30))
            .window_size(viewport.width, viewport.height)
            .viewport(CdpViewport {
                width: viewport.width,
                height: viewport.height,
                ..CdpViewport::default()
            })
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--lang=zh-CN");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(browser_err)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(browser_err)?;
        tracing::info!("Browser initialized ({}x{})", viewport.width, viewport.height);
        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> Result<(), DemoError> {
        self.page.goto(url).await.map_err(browser_err)?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DemoError> {
        self.page
            .find_element(selector)
            .await
            .map_err(browser_err)?
            .click()
            .await
            .map_err(browser_err)?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DemoError> {
        let element = self.page.find_element(selector).await.map_err(browser_err)?;
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(browser_err)?;
        element.click().await.map_err(browser_err)?;
        element.type_str(value).await.map_err(browser_err)?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DemoError> {
        let result = self.page.evaluate(script).await.map_err(browser_err)?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn close(&self) -> Result<(), DemoError> {
        let mut browser = self.browser.lock().await;
        browser.close().await.map_err(browser_err)?;
        self.handler.abort();
        tracing::info!("Browser closed");
        Ok(())
    }
}
