//! Chromium-backed render sessions using chromiumoxide.
//!
//! Element lookups run as page scripts so that every `ElementRef` carries its
//! document position; `scroll_into_view` and `activate` re-resolve the element
//! by `(selector, nth)`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::js::EvaluationResult;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ElementRef, RenderSession, SessionFactory};
use crate::config::BrowserSettings;

pub struct ChromiumFactory {
    browser: Mutex<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    user_agent: String,
    navigation_timeout: Duration,
}

impl ChromiumFactory {
    /// Launch a Chromium instance configured from `settings`.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions");
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler event error: {e}");
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler: Mutex::new(Some(handler)),
            user_agent: settings.user_agent.clone(),
            navigation_timeout: Duration::from_millis(settings.navigation_timeout_ms),
        })
    }
}

#[async_trait]
impl SessionFactory for ChromiumFactory {
    async fn open(&self) -> Result<Box<dyn RenderSession>> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().context("browser already shut down")?;
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open a new tab")?;
        page.set_user_agent(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .context("failed to set user agent")?;
        Ok(Box::new(ChromiumSession {
            page,
            navigation_timeout: self.navigation_timeout,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                warn!("closing browser failed: {e}");
            }
            if let Err(e) = browser.wait().await {
                debug!("waiting for browser exit failed: {e}");
            }
        }
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }
        Ok(())
    }
}

pub struct ChromiumSession {
    page: Page,
    navigation_timeout: Duration,
}

impl ChromiumSession {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("script evaluation failed")?;
        decode(result)
    }

    async fn on_element(&self, element: &ElementRef, action: &str) -> Result<()> {
        let script = element_action_script(&element.selector, element.nth, action)?;
        let found: bool = self.eval(&script).await?;
        if !found {
            bail!("element {}[{}] is no longer in the page", element.selector, element.nth);
        }
        Ok(())
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!(
                "navigation to {url} timed out after {}ms",
                self.navigation_timeout.as_millis()
            ),
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        self.eval(script).await
    }

    async fn locate(&mut self, selector: &str) -> Result<Vec<ElementRef>> {
        self.eval(&locate_script(selector)?).await
    }

    async fn locate_text(&mut self, text: &str) -> Result<Option<ElementRef>> {
        self.eval(&locate_text_script(text)?).await
    }

    async fn scroll_into_view(&mut self, element: &ElementRef) -> Result<()> {
        self.on_element(element, "el.scrollIntoView({block: 'center'});")
            .await
    }

    async fn activate(&mut self, element: &ElementRef) -> Result<()> {
        self.on_element(element, "el.click();").await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.context("failed to close tab")?;
        Ok(())
    }
}

/// Script results arrive without a value when the script returns `null` or
/// `undefined`; both decode as JSON null.
fn decode<T: serde::de::DeserializeOwned>(result: EvaluationResult) -> Result<T> {
    let value = result.value().cloned().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).context("failed to convert script result")
}

fn locate_script(selector: &str) -> Result<String> {
    let sel = serde_json::to_string(selector)?;
    Ok(format!(
        r#"(() => {{
  const order = new Map();
  const all = document.getElementsByTagName('*');
  for (let i = 0; i < all.length; i++) order.set(all[i], i);
  return Array.from(document.querySelectorAll({sel})).map((el, nth) => ({{
    selector: {sel},
    nth,
    position: order.get(el),
    text: el.innerText || '',
    href: el.getAttribute('href') === null ? null : (el.href || el.getAttribute('href'))
  }}));
}})()"#
    ))
}

fn locate_text_script(text: &str) -> Result<String> {
    let target = serde_json::to_string(text)?;
    Ok(format!(
        r#"(() => {{
  const all = document.getElementsByTagName('*');
  for (let i = 0; i < all.length; i++) {{
    const el = all[i];
    if (el.innerText && el.innerText.trim() === {target}) {{
      return {{ selector: '*', nth: i, position: i, text: el.innerText, href: el.getAttribute('href') }};
    }}
  }}
  return null;
}})()"#
    ))
}

fn element_action_script(selector: &str, nth: usize, action: &str) -> Result<String> {
    let sel = serde_json::to_string(selector)?;
    Ok(format!(
        r#"(() => {{
  const el = document.querySelectorAll({sel})[{nth}];
  if (!el) return false;
  {action}
  return true;
}})()"#
    ))
}
