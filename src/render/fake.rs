//! Scripted in-memory render session for tests.
//!
//! A `FakeSite` maps URLs to pages. Each page is a flat list of elements in
//! document order; buttons may carry a `goto` key that switches the current
//! page when activated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::{ElementRef, RenderSession, SessionFactory};

static SELECTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(\*|[a-z]+)(?:\[href\*="([^"]*)"\])?$"#).unwrap());

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FakeElement {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub goto: Option<String>,
}

impl FakeElement {
    pub fn anchor(href: &str, text: &str) -> Self {
        Self {
            tag: "a".into(),
            text: text.into(),
            href: Some(href.into()),
            goto: None,
        }
    }

    pub fn button(text: &str, goto: &str) -> Self {
        Self {
            tag: "button".into(),
            text: text.into(),
            href: None,
            goto: Some(goto.into()),
        }
    }

    pub fn text(tag: &str, text: &str) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
            href: None,
            goto: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FakePage {
    pub elements: Vec<FakeElement>,
    /// Appended to `elements` on the first `evaluate` (lazy rendering).
    #[serde(default)]
    pub lazy: Vec<FakeElement>,
    /// Number of navigations that render an empty page before content shows.
    #[serde(default)]
    pub empty_loads: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FakeSite {
    pub pages: HashMap<String, FakePage>,
    /// URLs whose navigation fails.
    #[serde(default)]
    pub broken: Vec<String>,
    /// URLs whose navigation never completes.
    #[serde(default)]
    pub hanging: Vec<String>,
}

impl FakeSite {
    pub fn from_fixture(name: &str) -> Self {
        let raw = std::fs::read_to_string(format!("tests/fixtures/{}.json", name)).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    pub fn page(mut self, key: &str, elements: Vec<FakeElement>) -> Self {
        self.pages.insert(
            key.to_string(),
            FakePage {
                elements,
                ..Default::default()
            },
        );
        self
    }
}

/// What sessions did, shared with the test after they are gone.
#[derive(Debug, Default)]
pub struct FakeLog {
    pub navigations: Vec<String>,
    pub activations: Vec<String>,
    pub scrolls: usize,
    pub scripts: Vec<String>,
}

pub struct FakeSession {
    site: Arc<FakeSite>,
    log: Arc<Mutex<FakeLog>>,
    loads: HashMap<String, usize>,
    current: Vec<FakeElement>,
    current_key: Option<String>,
    lazy_pending: Vec<FakeElement>,
    closed: Arc<AtomicUsize>,
}

impl FakeSession {
    pub fn new(site: FakeSite) -> Self {
        Self::shared(
            Arc::new(site),
            Arc::default(),
            Arc::new(AtomicUsize::new(0)),
        )
    }

    fn shared(site: Arc<FakeSite>, log: Arc<Mutex<FakeLog>>, closed: Arc<AtomicUsize>) -> Self {
        Self {
            site,
            log,
            loads: HashMap::new(),
            current: Vec::new(),
            current_key: None,
            lazy_pending: Vec::new(),
            closed,
        }
    }

    pub fn log(&self) -> Arc<Mutex<FakeLog>> {
        Arc::clone(&self.log)
    }

    fn show(&mut self, key: &str) {
        let page = self.site.pages.get(key).cloned().unwrap_or_default();
        self.current = page.elements;
        self.lazy_pending = page.lazy;
        self.current_key = Some(key.to_string());
    }

    fn element_ref(&self, selector: &str, nth: usize, position: usize) -> ElementRef {
        let el = &self.current[position];
        ElementRef {
            selector: selector.to_string(),
            nth,
            position,
            text: el.text.clone(),
            href: el.href.clone(),
        }
    }

    fn resolve(&self, element: &ElementRef) -> Result<&FakeElement> {
        match self.current.get(element.position) {
            Some(el) if el.text == element.text => Ok(el),
            _ => bail!("element {}[{}] is no longer in the page", element.selector, element.nth),
        }
    }
}

fn matches(selector: &str, el: &FakeElement) -> bool {
    let Some(caps) = SELECTOR_RE.captures(selector) else {
        return false;
    };
    let tag_ok = &caps[1] == "*" || caps[1] == *el.tag;
    let href_ok = match caps.get(2) {
        Some(needle) => el
            .href
            .as_deref()
            .is_some_and(|h| h.contains(needle.as_str())),
        None => true,
    };
    tag_ok && href_ok
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        if self.site.broken.iter().any(|u| u == url) {
            bail!("navigation to {url} failed: net::ERR_CONNECTION_RESET");
        }
        if self.site.hanging.iter().any(|u| u == url) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let loads = self.loads.entry(url.to_string()).or_insert(0);
        *loads += 1;
        let empty_loads = self.site.pages.get(url).map_or(0, |p| p.empty_loads);
        if *loads <= empty_loads {
            self.current = Vec::new();
            self.lazy_pending = Vec::new();
            self.current_key = Some(url.to_string());
        } else {
            self.show(url);
        }
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        self.log.lock().unwrap().scripts.push(script.to_string());
        let lazy = std::mem::take(&mut self.lazy_pending);
        self.current.extend(lazy);
        Ok(serde_json::Value::Bool(true))
    }

    async fn locate(&mut self, selector: &str) -> Result<Vec<ElementRef>> {
        let positions: Vec<usize> = self
            .current
            .iter()
            .enumerate()
            .filter(|(_, el)| matches(selector, el))
            .map(|(i, _)| i)
            .collect();
        Ok(positions
            .into_iter()
            .enumerate()
            .map(|(nth, pos)| self.element_ref(selector, nth, pos))
            .collect())
    }

    async fn locate_text(&mut self, text: &str) -> Result<Option<ElementRef>> {
        Ok(self
            .current
            .iter()
            .position(|el| el.text.trim() == text)
            .map(|pos| self.element_ref("*", pos, pos)))
    }

    async fn scroll_into_view(&mut self, element: &ElementRef) -> Result<()> {
        self.resolve(element)?;
        self.log.lock().unwrap().scrolls += 1;
        Ok(())
    }

    async fn activate(&mut self, element: &ElementRef) -> Result<()> {
        let goto = self.resolve(element)?.goto.clone();
        self.log
            .lock()
            .unwrap()
            .activations
            .push(element.text.trim().to_string());
        if let Some(key) = goto {
            self.show(&key);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out `FakeSession`s over one shared site and counts their lifecycle.
pub struct FakeFactory {
    site: Arc<FakeSite>,
    log: Arc<Mutex<FakeLog>>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub shut_down: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            log: Arc::default(),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            shut_down: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn log(&self) -> Arc<Mutex<FakeLog>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self) -> Result<Box<dyn RenderSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession::shared(
            Arc::clone(&self.site),
            Arc::clone(&self.log),
            Arc::clone(&self.closed),
        )))
    }

    async fn shutdown(&self) -> Result<()> {
        self.shut_down.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matching() {
        let a = FakeElement::anchor("https://x.test/stocks/A005930/order", "삼성전자");
        assert!(matches(r#"a[href*="/stocks/"]"#, &a));
        assert!(matches("*", &a));
        assert!(!matches("button", &a));
        assert!(!matches(r#"a[href*="contentParams"]"#, &a));
    }

    #[tokio::test]
    async fn button_switches_page() {
        let site = FakeSite::default()
            .page("p1", vec![FakeElement::button("2", "p2")])
            .page("p2", vec![FakeElement::text("div", "second")]);
        let mut s = FakeSession::new(site);
        s.navigate("p1").await.unwrap();
        let buttons = s.locate("button").await.unwrap();
        s.activate(&buttons[0]).await.unwrap();
        assert!(s.locate_text("second").await.unwrap().is_some());
    }
}
