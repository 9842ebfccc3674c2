use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::classify::{TextClassifier, TextKind};
use crate::config::{SiteProfile, Timing};
use crate::error::Result;
use crate::model::Theme;
use crate::readiness::{signature, Readiness};
use crate::render::RenderSession;

const CONTENT_PARAMS_KEY: &str = "contentParams";
const SCROLL_TO_BOTTOM: &str =
    "(() => { window.scrollTo(0, document.body.scrollHeight); return true; })()";

/// Address of one category page: landing URL + content type + encoded
/// `{"id":..,"market":..}` block.
pub fn category_url(site: &SiteProfile, theme_id: &str) -> String {
    let params = serde_json::json!({ "id": theme_id, "market": site.market }).to_string();
    let encoded: String = url::form_urlencoded::byte_serialize(params.as_bytes()).collect();
    format!(
        "{}&contentType={}&{}={}",
        site.landing_url, site.content_type, CONTENT_PARAMS_KEY, encoded
    )
}

/// Extracts themes from the landing page.
pub struct CategoryDiscoverer<'a> {
    site: &'a SiteProfile,
    timing: &'a Timing,
    classifier: TextClassifier,
}

impl<'a> CategoryDiscoverer<'a> {
    pub fn new(site: &'a SiteProfile, timing: &'a Timing) -> Self {
        Self {
            site,
            timing,
            classifier: TextClassifier::new(site.currency_suffix.as_str()),
        }
    }

    /// Navigate to the landing page, prepare it and return the domestic themes
    /// in first-seen order. An empty list is logged, not raised.
    pub async fn discover(&self, session: &mut dyn RenderSession) -> Result<Vec<Theme>> {
        let readiness = Readiness::from_timing(self.timing);
        let selector = self.site.category_anchor_selector.as_str();

        info!("Loading landing page: {}", self.site.landing_url);
        session.navigate(&self.site.landing_url).await?;
        if !readiness
            .wait_for_presence(session, selector, self.timing.discovery_timeout())
            .await?
        {
            warn!("No category anchors appeared within {:?}; continuing", self.timing.discovery_timeout());
        }

        self.open_landing_tab(session, &readiness).await?;

        // Lazily rendered categories only show up once the page is scrolled.
        let before = signature(session, selector).await?;
        session.evaluate(SCROLL_TO_BOTTOM).await?;
        readiness
            .settle(session, selector, &before, self.timing.settle_timeout())
            .await?;

        let anchors = session.locate(selector).await?;
        let themes = self.themes_from_anchors(
            anchors
                .iter()
                .filter_map(|a| Some((a.href.as_deref()?, a.text.as_str()))),
        );

        if themes.is_empty() {
            warn!("Discovery found no {} themes", self.site.market);
        } else {
            info!("Discovered {} {} themes", themes.len(), self.site.market);
        }
        Ok(themes)
    }

    async fn open_landing_tab(
        &self,
        session: &mut dyn RenderSession,
        readiness: &Readiness,
    ) -> Result<()> {
        let Some(label) = self.site.landing_tab_label.as_deref() else {
            return Ok(());
        };
        let controls = session.locate(&self.site.landing_tab_selector).await?;
        let Some(tab) = controls.into_iter().find(|c| c.text.contains(label)) else {
            debug!("Landing tab '{}' not present", label);
            return Ok(());
        };

        let selector = self.site.category_anchor_selector.as_str();
        let before = signature(session, selector).await?;
        session.activate(&tab).await?;
        readiness
            .settle(session, selector, &before, self.timing.settle_timeout())
            .await?;
        Ok(())
    }

    /// Pure part of discovery: `(href, text)` pairs in document order to themes.
    pub fn themes_from_anchors<'s>(
        &self,
        anchors: impl IntoIterator<Item = (&'s str, &'s str)>,
    ) -> Vec<Theme> {
        let mut seen = HashSet::new();
        let mut themes = Vec::new();

        for (href, text) in anchors {
            let Some((id, market)) = parse_content_params(&self.site.landing_url, href) else {
                continue;
            };
            if market.as_deref() != Some(self.site.market.as_str()) {
                continue;
            }
            let Some(name) = self.label(text) else {
                continue;
            };
            if seen.insert(id.clone()) {
                themes.push(Theme {
                    id,
                    name: name.to_string(),
                });
            }
        }
        themes
    }

    fn label<'t>(&self, text: &'t str) -> Option<&'t str> {
        text.lines().map(str::trim).find(|line| {
            line.chars().count() > 1
                && !matches!(
                    self.classifier.classify(line),
                    TextKind::PureNumeric | TextKind::Percent | TextKind::Empty
                )
                && !self.site.noise_phrases.iter().any(|p| line.contains(p.as_str()))
        })
    }
}

/// `(id, market)` from an anchor target carrying a `contentParams` JSON block.
fn parse_content_params(base: &str, href: &str) -> Option<(String, Option<String>)> {
    let url = match Url::parse(href) {
        Ok(u) => u,
        Err(_) => Url::parse(base).ok()?.join(href).ok()?,
    };
    let raw = url
        .query_pairs()
        .find(|(k, _)| k == CONTENT_PARAMS_KEY)
        .map(|(_, v)| v.into_owned())?;
    let params: Value = serde_json::from_str(&raw).ok()?;

    let id = match params.get("id")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let market = params
        .get("market")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some((id, market))
}
