use std::collections::HashSet;

use regex::Regex;

use crate::classify::{first_line, TextClassifier};
use crate::config::SiteProfile;
use crate::error::Result;
use crate::model::SecurityListing;
use crate::render::{ElementRef, RenderSession};

/// Pulls `{name, code}` pairs out of one rendered category page.
pub struct PageExtractor {
    listing_selector: String,
    boundary_marker: String,
    href_re: Regex,
    classifier: TextClassifier,
}

impl PageExtractor {
    pub fn new(site: &SiteProfile) -> Result<Self> {
        Ok(Self {
            listing_selector: site.listing_anchor_selector.clone(),
            boundary_marker: site.boundary_marker.clone(),
            href_re: Regex::new(&site.listing_href_pattern)?,
            classifier: TextClassifier::new(site.currency_suffix.as_str()),
        })
    }

    pub fn listing_selector(&self) -> &str {
        &self.listing_selector
    }

    pub async fn extract(&self, session: &mut dyn RenderSession) -> Result<Vec<SecurityListing>> {
        let anchors = session.locate(&self.listing_selector).await?;
        let marker = if self.boundary_marker.is_empty() {
            None
        } else {
            session.locate_text(&self.boundary_marker).await?
        };
        Ok(self.listings_from(&anchors, marker.as_ref()))
    }

    /// Anchors in document order; anything at or after `marker` is dropped.
    pub fn listings_from(
        &self,
        anchors: &[ElementRef],
        marker: Option<&ElementRef>,
    ) -> Vec<SecurityListing> {
        let mut seen = HashSet::new();
        let mut listings = Vec::new();

        for anchor in anchors {
            if marker.is_some_and(|m| !anchor.is_before(m)) {
                continue;
            }
            let Some(code) = anchor.href.as_deref().and_then(|h| self.code(h)) else {
                continue;
            };
            let Some(name) = first_line(&anchor.text) else {
                continue;
            };
            if self.classifier.classify(name).is_noise() {
                continue;
            }
            if seen.insert(code.clone()) {
                listings.push(SecurityListing {
                    name: name.to_string(),
                    code,
                });
            }
        }
        listings
    }

    fn code(&self, href: &str) -> Option<String> {
        let raw = self.href_re.captures(href)?.get(1)?.as_str();
        Some(raw.trim_start_matches(|c: char| c.is_ascii_alphabetic()).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::fake::{FakeElement, FakeSession, FakeSite};

    fn extractor() -> PageExtractor {
        PageExtractor::new(&SiteProfile::default()).unwrap()
    }

    fn anchor(position: usize, href: &str, text: &str) -> ElementRef {
        ElementRef {
            selector: "a".into(),
            nth: position,
            position,
            text: text.into(),
            href: Some(href.into()),
        }
    }

    fn marker(position: usize) -> ElementRef {
        ElementRef {
            selector: "*".into(),
            nth: position,
            position,
            text: "그 외 회사".into(),
            href: None,
        }
    }

    #[test]
    fn boundary_marker_cuts_trailing_section() {
        let anchors = vec![
            anchor(0, "/stocks/A000001/order", "가"),
            anchor(1, "/stocks/A000002/order", "나"),
            anchor(3, "/stocks/A000003/order", "다"),
        ];
        let out = extractor().listings_from(&anchors, Some(&marker(2)));
        let codes: Vec<&str> = out.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["000001", "000002"]);
    }

    #[test]
    fn no_marker_keeps_everything() {
        let anchors = vec![
            anchor(0, "/stocks/A000001", "가"),
            anchor(5, "/stocks/000002", "나"),
        ];
        assert_eq!(extractor().listings_from(&anchors, None).len(), 2);
    }

    #[test]
    fn noise_text_and_foreign_hrefs_are_skipped() {
        let anchors = vec![
            anchor(0, "/stocks/A005930", "71,000원"),
            anchor(1, "/stocks/A005930", "+1.2%"),
            anchor(2, "/stocks/A005930", "\n삼성전자\n71,000원"),
            anchor(3, "/stocks/US19801212001", "Apple"),
            anchor(4, "/stocks/A000660", "  "),
        ];
        let out = extractor().listings_from(&anchors, None);
        assert_eq!(
            out,
            vec![SecurityListing { name: "삼성전자".into(), code: "005930".into() }]
        );
    }

    #[test]
    fn repeated_anchor_for_same_code_yields_one_listing() {
        let anchors = vec![
            anchor(0, "/stocks/A005930", "삼성전자"),
            anchor(1, "/stocks/A005930/order", "삼성전자우 표기"),
        ];
        let out = extractor().listings_from(&anchors, None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "삼성전자");
    }

    #[tokio::test]
    async fn extract_from_rendered_page() {
        let site = FakeSite::default().page(
            "theme",
            vec![
                FakeElement::anchor("https://www.tossinvest.com/stocks/A000001/order", "가\n1,000원"),
                FakeElement::anchor("https://www.tossinvest.com/stocks/A000002/order", "나"),
                FakeElement::text("div", " 그 외 회사 "),
                FakeElement::anchor("https://www.tossinvest.com/stocks/A000003/order", "다"),
            ],
        );
        let mut s = FakeSession::new(site);
        s.navigate("theme").await.unwrap();
        let out = extractor().extract(&mut s).await.unwrap();
        let names: Vec<&str> = out.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["가", "나"]);
    }

    #[tokio::test]
    async fn blank_page_without_marker_extracts_nothing() {
        let site = FakeSite::default().page("theme", vec![FakeElement::text("div", "로딩 중")]);
        let mut s = FakeSession::new(site);
        s.navigate("theme").await.unwrap();
        assert!(extractor().extract(&mut s).await.unwrap().is_empty());
    }
}
