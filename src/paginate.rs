use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::readiness::{signature, Readiness};
use crate::render::RenderSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    AtPage(u32),
    Exhausted,
}

/// Walks a category's numbered page controls until none is left.
pub struct PaginationController {
    state: PageState,
    max_pages: u32,
    capped: bool,
    control_selector: String,
    listing_selector: String,
    readiness: Readiness,
    settle_timeout: Duration,
}

impl PaginationController {
    /// Starts at page 1; the caller has already rendered it.
    pub fn new(
        control_selector: &str,
        listing_selector: &str,
        max_pages: u32,
        readiness: Readiness,
        settle_timeout: Duration,
    ) -> Self {
        Self {
            state: PageState::AtPage(1),
            max_pages: max_pages.max(1),
            capped: false,
            control_selector: control_selector.to_string(),
            listing_selector: listing_selector.to_string(),
            readiness,
            settle_timeout,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// True when pagination stopped at `max_pages` rather than running out.
    pub fn capped(&self) -> bool {
        self.capped
    }

    pub async fn advance(&mut self, session: &mut dyn RenderSession) -> Result<PageState> {
        let PageState::AtPage(n) = self.state else {
            return Ok(PageState::Exhausted);
        };

        if n >= self.max_pages {
            warn!("Stopping at page cap {} while a next page may still exist", self.max_pages);
            self.capped = true;
            self.state = PageState::Exhausted;
            return Ok(self.state);
        }

        let label = (n + 1).to_string();
        let mut controls = session.locate(&self.control_selector).await?;
        // Several controls may carry the same label; take the first in document order.
        controls.sort_by_key(|c| c.position);
        let Some(next) = controls.into_iter().find(|c| c.text.trim() == label) else {
            debug!("No control labelled {}; pagination done at page {}", label, n);
            self.state = PageState::Exhausted;
            return Ok(self.state);
        };

        let before = signature(session, &self.listing_selector).await?;
        session.scroll_into_view(&next).await?;
        session.activate(&next).await?;
        self.readiness
            .settle(session, &self.listing_selector, &before, self.settle_timeout)
            .await?;

        self.state = PageState::AtPage(n + 1);
        Ok(self.state)
    }
}
