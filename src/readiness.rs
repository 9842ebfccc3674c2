use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::Timing;
use crate::error::Result;
use crate::render::RenderSession;

/// Polling predicates used instead of fixed sleeps.
#[derive(Debug, Clone)]
pub struct Readiness {
    pub poll_interval: Duration,
    pub stable_polls: u32,
}

impl Readiness {
    pub fn from_timing(timing: &Timing) -> Self {
        Self {
            poll_interval: timing.poll_interval(),
            stable_polls: timing.stable_polls.max(1),
        }
    }

    /// Poll until at least one element matches `selector` or `timeout` runs out.
    pub async fn wait_for_presence(
        &self,
        session: &mut dyn RenderSession,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if !session.locate(selector).await?.is_empty() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(self.poll_interval).await;
        }
    }

    /// After an activation, wait for the elements matching `selector` to differ
    /// from `previous` and then hold still for `stable_polls` polls.
    ///
    /// Returns false on timeout; callers continue with whatever is rendered.
    pub async fn settle(
        &self,
        session: &mut dyn RenderSession,
        selector: &str,
        previous: &[String],
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut last: Option<Vec<String>> = None;
        let mut unchanged = 0u32;

        loop {
            let current = signature(session, selector).await?;
            if current.as_slice() != previous && !current.is_empty() {
                if last.as_ref() == Some(&current) {
                    unchanged += 1;
                } else {
                    unchanged = 0;
                }
                if unchanged + 1 >= self.stable_polls {
                    return Ok(true);
                }
                last = Some(current);
            }
            if Instant::now() >= deadline {
                debug!(selector, "listing did not settle within {:?}", timeout);
                return Ok(false);
            }
            sleep(self.poll_interval).await;
        }
    }
}

/// Ordered hrefs of the elements matching `selector`.
pub async fn signature(session: &mut dyn RenderSession, selector: &str) -> Result<Vec<String>> {
    Ok(session
        .locate(selector)
        .await?
        .into_iter()
        .map(|el| el.href.unwrap_or(el.text))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Ready { attempts: u32 },
    NotReady,
}

impl PageStatus {
    pub fn is_ready(self) -> bool {
        matches!(self, PageStatus::Ready { .. })
    }
}

/// Navigate-and-probe with a growing wait per attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_wait: Duration,
    pub readiness: Readiness,
}

impl RetryPolicy {
    pub fn from_timing(timing: &Timing) -> Self {
        Self {
            max_attempts: timing.max_attempts.max(1),
            base_wait: timing.base_wait(),
            readiness: Readiness::from_timing(timing),
        }
    }

    /// Attempt `n` navigates to `url` and waits up to `base_wait * n` for the
    /// probe selector to match. Navigation errors propagate.
    pub async fn ensure_ready(
        &self,
        session: &mut dyn RenderSession,
        url: &str,
        probe_selector: &str,
    ) -> Result<PageStatus> {
        for attempt in 1..=self.max_attempts {
            session.navigate(url).await?;
            let budget = self.base_wait * attempt;
            if self
                .readiness
                .wait_for_presence(session, probe_selector, budget)
                .await?
            {
                return Ok(PageStatus::Ready { attempts: attempt });
            }
            warn!(
                "Page not ready after attempt {}/{} ({:.1}s): {}",
                attempt,
                self.max_attempts,
                budget.as_secs_f64(),
                url
            );
        }
        Ok(PageStatus::NotReady)
    }
}
