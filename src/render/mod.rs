//! Render session abstraction.
//!
//! The collector never talks to a browser directly: it drives a
//! `RenderSession` obtained from a `SessionFactory`, and closes it when the
//! category (or discovery) is done.

pub mod chromium;
#[cfg(test)]
pub mod fake;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A located element, snapshotted at the time of the `locate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    /// Selector the element was located with.
    pub selector: String,
    /// Index among the matches of `selector`.
    pub nth: usize,
    /// Index of the element in a preorder walk of the whole document.
    pub position: usize,
    /// Rendered (visible) text.
    pub text: String,
    pub href: Option<String>,
}

impl ElementRef {
    pub fn is_before(&self, other: &ElementRef) -> bool {
        self.position < other.position
    }
}

/// A single live page the collector can drive.
#[async_trait]
pub trait RenderSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;
    /// Evaluate a script in the page and return its JSON result.
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;
    /// All elements matching a CSS selector, in document order.
    async fn locate(&mut self, selector: &str) -> Result<Vec<ElementRef>>;
    /// First element in document order whose trimmed text equals `text`.
    async fn locate_text(&mut self, text: &str) -> Result<Option<ElementRef>>;
    async fn scroll_into_view(&mut self, element: &ElementRef) -> Result<()>;
    async fn activate(&mut self, element: &ElementRef) -> Result<()>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Owns the browser and hands out sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RenderSession>>;
    async fn shutdown(&self) -> Result<()>;
}
