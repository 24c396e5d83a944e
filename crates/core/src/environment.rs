//! Page-context environment — the snapshot an agent works against.
//!
//! An `Environment` is captured fresh at the start of every interaction and
//! attached to it; it is never cached across interactions. The page source
//! (`EnvironmentProvider`) is an external collaborator — a missing snapshot is
//! a recoverable condition, answered with a canned reply, not an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Extracted page content supplied by the content collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    /// Page title
    #[serde(default)]
    pub title: String,

    /// Visible page text
    #[serde(default)]
    pub text: String,

    /// Page URL, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Outgoing links (text + href pairs)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<PageLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    pub text: String,
    pub href: String,
}

/// The raw capture handed over by an [`EnvironmentProvider`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Extracted content, when the page could be read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<PageContent>,

    /// Data-URL screenshot, when capture succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// A per-interaction snapshot: the rendered system prompt plus the page
/// capture it was rendered from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// The fully rendered system prompt for this interaction
    pub system_prompt: String,

    /// Extracted page content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<PageContent>,

    /// Data-URL screenshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl Environment {
    /// Build an environment from a rendered prompt and a page snapshot.
    pub fn new(system_prompt: impl Into<String>, snapshot: PageSnapshot) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            content: snapshot.content,
            screenshot: snapshot.screenshot,
        }
    }
}

/// Source of page context — implemented by the UI/content-script collaborator.
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    /// Capture the current page. `None` means the page is unreachable
    /// (e.g. the tab was closed or the content script isn't injected).
    async fn snapshot(&self) -> Option<PageSnapshot>;
}

/// A provider that always returns the same snapshot. Used by surfaces with no
/// live page (CLI) and by tests.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    snapshot: Option<PageSnapshot>,
}

impl StaticProvider {
    pub fn new(snapshot: PageSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    /// A provider that reports the page as unreachable.
    pub fn unavailable() -> Self {
        Self { snapshot: None }
    }
}

#[async_trait]
impl EnvironmentProvider for StaticProvider {
    async fn snapshot(&self) -> Option<PageSnapshot> {
        self.snapshot.clone()
    }
}
