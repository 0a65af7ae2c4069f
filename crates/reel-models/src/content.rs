//! Content items pulled from the content source.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{InputError, InputResult};

/// Label used when an item carries no category.
pub const DEFAULT_CATEGORY: &str = "NOTÍCIAS";

/// Stable, source-assigned identifier of a content item.
///
/// Integer ids from the source are stored as their decimal string so that the
/// ledger never has to care about the source's id type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create from an existing string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of source material to be turned into a video asset.
///
/// Read-only: items are fetched fresh every cycle and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Source-assigned identifier
    pub id: ItemId,
    /// Plain-text headline (markup already stripped)
    pub headline: String,
    /// Plain-text category label, may be empty
    #[serde(default)]
    pub category: String,
    /// Absolute URL of the source photo, if any
    #[serde(default)]
    pub image_url: Option<String>,
    /// Canonical link used for attribution in captions
    #[serde(default)]
    pub link: String,
}

impl ContentItem {
    /// Create a new item with no category, image or link.
    pub fn new(id: impl Into<ItemId>, headline: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            headline: headline.into(),
            category: String::new(),
            image_url: None,
            link: String::new(),
        }
    }

    /// Set the category label.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the source image URL.
    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Set the attribution link.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    /// Category to render, falling back to `default` when empty.
    pub fn category_or<'a>(&'a self, default: &'a str) -> &'a str {
        let trimmed = self.category.trim();
        if trimmed.is_empty() {
            default
        } else {
            trimmed
        }
    }

    /// Image URL if it parses as an absolute http(s) URL.
    pub fn usable_image_url(&self) -> Option<&str> {
        let raw = self.image_url.as_deref()?.trim();
        match Url::parse(raw) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Some(raw),
            _ => None,
        }
    }

    /// Reject items that cannot be turned into a card.
    pub fn validate(&self) -> InputResult<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(InputError::MissingId);
        }
        if self.headline.trim().is_empty() {
            return Err(InputError::EmptyHeadline(self.id.to_string()));
        }
        Ok(())
    }
}
