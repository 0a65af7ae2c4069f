//! Structured item logging utilities.
//!
//! Provides consistent, structured logging for item processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use reel_models::ItemId;

/// Item logger for structured logging with consistent formatting.
///
/// Every line carries the item id and the pipeline stage.
#[derive(Debug, Clone)]
pub struct ItemLogger {
    item_id: String,
    stage: String,
}

impl ItemLogger {
    /// Create a new logger for an item and stage (e.g. "build", "publish").
    pub fn new(item_id: &ItemId, stage: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            stage: stage.to_string(),
        }
    }

    /// Same item, different stage.
    pub fn with_stage(&self, stage: &str) -> Self {
        Self {
            item_id: self.item_id.clone(),
            stage: stage.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Item started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Item progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Item warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Item error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Item completed: {}", message
        );
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Create a tracing span for this item.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "item",
            item_id = %self.item_id,
            stage = %self.stage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_logger_creation() {
        let logger = ItemLogger::new(&ItemId::from(42u64), "build");
        assert_eq!(logger.item_id(), "42");
        assert_eq!(logger.stage(), "build");

        let publish = logger.with_stage("publish");
        assert_eq!(publish.item_id(), "42");
        assert_eq!(publish.stage(), "publish");
    }
}
