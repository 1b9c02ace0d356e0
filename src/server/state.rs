//! Shared application state

use crate::processor::BackgroundRemovalProcessor;
use std::sync::Arc;

/// State shared by all request handlers
#[derive(Clone, Debug)]
pub struct AppState {
    pub processor: Arc<BackgroundRemovalProcessor>,
}

impl AppState {
    #[must_use]
    pub fn new(processor: BackgroundRemovalProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }
}
