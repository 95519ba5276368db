//! Reveal unlock engine and content population.

pub mod content;
pub mod service;
pub mod worker;


use std::sync::Arc;

use tracing::{info, warn};
use unora_core::config::RevealConfig;

pub use content::{ContentError, ContentGenerator, GeneratedContent, TemplateContentGenerator};
pub use service::{ConnectionReveals, ContentView, RevealService, RevealView, UnlockOutcome};
pub use worker::{ContentWorker, PopulateError};

/// Pick the content generator for this build and configuration.
pub fn content_generator(config: &RevealConfig) -> Arc<dyn ContentGenerator> {
    match config.generator_url.as_deref() {
        #[cfg(feature = "ai-content")]
        Some(url) => {
            let timeout = std::time::Duration::from_secs(config.generator_timeout_secs);
            match content::HttpContentGenerator::new(url, timeout) {
                Ok(generator) => {
                    info!(url, "Using AI reveal content service");
                    Arc::new(generator)
                }
                Err(e) => {
                    warn!(error = %e, "AI content client unavailable, using templates");
                    Arc::new(TemplateContentGenerator)
                }
            }
        }
        #[cfg(not(feature = "ai-content"))]
        Some(url) => {
            warn!(url, "Built without the ai-content feature, using templates");
            Arc::new(TemplateContentGenerator)
        }
        None => {
            info!("Using template reveal content");
            Arc::new(TemplateContentGenerator)
        }
    }
}
