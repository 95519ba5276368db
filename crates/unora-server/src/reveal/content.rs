//! Reveal content generation.
//!
//! A [`ContentGenerator`] turns an unlocked milestone into the summary,
//! compatibility insight and conversation starters shown to both partners.
//! The template generator needs no network; the HTTP generator (behind the
//! `ai-content` feature) calls an external AI service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::storage::RevealMilestone;

/// Errors raised while generating reveal content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Content request error: {0}")]
    Request(String),

    #[error("Content service error (status {status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Invalid content: {0}")]
    Invalid(String),
}

/// Generated reveal content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub summary: String,
    pub insight: String,
    pub conversation_starters: Vec<String>,
}

impl GeneratedContent {
    #[cfg(any(test, feature = "ai-content"))]
    fn validate(self) -> Result<Self, ContentError> {
        if self.summary.trim().is_empty() || self.insight.trim().is_empty() {
            return Err(ContentError::Invalid(
                "summary and insight must not be empty".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Produces reveal content for a connection and milestone.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        connection_id: &str,
        milestone: &RevealMilestone,
    ) -> Result<GeneratedContent, ContentError>;
}

/// Fixed placeholder content, used when no AI service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateContentGenerator;

const TEMPLATE_SUMMARY: &str = "Based on your interactions, you both share a genuine \
    appreciation for meaningful connections. Your communication styles complement each other \
    beautifully.";
const TEMPLATE_INSIGHT: &str = "You both value authenticity and deep conversations. This shared \
    foundation suggests strong potential for a lasting connection.";
const TEMPLATE_STARTERS: [&str; 3] = [
    "What's a hobby you've always wanted to try?",
    "What's the most memorable trip you've taken?",
    "What does your ideal weekend look like?",
];

#[async_trait]
impl ContentGenerator for TemplateContentGenerator {
    async fn generate(
        &self,
        _connection_id: &str,
        _milestone: &RevealMilestone,
    ) -> Result<GeneratedContent, ContentError> {
        Ok(GeneratedContent {
            summary: TEMPLATE_SUMMARY.to_string(),
            insight: TEMPLATE_INSIGHT.to_string(),
            conversation_starters: TEMPLATE_STARTERS.iter().map(ToString::to_string).collect(),
        })
    }
}

#[cfg(feature = "ai-content")]
pub use http::HttpContentGenerator;

#[cfg(feature = "ai-content")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Serialize;
    use tracing::{debug, warn};

    use super::{ContentError, ContentGenerator, GeneratedContent};
    use crate::storage::RevealMilestone;

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct ContentRequest<'a> {
        connection_id: &'a str,
        milestone_id: &'a str,
        reveal_type: &'a str,
        title: &'a str,
        day_required: i64,
    }

    /// Calls an external AI service with a JSON POST and expects a
    /// [`GeneratedContent`] body back.
    #[derive(Debug)]
    pub struct HttpContentGenerator {
        http: reqwest::Client,
        endpoint: String,
    }

    impl HttpContentGenerator {
        pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ContentError> {
            // No-op if a provider is already installed.
            let _ = rustls::crypto::ring::default_provider().install_default();

            let http = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ContentError::Request(e.to_string()))?;

            Ok(Self {
                http,
                endpoint: endpoint.into(),
            })
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }

        async fn request(
            &self,
            connection_id: &str,
            milestone: &RevealMilestone,
        ) -> Result<GeneratedContent, ContentError> {
            let body = ContentRequest {
                connection_id,
                milestone_id: &milestone.id,
                reveal_type: &milestone.reveal_type,
                title: &milestone.title,
                day_required: milestone.day_required,
            };

            let response = self
                .http
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| ContentError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let status_code = status.as_u16();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<failed to read body>".to_string());
                warn!(status = status_code, body = %body, "Content service returned error");
                return Err(ContentError::ApiError {
                    status: status_code,
                    body,
                });
            }

            let content: GeneratedContent = response
                .json()
                .await
                .map_err(|e| ContentError::Invalid(e.to_string()))?;
            debug!(connection_id, milestone_id = %milestone.id, "Content generated");
            content.validate()
        }
    }

    #[async_trait]
    impl ContentGenerator for HttpContentGenerator {
        async fn generate(
            &self,
            connection_id: &str,
            milestone: &RevealMilestone,
        ) -> Result<GeneratedContent, ContentError> {
            self.request(connection_id, milestone).await
        }
    }

}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn milestone() -> RevealMilestone {
        RevealMilestone {
            id: "m1".into(),
            reveal_number: 1,
            day_required: 3,
            reveal_type: "personality".into(),
            title: "Personality Match".into(),
            credit_cost: 50,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn template_generator_returns_placeholder_content() {
        let content = TemplateContentGenerator
            .generate("c1", &milestone())
            .await
            .unwrap();
        assert!(content.summary.starts_with("Based on your interactions"));
        assert_eq!(content.conversation_starters.len(), 3);
        assert_eq!(content.clone().validate().unwrap(), content);
    }

    #[test]
    fn empty_summary_is_invalid() {
        let content = GeneratedContent {
            summary: " ".into(),
            insight: "x".into(),
            conversation_starters: vec![],
        };
        assert!(matches!(content.validate(), Err(ContentError::Invalid(_))));
    }
}
