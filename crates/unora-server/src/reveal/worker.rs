//! Best-effort population of reveal content.
//!
//! Unlocking commits first; content is attached afterwards by a spawned task
//! and, when that fails, by the periodic backfill until the attempt budget
//! is spent.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::content::{ContentError, ContentGenerator};
use crate::error::EngineError;
use crate::storage::queries_reveals::fetch_milestone;
use crate::storage::{EngineDatabase, RevealMilestone};

/// Reveals handled per backfill pass.
const BACKFILL_BATCH: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum PopulateError {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<crate::storage::DatabaseError> for PopulateError {
    fn from(e: crate::storage::DatabaseError) -> Self {
        Self::Engine(e.into())
    }
}

impl From<sqlx::Error> for PopulateError {
    fn from(e: sqlx::Error) -> Self {
        Self::Engine(e.into())
    }
}

#[derive(Clone)]
pub struct ContentWorker {
    db: EngineDatabase,
    generator: Arc<dyn ContentGenerator>,
    max_attempts: i64,
}

impl ContentWorker {
    pub fn new(db: EngineDatabase, generator: Arc<dyn ContentGenerator>, max_attempts: i64) -> Self {
        Self {
            db,
            generator,
            max_attempts,
        }
    }

    /// Populate content for a freshly unlocked reveal in the background.
    pub fn spawn(&self, reveal_id: String, connection_id: String, milestone: RevealMilestone) {
        let worker = self.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.populate(&reveal_id, &connection_id, &milestone).await {
                warn!(reveal_id, error = %e, "Reveal content generation failed, will retry");
            }
        });
    }

    /// Generate and store content for one reveal.
    ///
    /// Returns `Ok(false)` when the reveal already has content. A generator
    /// failure bumps the reveal's attempt counter before being returned.
    pub async fn populate(
        &self,
        reveal_id: &str,
        connection_id: &str,
        milestone: &RevealMilestone,
    ) -> Result<bool, PopulateError> {
        if self.db.get_reveal_content(reveal_id).await?.is_some() {
            return Ok(false);
        }

        let content = match self.generator.generate(connection_id, milestone).await {
            Ok(content) => content,
            Err(e) => {
                let attempts = self.db.increment_content_attempts(reveal_id).await?;
                debug!(reveal_id, attempts, "Recorded failed content attempt");
                return Err(e.into());
            }
        };

        let inserted = self
            .db
            .insert_reveal_content(
                reveal_id,
                &content.summary,
                &content.insight,
                &content.conversation_starters,
                unora_core::db::unix_timestamp(),
            )
            .await?;
        if inserted {
            debug!(reveal_id, "Reveal content stored");
        }
        Ok(inserted)
    }

    /// Retry unlocked reveals that still lack content. Returns how many got content.
    pub async fn backfill(&self) -> Result<u64, PopulateError> {
        let pending = self
            .db
            .list_reveals_missing_content(self.max_attempts, BACKFILL_BATCH)
            .await?;

        let mut populated = 0;
        for reveal in pending {
            let found = {
                let mut conn = self.db.pool().acquire().await?;
                fetch_milestone(&mut conn, &reveal.milestone_id).await
            };
            let milestone = match found {
                Ok(m) => m,
                Err(e) => {
                    warn!(reveal_id = %reveal.id, error = %e, "Skipping reveal without milestone");
                    self.db.increment_content_attempts(&reveal.id).await?;
                    continue;
                }
            };

            match self
                .populate(&reveal.id, &reveal.connection_id, &milestone)
                .await
            {
                Ok(true) => populated += 1,
                Ok(false) => {}
                Err(e) => warn!(reveal_id = %reveal.id, error = %e, "Content backfill failed"),
            }
        }

        if populated > 0 {
            info!(populated, "Reveal content backfilled");
        }
        Ok(populated)
    }
}
