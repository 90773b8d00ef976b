use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use storywatch_core::{Candidate, PipelineError};
use storywatch_notify::{ErrorEscalator, NotificationSink};
use storywatch_storage::DedupStore;

use crate::source::SourceAdapter;

/// Result of processing one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Already in the dedup store; nothing was sent.
    AlreadySeen,
    /// Header and body were delivered.
    Delivered,
    /// Parsing or delivery failed; the item stays unmarked.
    Failed,
}

/// Everything one story task needs. Cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct ItemProcessor {
    source: Arc<dyn SourceAdapter>,
    store: Arc<DedupStore>,
    sink: Arc<NotificationSink>,
    escalator: Arc<ErrorEscalator>,
}

impl ItemProcessor {
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        store: Arc<DedupStore>,
        sink: Arc<NotificationSink>,
        escalator: Arc<ErrorEscalator>,
    ) -> Self {
        Self {
            source,
            store,
            sink,
            escalator,
        }
    }

    pub fn source(&self) -> &Arc<dyn SourceAdapter> {
        &self.source
    }

    pub fn escalator(&self) -> &Arc<ErrorEscalator> {
        &self.escalator
    }

    /// Process `candidate`, routing any failure to the escalator.
    pub async fn process(&self, candidate: Candidate) -> ItemOutcome {
        match self.process_story(&candidate).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let source = self.source.name();
                let id = self.source.identifier(&candidate);
                warn!(source, item_id = %id, kind = %e.kind(), "story failed, left unmarked");
                self.escalator.report(source, &e).await;
                ItemOutcome::Failed
            }
        }
    }

    /// has → parse → deliver → mark.
    ///
    /// A failure to mark is reported here and does not turn a delivery into
    /// a failure.
    pub async fn process_story(&self, candidate: &Candidate) -> Result<ItemOutcome, PipelineError> {
        let source = self.source.name();
        let id = self.source.identifier(candidate);
        if self.store.has(&id) {
            debug!(source, item_id = %id, "already delivered");
            return Ok(ItemOutcome::AlreadySeen);
        }

        let story = self.source.parse_item(candidate).await?;
        let header = self.source.header(&story);

        let started = Instant::now();
        let chunks = self
            .sink
            .deliver(&header, &story.body)
            .await
            .map_err(|e| PipelineError::delivery("Failed to deliver story", e))?;
        info!(
            source,
            item_id = %id,
            chunks,
            duration_ms = started.elapsed().as_millis() as u64,
            "story delivered"
        );

        if let Err(e) = self.store.add(id.clone()).await {
            warn!(source, item_id = %id, "delivered story could not be marked");
            let err = PipelineError::storage("Failed to mark story as sent", e);
            self.escalator.report(source, &err).await;
        }

        Ok(ItemOutcome::Delivered)
    }

    /// Mark `candidate` as delivered without sending it.
    ///
    /// Returns `false` if it was already present.
    pub async fn absorb(&self, candidate: &Candidate) -> Result<bool, PipelineError> {
        let id = self.source.identifier(candidate);
        if self.store.has(&id) {
            return Ok(false);
        }
        if let Err(e) = self.store.add(id.clone()).await {
            warn!(source = self.source.name(), item_id = %id, "backlog story could not be marked");
            return Err(PipelineError::storage("Failed to mark story as sent", e));
        }
        debug!(source = self.source.name(), item_id = %id, "absorbed without delivery");
        Ok(true)
    }
}
