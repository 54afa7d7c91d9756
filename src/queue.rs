//! Background job queue between the pipeline stages.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    FetchSource { source_id: i64 },
    GenerateDraft { source_item_id: i64 },
    PublishDraft { draft_id: i64 },
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<()>;

    async fn enqueue_fetch_source(&self, source_id: i64) -> Result<()> {
        self.enqueue(Job::FetchSource { source_id }).await
    }

    async fn enqueue_generate_draft(&self, source_item_id: i64) -> Result<()> {
        self.enqueue(Job::GenerateDraft { source_item_id }).await
    }

    async fn enqueue_publish_draft(&self, draft_id: i64) -> Result<()> {
        self.enqueue(Job::PublishDraft { draft_id }).await
    }
}

/// In-process queue. The receiving half goes to the worker.
#[derive(Clone)]
pub struct ChannelQueue {
    tx: mpsc::Sender<Job>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl WorkQueue for ChannelQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        tracing::debug!(?job, "Enqueue");
        self.tx
            .send(job)
            .await
            .map_err(|e| AppError::Other(anyhow::anyhow!("work queue closed, dropped {:?}", e.0)))
    }
}
