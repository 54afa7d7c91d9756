use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::app::App;
use crate::config::SchedulerConfig;
use crate::error::{AppError, DraftGenerationError, Result};
use crate::models::{Inserted, PostDraft};
use crate::queue::Job;

const GENERATION_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Executes queued jobs and drives the periodic autopost and fetch passes.
pub struct Worker {
    app: App,
    jobs: mpsc::Receiver<Job>,
    tick: Duration,
    fetch_tick: Duration,
    retry_delay: Duration,
}

impl Worker {
    pub fn new(app: App, jobs: mpsc::Receiver<Job>, scheduler: &SchedulerConfig) -> Self {
        Self {
            app,
            jobs,
            tick: Duration::from_secs(scheduler.tick_secs.max(1)),
            fetch_tick: Duration::from_secs(scheduler.fetch_tick_secs.max(1)),
            retry_delay: GENERATION_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await
    }

    /// Run until `shutdown` resolves or the job queue closes. In-flight jobs
    /// are awaited before returning.
    ///
    /// The autopost and fetch passes run as their own tasks so this loop keeps
    /// draining the queue while a pass waits to enqueue. A tick that finds the
    /// previous pass of the same kind still running is skipped.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut autopost = tokio::time::interval(self.tick);
        autopost.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut fetch = tokio::time::interval(self.fetch_tick);
        fetch.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tasks = JoinSet::new();
        let mut autopost_pass: Option<JoinHandle<()>> = None;
        let mut fetch_pass: Option<JoinHandle<()>> = None;
        tracing::info!("Worker started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                job = self.jobs.recv() => {
                    let Some(job) = job else {
                        tracing::info!("Job queue closed");
                        break;
                    };
                    let app = self.app.clone();
                    let retry_delay = self.retry_delay;
                    tasks.spawn(async move { handle_job(&app, job, retry_delay).await });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Job task panicked");
                    }
                }
                _ = autopost.tick() => {
                    if is_running(&autopost_pass) {
                        tracing::debug!("Autopost pass still running, tick skipped");
                    } else {
                        let app = self.app.clone();
                        autopost_pass = Some(tokio::spawn(async move { run_autopost_pass(&app).await }));
                    }
                }
                _ = fetch.tick() => {
                    if is_running(&fetch_pass) {
                        tracing::debug!("Fetch pass still running, tick skipped");
                    } else {
                        let app = self.app.clone();
                        fetch_pass = Some(tokio::spawn(async move { run_fetch_pass(&app).await }));
                    }
                }
            }
        }

        // senders waiting on a full queue fail instead of blocking shutdown
        self.jobs.close();
        for pass in [autopost_pass, fetch_pass].into_iter().flatten() {
            if let Err(e) = pass.await {
                tracing::error!(error = %e, "Periodic pass panicked");
            }
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Job task panicked");
            }
        }

        let mut dropped = 0usize;
        while self.jobs.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::info!(dropped, "Queued jobs left unprocessed");
        }
        tracing::info!("Worker stopped");
        Ok(())
    }
}

fn is_running(pass: &Option<JoinHandle<()>>) -> bool {
    pass.as_ref().is_some_and(|handle| !handle.is_finished())
}

async fn run_autopost_pass(app: &App) {
    match app.autopost.tick(Utc::now()).await {
        Ok(logs) if !logs.is_empty() => {
            tracing::info!(published = logs.len(), "Autopost pass finished");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Autopost pass failed"),
    }
}

async fn run_fetch_pass(app: &App) {
    match app.sources.fetch_due(Utc::now()).await {
        Ok(outcomes) => {
            let saved: usize = outcomes.iter().map(|o| o.saved).sum();
            tracing::debug!(sources = outcomes.len(), saved, "Fetch pass finished");
        }
        Err(e) => tracing::warn!(error = %e, "Fetch pass failed"),
    }
}

async fn handle_job(app: &App, job: Job, retry_delay: Duration) {
    match job {
        Job::FetchSource { source_id } => match app.sources.fetch_source(source_id).await {
            Ok(outcome) => tracing::debug!(source_id, saved = outcome.saved, "Fetch job done"),
            Err(e) => tracing::warn!(source_id, error = %e, "Fetch job failed"),
        },
        Job::GenerateDraft { source_item_id } => {
            match generate_with_retry(app, source_item_id, retry_delay).await {
                Ok(inserted) => {
                    tracing::debug!(source_item_id, draft_id = inserted.into_inner().id, "Generate job done")
                }
                Err(AppError::DraftGeneration(
                    e @ (DraftGenerationError::DuplicateDraft { .. }
                    | DraftGenerationError::DuplicateContent { .. }),
                )) => tracing::info!(source_item_id, reason = %e, "Generate job skipped"),
                Err(e) => tracing::warn!(source_item_id, error = %e, "Generate job failed"),
            }
        }
        Job::PublishDraft { draft_id } => match app.publication.publish_draft(draft_id).await {
            Ok(outcome) => tracing::debug!(draft_id, status = %outcome.log().status, "Publish job done"),
            Err(e) => tracing::warn!(draft_id, error = %e, "Publish job failed"),
        },
    }
}

/// One retry when the generation backend is down.
pub async fn generate_with_retry(
    app: &App,
    source_item_id: i64,
    retry_delay: Duration,
) -> Result<Inserted<PostDraft>> {
    match app.drafts.generate(source_item_id, None).await {
        Err(AppError::DraftGeneration(DraftGenerationError::BackendUnavailable(reason))) => {
            tracing::warn!(source_item_id, reason, "Generation backend unavailable, retrying once");
            tokio::time::sleep(retry_delay).await;
            app.drafts.generate(source_item_id, None).await
        }
        other => other,
    }
}
