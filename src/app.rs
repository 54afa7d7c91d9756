use std::sync::Arc;
use std::time::Duration;

use crate::ai::{build_generator, LlmGateway, TextGenerator};
use crate::channel::{build_channel, ChannelClient};
use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::feed::{FeedRetriever, HttpRetriever};
use crate::limits::{CooldownStore, IdempotencyStore, LockStore, QuotaService, RateLimiter};
use crate::queue::WorkQueue;
use crate::services::{
    AutopostScheduler, ChannelService, DraftService, ProjectService, PublicationService, Sleeper,
    SourceService, TokioSleeper, UsageService,
};
use crate::store::{build_store, KvStore};

/// External collaborators the pipeline talks to.
pub struct Backends {
    pub generator: Arc<dyn TextGenerator>,
    pub channel: Arc<dyn ChannelClient>,
    pub retriever: Arc<dyn FeedRetriever>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Backends {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            generator: build_generator(&config.generation)?,
            channel: build_channel(&config.channel)?,
            retriever: Arc::new(HttpRetriever::new(Duration::from_secs(
                config.fetch.timeout_secs,
            ))?),
            sleeper: Arc::new(TokioSleeper),
        })
    }
}

/// Every service, wired over one repository and one key/TTL store.
#[derive(Clone)]
pub struct App {
    pub repository: Repository,
    pub projects: ProjectService,
    pub channels: ChannelService,
    pub sources: SourceService,
    pub drafts: DraftService,
    pub publication: PublicationService,
    pub autopost: AutopostScheduler,
    pub usage: UsageService,
}

impl App {
    pub async fn new(config: &Config, queue: Option<Arc<dyn WorkQueue>>) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        let store = build_store(config.store_url.as_deref(), &config.db_path).await?;
        let backends = Backends::from_config(config)?;
        Ok(Self::assemble(config, repository, store, backends, queue))
    }

    pub fn assemble(
        config: &Config,
        repository: Repository,
        store: Arc<dyn KvStore>,
        backends: Backends,
        queue: Option<Arc<dyn WorkQueue>>,
    ) -> Self {
        let quota = QuotaService::new(Arc::clone(&store), config.limits.clone());
        let usage = UsageService::new(repository.clone());

        let gateway = LlmGateway::new(
            backends.generator,
            quota.clone(),
            usage.clone(),
            config.generation.llm_max_tokens(),
        );

        let mut sources = SourceService::new(
            repository.clone(),
            backends.retriever,
            quota.clone(),
            LockStore::new(Arc::clone(&store)),
            CooldownStore::new(Arc::clone(&store)),
            config.fetch.clone(),
        );
        if let Some(queue) = queue {
            sources = sources.with_queue(queue);
        }

        let drafts = DraftService::new(
            repository.clone(),
            gateway,
            quota.clone(),
            usage.clone(),
            config.generation.clone(),
        );

        let publication = PublicationService::new(
            repository.clone(),
            Arc::clone(&backends.channel),
            quota,
            RateLimiter::new(Arc::clone(&store), config.limits.publishes_per_hour),
            IdempotencyStore::new(store),
            usage.clone(),
            config.publishing.clone(),
        )
        .with_sleeper(backends.sleeper);

        let autopost = AutopostScheduler::new(
            repository.clone(),
            drafts.clone(),
            publication.clone(),
            config.scheduler.slot_tolerance_min,
        );

        Self {
            projects: ProjectService::new(repository.clone()),
            channels: ChannelService::new(repository.clone(), backends.channel),
            sources,
            drafts,
            publication,
            autopost,
            usage,
            repository,
        }
    }
}
