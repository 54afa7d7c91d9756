mod autopost;
mod channels;
mod drafts;
mod projects;
mod publication;
mod sources;
mod usage;

pub use autopost::{resolve_slot, AutopostScheduler};
pub use channels::ChannelService;
pub use drafts::{finalize_post, DraftService};
pub use projects::ProjectService;
pub use publication::{PublicationService, PublishOutcome, Sleeper, TokioSleeper};
pub use sources::{FetchOutcome, SourceService};
pub use usage::UsageService;
