use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use autoposter::ai::templates::list_templates;
use autoposter::config::{Config, LogFormat};
use autoposter::error::Result;
use autoposter::models::{DraftStatus, SettingsUpdate, SourceType};
use autoposter::queue::{ChannelQueue, WorkQueue};
use autoposter::worker::Worker;
use autoposter::App;

const JOB_QUEUE_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "autoposter")]
#[command(about = "Turn feeds into channel posts on a schedule")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true, env = "AUTOPOSTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    Rss,
    Url,
}

impl From<SourceKind> for SourceType {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Rss => SourceType::Rss,
            SourceKind::Url => SourceType::Url,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker: queued jobs, periodic fetching and autoposting
    Run,

    /// Create a project
    InitProject {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        title: String,
        /// IANA time zone, e.g. Europe/Berlin
        #[arg(long, default_value = "UTC")]
        tz: String,
    },

    /// Change project settings
    Settings {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        niche: Option<String>,
        #[arg(long)]
        tone: Option<String>,
        /// One of the preset template ids
        #[arg(long)]
        template: Option<String>,
        #[arg(long)]
        max_post_len: Option<usize>,
        #[arg(long)]
        safe_mode: Option<bool>,
    },

    /// List the available post templates
    Templates,

    /// Register a feed or page for a project
    AddSource {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        url: String,
        #[arg(long, value_enum, default_value = "rss")]
        kind: SourceKind,
    },

    /// Fetch one source, or every source of a project
    Fetch {
        #[arg(long, conflicts_with = "source", required_unless_present = "source")]
        project: Option<i64>,
        #[arg(long)]
        source: Option<i64>,
    },

    /// Generate a draft from a fetched item
    Generate {
        #[arg(long)]
        item: i64,
        #[arg(long)]
        template: Option<String>,
    },

    /// List a project's drafts
    Drafts {
        #[arg(long)]
        project: i64,
        /// Filter by status (new, needs_approval, ready, rejected, published, failed)
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Approve a draft for publishing
    Approve {
        #[arg(long)]
        draft: i64,
    },

    /// Reject a draft
    Reject {
        #[arg(long)]
        draft: i64,
    },

    /// Publish a draft now
    Publish {
        #[arg(long)]
        draft: i64,
    },

    /// Configure the autopost schedule
    Schedule {
        #[arg(long)]
        project: i64,
        #[arg(long, default_value = "UTC")]
        tz: String,
        /// Local posting time HH:MM, repeatable
        #[arg(long = "slot")]
        slots: Vec<String>,
        #[arg(long, default_value_t = 1)]
        per_day: u32,
        #[arg(long)]
        disable: bool,
    },

    /// Attach a messaging channel to a project
    BindChannel {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        name: Option<String>,
    },

    /// Send a test message to the project's channel
    CheckChannel {
        #[arg(long)]
        project: i64,
    },

    /// Show a day's usage counters
    Usage {
        #[arg(long)]
        project: i64,
        /// YYYY-MM-DD, defaults to today (UTC)
        #[arg(long)]
        day: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            return ExitCode::from(2);
        }
    };
    init_logging(&config);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = %e, code = e.code(), "Command failed");
            eprintln!("Error: {}", e.user_message());
            ExitCode::from(1)
        }
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Run => run_worker(config).await,
        command => run_command(command, config).await,
    }
}

async fn run_worker(config: Config) -> Result<()> {
    let (queue, jobs) = ChannelQueue::new(JOB_QUEUE_CAPACITY);
    let queue: Arc<dyn WorkQueue> = Arc::new(queue);
    let app = App::new(&config, Some(queue)).await?;
    Worker::new(app, jobs, &config.scheduler).run().await
}

async fn run_command(command: Commands, config: Config) -> Result<()> {
    let app = App::new(&config, None).await?;
    let now = Utc::now();

    match command {
        Commands::Run => return run_worker(config).await,

        Commands::InitProject { owner, title, tz } => {
            let project = app.projects.create_project(&owner, &title, &tz, now).await?;
            println!("Created project {} ({})", project.id, project.title);
        }

        Commands::Settings {
            project,
            language,
            niche,
            tone,
            template,
            max_post_len,
            safe_mode,
        } => {
            let settings = app
                .projects
                .update_settings(
                    project,
                    SettingsUpdate {
                        language,
                        niche,
                        tone,
                        template_id: template.map(Some),
                        max_post_len,
                        safe_mode,
                        autopost_enabled: None,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }

        Commands::Templates => {
            for preset in list_templates() {
                println!("{:<10} {}", preset.id, preset.title);
            }
        }

        Commands::AddSource { project, url, kind } => {
            let source = app.sources.add_source(project, kind.into(), &url).await?;
            println!("Added source {} ({})", source.id, source.url);
        }

        Commands::Fetch { project, source } => {
            let outcomes = match (source, project) {
                (Some(source_id), _) => vec![app.sources.fetch_source(source_id).await?],
                (None, Some(project_id)) => app.sources.trigger_fetch(project_id, now).await?,
                (None, None) => Vec::new(),
            };
            for outcome in outcomes {
                println!(
                    "Source {}: {} new item(s), status {}",
                    outcome.source.id, outcome.saved, outcome.source.status
                );
            }
        }

        Commands::Generate { item, template } => {
            let draft = app
                .drafts
                .generate(item, template.as_deref())
                .await?
                .into_inner();
            println!("Draft {} [{}]\n{}", draft.id, draft.status, draft.text);
        }

        Commands::Drafts {
            project,
            status,
            limit,
        } => {
            let status = status
                .map(|s| s.parse::<DraftStatus>())
                .transpose()
                .map_err(autoposter::AppError::Validation)?;
            for draft in app.drafts.list_drafts(project, status, limit).await? {
                println!("{:>6}  {:<15} {}", draft.id, draft.status.as_str(), draft.text);
            }
        }

        Commands::Approve { draft } => {
            let draft = app.drafts.approve(draft, now).await?;
            println!("Draft {} is {}", draft.id, draft.status);
        }

        Commands::Reject { draft } => {
            let draft = app.drafts.reject(draft).await?;
            println!("Draft {} is {}", draft.id, draft.status);
        }

        Commands::Publish { draft } => {
            let log = app.publication.publish_draft(draft).await?.into_log();
            match log.external_message_id {
                Some(message_id) => println!("Draft {} published as message {}", draft, message_id),
                None => println!(
                    "Draft {} not published: {}",
                    draft,
                    log.error_text.unwrap_or_else(|| log.status.to_string())
                ),
            }
        }

        Commands::Schedule {
            project,
            tz,
            slots,
            per_day,
            disable,
        } => {
            let schedule = app
                .projects
                .configure_schedule(project, &tz, &slots, per_day, !disable)
                .await?;
            println!(
                "Schedule for project {}: {} [{}], {} per day, {}",
                project,
                schedule.slots.join(", "),
                schedule.tz,
                schedule.per_day_limit,
                if schedule.enabled { "enabled" } else { "disabled" }
            );
        }

        Commands::BindChannel {
            project,
            channel,
            name,
        } => {
            let binding = app.channels.bind_channel(project, &channel, name).await?;
            println!("Channel {} bound, status {}", binding.channel_id, binding.status);
        }

        Commands::CheckChannel { project } => {
            let binding = app.channels.check_binding(project, now).await?;
            println!("Channel {} is {}", binding.channel_id, binding.status);
        }

        Commands::Usage { project, day } => {
            let day = day.unwrap_or_else(|| now.date_naive());
            let usage = app.usage.usage_for_day(project, day).await?;
            println!("{}", serde_json::to_string_pretty(&usage)?);
        }
    }

    Ok(())
}
