pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- projects table
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    title TEXT NOT NULL,
    tz TEXT NOT NULL DEFAULT 'UTC',
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL
);

-- project_settings table (one row per project)
CREATE TABLE IF NOT EXISTS project_settings (
    project_id INTEGER PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    language TEXT NOT NULL,
    niche TEXT NOT NULL,
    tone TEXT NOT NULL,
    template_id TEXT,
    max_post_len INTEGER NOT NULL DEFAULT 1000,
    safe_mode INTEGER NOT NULL DEFAULT 1,
    autopost_enabled INTEGER NOT NULL DEFAULT 0
);

-- channel_bindings table (zero or one per project)
CREATE TABLE IF NOT EXISTS channel_bindings (
    project_id INTEGER PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    channel_id TEXT NOT NULL,
    channel_name TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    last_check_at TEXT,
    last_error TEXT
);

-- sources table
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    type TEXT NOT NULL DEFAULT 'rss',
    url TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    fetch_interval_min INTEGER NOT NULL DEFAULT 60,
    last_fetch_at TEXT,
    last_error TEXT,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    UNIQUE(project_id, url)
);

CREATE INDEX IF NOT EXISTS idx_sources_project_id ON sources(project_id);

-- source_items table
CREATE TABLE IF NOT EXISTS source_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    external_id TEXT NOT NULL,
    link TEXT NOT NULL,
    title TEXT NOT NULL,
    published_at TEXT,
    raw_text TEXT,
    facts_cache TEXT,
    content_hash TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'new',
    created_at TEXT NOT NULL,
    UNIQUE(source_id, external_id),
    UNIQUE(source_id, link)
);

CREATE INDEX IF NOT EXISTS idx_source_items_content_hash ON source_items(content_hash);

-- post_drafts table
CREATE TABLE IF NOT EXISTS post_drafts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    source_item_id INTEGER NOT NULL REFERENCES source_items(id) ON DELETE CASCADE,
    template_id TEXT,
    text TEXT NOT NULL,
    draft_hash TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'new',
    approved_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_post_drafts_project_status ON post_drafts(project_id, status);
CREATE INDEX IF NOT EXISTS idx_post_drafts_created_at ON post_drafts(created_at);

-- schedules table (zero or one per project)
CREATE TABLE IF NOT EXISTS schedules (
    project_id INTEGER PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    tz TEXT NOT NULL DEFAULT 'UTC',
    slots_json TEXT NOT NULL,
    per_day_limit INTEGER NOT NULL DEFAULT 1,
    enabled INTEGER NOT NULL DEFAULT 0
);

-- publication_logs table
CREATE TABLE IF NOT EXISTS publication_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    draft_id INTEGER NOT NULL REFERENCES post_drafts(id) ON DELETE CASCADE,
    scheduled_at TEXT,
    published_at TEXT,
    external_message_id TEXT,
    status TEXT NOT NULL DEFAULT 'new',
    error_code TEXT,
    error_text TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(draft_id, scheduled_at)
);

-- manual publishes: at most one row per draft
CREATE UNIQUE INDEX IF NOT EXISTS uq_publication_draft_unscheduled
    ON publication_logs(draft_id) WHERE scheduled_at IS NULL;

CREATE INDEX IF NOT EXISTS idx_publication_logs_scheduled_at ON publication_logs(scheduled_at);

-- usage_counters table
CREATE TABLE IF NOT EXISTS usage_counters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    day TEXT NOT NULL,
    drafts_generated INTEGER NOT NULL DEFAULT 0,
    posts_published INTEGER NOT NULL DEFAULT 0,
    llm_calls INTEGER NOT NULL DEFAULT 0,
    tokens_est INTEGER NOT NULL DEFAULT 0,
    UNIQUE(project_id, day)
);
"#;
