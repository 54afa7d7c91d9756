//! Feed-to-channel content pipeline: fetch sources, generate post drafts,
//! publish them by hand or on a per-project schedule.

pub mod ai;
pub mod app;
pub mod channel;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod limits;
pub mod models;
pub mod queue;
pub mod services;
pub mod store;
pub mod text;
pub mod worker;

pub use app::{App, Backends};
pub use config::Config;
pub use error::{AppError, Result};
