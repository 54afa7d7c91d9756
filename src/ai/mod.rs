mod client;
mod gateway;
pub mod templates;

use std::sync::Arc;

use crate::config::{GenerationConfig, LlmProvider};
use crate::error::Result;

pub use client::{
    estimate_tokens, ClaudeGenerator, GenerationRequest, GenerationResponse, MockGenerator,
    TextGenerator,
};
pub use gateway::LlmGateway;

/// Pick the backend named in the config.
pub fn build_generator(config: &GenerationConfig) -> Result<Arc<dyn TextGenerator>> {
    Ok(match config.provider {
        LlmProvider::Mock => Arc::new(MockGenerator),
        LlmProvider::Claude => Arc::new(ClaudeGenerator::new(config)?),
    })
}
