use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChannelClient, ChannelError};

/// Records every delivered text. Queued errors are returned first, one per call.
#[derive(Default)]
pub struct FakeChannel {
    pub sent: Mutex<Vec<String>>,
    pub tests: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<ChannelError>>,
}

impl FakeChannel {
    pub fn failing_with(errors: impl IntoIterator<Item = ChannelError>) -> Self {
        Self {
            failures: Mutex::new(errors.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelClient for FakeChannel {
    async fn send_post(&self, _channel_id: &str, text: &str) -> Result<String, ChannelError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(text.to_string());
        Ok(sent.len().to_string())
    }

    async fn send_test_message(&self, channel_id: &str, _text: &str) -> Result<(), ChannelError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.tests.lock().unwrap().push(channel_id.to_string());
        Ok(())
    }
}
