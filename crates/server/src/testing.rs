use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kopi_agent::{ChatMessage, LlmClient, LlmError};
use kopi_core::config::AppConfig;
use kopi_db::fixtures::SeedDataset;
use kopi_db::{connect_with_settings, migrations};

use crate::bootstrap::assemble;
use crate::gateway::AppState;

/// Replays canned engine replies; an empty script behaves like an overloaded engine.
pub struct StubLlm {
    replies: Mutex<VecDeque<String>>,
}

impl StubLlm {
    pub fn new(replies: &[&str]) -> Self {
        Self { replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()) }
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .ok_or_else(|| LlmError::Status { status: 503, body: "stub script exhausted".to_string() })
    }
}

pub async fn seeded_state(replies: &[&str]) -> AppState {
    let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    SeedDataset::load(&pool).await.expect("seed");

    assemble(&AppConfig::default(), pool, Arc::new(StubLlm::new(replies)))
        .await
        .expect("assemble application state")
}
