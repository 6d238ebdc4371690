#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use slotchat::agent::{TurnEngine, TurnSettings};
use slotchat::config::DatabaseConfig;
use slotchat::db::{get_connection, DbPool};
use slotchat::history::DuckDbHistoryStore;
use slotchat::llm::models::{ChatOptions, ChatResponse, Message, ToolCall};
use slotchat::llm::{LlmError, LlmProvider};
use slotchat::tools::ToolExecutor;

type Script = dyn Fn(usize, &[Message]) -> Result<ChatResponse, LlmError> + Send + Sync;

/// Model stand-in whose replies come from a closure of (call index, context).
pub struct ScriptedProvider {
    calls: AtomicUsize,
    delay: Duration,
    script: Box<Script>,
}

impl ScriptedProvider {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(usize, &[Message]) -> Result<ChatResponse, LlmError> + Send + Sync + 'static,
    {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            script: Box::new(script),
        }
    }

    /// Replies "echo: <last user message>".
    pub fn echo() -> Self {
        Self::new(|_, messages| {
            let last = messages.iter().rev().find(|m| m.role == "user").map(|m| m.content.clone());
            Ok(text(format!("echo: {}", last.unwrap_or_default())))
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: &[Message], _options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(n, messages)
    }

    fn supported_models(&self) -> Vec<&str> {
        vec!["scripted"]
    }
}

pub fn text(content: impl Into<String>) -> ChatResponse {
    ChatResponse {
        content: content.into(),
        model: "scripted".to_string(),
        usage: None,
        tool_calls: None,
    }
}

pub fn tool_call(name: &str, arguments: &str) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        model: "scripted".to_string(),
        usage: None,
        tool_calls: Some(vec![ToolCall::new(Some(format!("call_{}", name)), name, arguments)]),
    }
}

pub fn memory_pool() -> DbPool {
    get_connection(&DatabaseConfig {
        path: ":memory:".to_string(),
    })
    .unwrap()
}

pub fn history_store(pool: &DbPool, ttl: Duration) -> Arc<DuckDbHistoryStore> {
    Arc::new(DuckDbHistoryStore::new(pool.clone(), ttl))
}

pub fn engine_with(
    provider: Arc<ScriptedProvider>,
    pool: &DbPool,
    settings: TurnSettings,
) -> (Arc<TurnEngine>, Arc<DuckDbHistoryStore>) {
    let history = history_store(pool, Duration::from_secs(3600));
    let tools = Arc::new(ToolExecutor::new(pool.clone()));
    let llm: Arc<dyn LlmProvider> = provider;
    let engine = Arc::new(TurnEngine::new(llm, tools, history.clone(), settings));
    (engine, history)
}

pub fn engine(provider: Arc<ScriptedProvider>, pool: &DbPool) -> (Arc<TurnEngine>, Arc<DuckDbHistoryStore>) {
    engine_with(provider, pool, TurnSettings::default())
}
