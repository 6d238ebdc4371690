pub mod agent;
pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod history;
pub mod llm;
pub mod session;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use agent::{TurnEngine, TurnSettings};
use config::AppConfig;
use db::DbPool;
use history::DuckDbHistoryStore;
use llm::LlmProvider;
use tools::ToolExecutor;

/// Wires the turn engine from explicitly constructed collaborators.
pub fn build_engine(config: &AppConfig, pool: DbPool, llm: Arc<dyn LlmProvider>) -> Arc<TurnEngine> {
    let tools = Arc::new(ToolExecutor::new(pool.clone()));
    let history = Arc::new(DuckDbHistoryStore::new(
        pool,
        Duration::from_secs(config.chat.history_ttl_secs),
    ));
    Arc::new(TurnEngine::new(llm, tools, history, TurnSettings::from_config(config)))
}
