use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, DEFAULT_SYSTEM_PROMPT};
use crate::history::{ChatMessage, HistoryStore, Role};
use crate::llm::models::{ChatOptions, ChatResponse, Message};
use crate::llm::{LlmError, LlmProvider};
use crate::tools::ToolExecutor;

/// Answer used whenever the model cannot be reached or misbehaves.
pub const APOLOGY: &str =
    "I apologize, but I encountered an error while processing your request. Please try again.";

/// Answer used when the model keeps asking for tools past the iteration cap.
pub const TOOL_LOOP_FALLBACK: &str =
    "I'm sorry, I wasn't able to finish that request. Could you tell me again which date and time you'd like?";

#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub system_prompt: String,
    pub max_tool_iterations: usize,
    pub model_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl TurnSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_prompt: config.chat.system_prompt.clone(),
            max_tool_iterations: config.chat.max_tool_iterations,
            model_timeout: Duration::from_secs(config.llm.request_timeout_secs),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_iterations: 5,
            model_timeout: Duration::from_secs(60),
            temperature: 0.7,
            max_tokens: 400,
        }
    }
}

pub enum TurnOutcome {
    Completed(CompletedTurn),
    Cancelled,
}

/// A finished turn whose transcript entries are staged but not yet written.
///
/// Nothing reaches the history store until [`TurnEngine::commit`] is called;
/// dropping a `CompletedTurn` discards it.
#[must_use = "a completed turn is only recorded once committed"]
#[derive(Debug)]
pub struct CompletedTurn {
    session_id: String,
    input: String,
    answer: String,
}

impl CompletedTurn {
    pub(crate) fn new(session_id: &str, input: &str, answer: impl Into<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            input: input.to_string(),
            answer: answer.into(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }
}

#[derive(Debug, Error)]
enum TurnError {
    #[error("turn cancelled")]
    Cancelled,
    #[error(transparent)]
    Model(#[from] LlmError),
}

/// Drives single turns against the model, running tool calls in between.
pub struct TurnEngine {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolExecutor>,
    history: Arc<dyn HistoryStore>,
    settings: TurnSettings,
}

impl TurnEngine {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolExecutor>,
        history: Arc<dyn HistoryStore>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            llm,
            tools,
            history,
            settings,
        }
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Runs one turn over `input`. Returns [`TurnOutcome::Cancelled`] as soon
    /// as `cancel` fires at any suspension point; a cancelled turn leaves the
    /// transcript untouched.
    pub async fn run(&self, session_id: &str, input: &str, cancel: &CancellationToken) -> TurnOutcome {
        if cancel.is_cancelled() {
            return TurnOutcome::Cancelled;
        }
        info!("[Session {}] Processing message: {:?}", session_id, input);

        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TurnOutcome::Cancelled,
            loaded = self.history.load(session_id) => loaded,
        };
        let transcript = loaded.unwrap_or_else(|e| {
            warn!("[Session {}] Error loading history: {}", session_id, e);
            Vec::new()
        });

        let answer = match self.converse(session_id, &transcript, input, cancel).await {
            Ok(answer) => answer,
            Err(TurnError::Cancelled) => {
                debug!("[Session {}] Turn cancelled", session_id);
                return TurnOutcome::Cancelled;
            }
            Err(TurnError::Model(e)) => {
                warn!("[Session {}] Error processing message: {}", session_id, e);
                APOLOGY.to_string()
            }
        };

        if cancel.is_cancelled() {
            return TurnOutcome::Cancelled;
        }
        info!("[Session {}] Generated response: {:?}", session_id, answer);

        TurnOutcome::Completed(CompletedTurn::new(session_id, input, answer))
    }

    /// Records the user input and the answer, in that order, and hands back the answer.
    pub async fn commit(&self, turn: CompletedTurn) -> String {
        let CompletedTurn {
            session_id,
            input,
            answer,
        } = turn;

        let entries = vec![ChatMessage::user(input), ChatMessage::agent(answer.clone())];
        if let Err(e) = self.history.append_all(&session_id, entries).await {
            warn!("[Session {}] Error saving history: {}", session_id, e);
        }
        answer
    }

    /// Runs a turn that cannot be superseded and commits it.
    pub async fn respond(&self, session_id: &str, input: &str) -> String {
        match self.run(session_id, input, &CancellationToken::new()).await {
            TurnOutcome::Completed(turn) => self.commit(turn).await,
            TurnOutcome::Cancelled => APOLOGY.to_string(),
        }
    }

    async fn converse(
        &self,
        session_id: &str,
        transcript: &[ChatMessage],
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError> {
        let mut context = build_context(transcript, input);
        let options = ChatOptions {
            model: None,
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_tokens),
            system_prompt: Some(self.settings.system_prompt.clone()),
            tools: Some(self.tools.definitions()),
        };

        let mut iterations = 0;
        loop {
            let response = self.call_model(&context, options.clone(), cancel).await?;

            let calls = response.requested_tools().to_vec();
            if calls.is_empty() {
                let answer = response.content.trim();
                if answer.is_empty() {
                    return Err(LlmError::InvalidRequest.into());
                }
                return Ok(answer.to_string());
            }

            if iterations >= self.settings.max_tool_iterations {
                warn!(
                    "[Session {}] Model still requesting tools after {} iterations, giving up",
                    session_id, iterations
                );
                return Ok(TOOL_LOOP_FALLBACK.to_string());
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                if cancel.is_cancelled() {
                    return Err(TurnError::Cancelled);
                }
                let result = self.tools.execute(call).await;
                results.push(Message::tool_result(call, result.content));
            }
            if cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }

            context.push(Message::assistant_tool_calls(response.content, calls));
            context.extend(results);
            iterations += 1;
        }
    }

    async fn call_model(
        &self,
        context: &[Message],
        options: ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, TurnError> {
        let timeout = self.settings.model_timeout;
        let call = tokio::time::timeout(timeout, self.llm.chat(context, options));

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            result = call => match result {
                Ok(response) => response?,
                Err(_) => return Err(LlmError::Timeout(timeout).into()),
            },
        };

        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }
        Ok(response)
    }
}

fn build_context(transcript: &[ChatMessage], input: &str) -> Vec<Message> {
    let mut context: Vec<Message> = transcript
        .iter()
        .map(|m| match m.role {
            Role::User => Message::user(m.content.clone()),
            Role::Agent => Message::assistant(m.content.clone()),
        })
        .collect();
    context.push(Message::user(input));
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_maps_roles_and_appends_input() {
        let transcript = vec![ChatMessage::user("hi"), ChatMessage::agent("hello, your name?")];
        let context = build_context(&transcript, "Ana");

        let roles: Vec<&str> = context.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert_eq!(context[2].content, "Ana");
    }
}
