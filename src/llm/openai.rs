use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{models::{ChatOptions, ChatResponse, Message, ToolCall, Usage}, LlmError, LlmProvider};

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(client: Client, api_key: String, base_url: String, default_model: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
            default_model,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);

        let mut wire_messages: Vec<Value> = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = &options.system_prompt {
            wire_messages.push(json!({"role": "system", "content": system}));
        }
        wire_messages.extend(messages.iter().map(to_wire));

        let mut body = json!({
            "model": model,
            "messages": wire_messages,
            "temperature": options.temperature.unwrap_or(0.7),
            "max_tokens": options.max_tokens.unwrap_or(4096),
        });

        if let Some(tools) = &options.tools {
            body["tools"] = json!(tools);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited);
            }
            return Err(LlmError::Api(format!("OpenAI Error {}: {}", status, text)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        parse_response(&json, model)
    }

    fn supported_models(&self) -> Vec<&str> {
        vec!["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"]
    }
}

fn to_wire(message: &Message) -> Value {
    match message.role.as_str() {
        "tool" => json!({
            "role": "tool",
            "content": message.content,
            "tool_call_id": message.tool_call_id,
        }),
        _ => {
            let mut wire = json!({"role": message.role, "content": message.content});
            if let Some(calls) = &message.tool_calls {
                wire["tool_calls"] = json!(calls);
            }
            wire
        }
    }
}

fn parse_response(json: &Value, model: &str) -> Result<ChatResponse, LlmError> {
    let message = json["choices"][0]
        .get("message")
        .ok_or(LlmError::InvalidRequest)?;

    let tool_calls: Option<Vec<ToolCall>> = message
        .get("tool_calls")
        .filter(|tc| !tc.is_null())
        .map(|tc| serde_json::from_value(tc.clone()))
        .transpose()
        .map_err(|e| LlmError::Api(format!("malformed tool_calls: {}", e)))?;

    // content is null when the model only calls tools
    let content = message["content"].as_str().unwrap_or_default().to_string();
    if content.is_empty() && tool_calls.as_ref().map_or(true, |tc| tc.is_empty()) {
        return Err(LlmError::InvalidRequest);
    }

    let usage = json.get("usage").map(|u| Usage {
        input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
    });

    Ok(ChatResponse {
        content,
        model: model.to_string(),
        usage,
        tool_calls,
    })
}
