use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{models::{ChatOptions, ChatResponse, Message, ToolCall, ToolDefinition, Usage}, LlmError, LlmProvider};

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl GeminiProvider {
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
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);

        let mut body = json!({
            "contents": to_contents(messages),
            "generationConfig": {
                "temperature": options.temperature.unwrap_or(0.7),
                "maxOutputTokens": options.max_tokens.unwrap_or(4096),
            }
        });

        if let Some(system) = &options.system_prompt {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if let Some(tools) = &options.tools {
            body["tools"] = json!([{"functionDeclarations": function_declarations(tools)}]);
        }

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
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
            return Err(LlmError::Api(format!("Gemini Error {}: {}", status, text)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        parse_response(&json, model)
    }

    fn supported_models(&self) -> Vec<&str> {
        vec!["gemini-2.0-flash", "gemini-2.5-flash", "gemini-2.5-pro"]
    }
}

fn function_declarations(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.function.name,
                "description": t.function.description,
                "parameters": t.function.parameters,
            })
        })
        .collect()
}

/// Gemini has no `tool` role: function responses travel as `user` parts,
/// and consecutive ones must share a single content entry.
fn to_contents(messages: &[Message]) -> Vec<Value> {
    let mut contents: Vec<Value> = Vec::new();

    for message in messages {
        match message.role.as_str() {
            "system" => continue,
            "tool" => {
                let part = json!({
                    "functionResponse": {
                        "name": message.name.clone().unwrap_or_default(),
                        "response": {"result": message.content},
                    }
                });
                let merged = contents.last_mut().and_then(|last| {
                    let is_response_turn = last["role"] == "user"
                        && last["parts"][0].get("functionResponse").is_some();
                    if is_response_turn {
                        last["parts"].as_array_mut()
                    } else {
                        None
                    }
                });
                match merged {
                    Some(parts) => parts.push(part),
                    None => contents.push(json!({"role": "user", "parts": [part]})),
                }
            }
            "assistant" => {
                let mut parts: Vec<Value> = Vec::new();
                if !message.content.is_empty() {
                    parts.push(json!({"text": message.content}));
                }
                for call in message.tool_calls.iter().flatten() {
                    let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
                    parts.push(json!({"functionCall": {"name": call.function.name, "args": args}}));
                }
                contents.push(json!({"role": "model", "parts": parts}));
            }
            _ => contents.push(json!({"role": "user", "parts": [{"text": message.content}]})),
        }
    }

    contents
}

fn parse_response(json: &Value, model: &str) -> Result<ChatResponse, LlmError> {
    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or(LlmError::InvalidRequest)?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        // Thinking models return their reasoning as parts flagged `thought`.
        if part["thought"].as_bool() == Some(true) {
            continue;
        }
        if let Some(text) = part["text"].as_str() {
            content.push_str(text);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call["name"].as_str().ok_or(LlmError::InvalidRequest)?;
            tool_calls.push(ToolCall::new(None, name, call["args"].to_string()));
        }
    }

    let usage = json.get("usageMetadata").map(|u| Usage {
        input_tokens: u["promptTokenCount"].as_u64().unwrap_or(0) as u32,
        output_tokens: u["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
    });

    Ok(ChatResponse {
        content,
        model: model.to_string(),
        usage,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
    })
}
