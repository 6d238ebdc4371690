use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{models::{ChatOptions, ChatResponse, Message, ToolCall}, LlmError, LlmProvider};

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    pub fn new(client: Client, base_url: String, default_model: String) -> Self {
        Self {
            client,
            base_url,
            default_model,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);

        let mut final_messages: Vec<Value> = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = &options.system_prompt {
            final_messages.push(json!({"role": "system", "content": system}));
        }
        final_messages.extend(messages.iter().map(to_wire));

        let mut body = json!({
            "model": model,
            "messages": final_messages,
            "stream": false,
            "options": {
                "temperature": options.temperature.unwrap_or(0.7),
                "num_predict": options.max_tokens.unwrap_or(4096)
            }
        });

        if let Some(tools) = &options.tools {
            body["tools"] = json!(tools);
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("Ollama Error {}: {}", status, text)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(parse_message(&json["message"], model))
    }

    fn supported_models(&self) -> Vec<&str> {
        vec!["llama3.2", "qwen2.5", "mistral"]
    }
}

/// Ollama wants tool arguments as objects, not JSON strings.
fn to_wire(message: &Message) -> Value {
    let mut wire = json!({"role": message.role, "content": message.content});
    if let Some(calls) = &message.tool_calls {
        let calls: Vec<Value> = calls
            .iter()
            .map(|c| {
                let args: Value = serde_json::from_str(&c.function.arguments).unwrap_or_else(|_| json!({}));
                json!({"function": {"name": c.function.name, "arguments": args}})
            })
            .collect();
        wire["tool_calls"] = json!(calls);
    }
    wire
}

fn tool_call_from_value(f: &Value) -> Option<ToolCall> {
    // Handle both the ToolCall wrapper and a bare function object
    let func_obj = if f.get("function").is_some() { &f["function"] } else { f };

    let name = func_obj["name"].as_str()?.to_string();
    let args = if func_obj["arguments"].is_string() {
        func_obj["arguments"].as_str()?.to_string()
    } else {
        func_obj["arguments"].to_string()
    };

    Some(ToolCall::new(f["id"].as_str().map(|s| s.to_string()), name, args))
}

fn parse_message(message: &Value, model: &str) -> ChatResponse {
    let mut content = message["content"].as_str().unwrap_or_default().to_string();

    let mut tool_calls: Option<Vec<ToolCall>> = message
        .get("tool_calls")
        .and_then(|tc| tc.as_array())
        .map(|calls| calls.iter().filter_map(tool_call_from_value).collect());

    // Fallback: small models often print the tool call JSON into the content instead
    if tool_calls.as_ref().map(|tc| tc.is_empty()).unwrap_or(true) {
        if let Some((start_pos, parsed)) = embedded_tool_calls(&content) {
            tool_calls = Some(parsed);
            // Keep text before the JSON, discarding the JSON and anything after it
            content = content[..start_pos].trim().to_string();
        }
    }

    ChatResponse {
        content,
        model: model.to_string(),
        usage: None,
        tool_calls: tool_calls.filter(|tc| !tc.is_empty()),
    }
}

fn embedded_tool_calls(content: &str) -> Option<(usize, Vec<ToolCall>)> {
    let start_pos = content.find('[')?;
    let json_part = &content[start_pos..];

    let mut bracket_count = 0;
    let mut end_pos = None;
    for (i, c) in json_part.char_indices() {
        if c == '[' {
            bracket_count += 1;
        } else if c == ']' {
            bracket_count -= 1;
            if bracket_count == 0 {
                end_pos = Some(i + 1);
                break;
            }
        }
    }

    let parsed: Vec<Value> = serde_json::from_str(&json_part[..end_pos?]).ok()?;
    let mapped: Vec<ToolCall> = parsed.iter().filter_map(tool_call_from_value).collect();
    if mapped.is_empty() {
        None
    } else {
        Some((start_pos, mapped))
    }
}
