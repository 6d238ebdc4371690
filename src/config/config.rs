use serde::Deserialize;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a polite and efficient Booking Assistant. Your role is to help users book 1-hour time slots between 9 AM and 5 PM.

Each booking is exactly 1 hour long. If a user needs multiple hours, you should book consecutive slots separately.

Follow this protocol:
1. Greet the user warmly and ask for their name if not provided.
2. Ask for the date they want to book (format: YYYY-MM-DD).
3. Use check_availability to show available 1-hour slots for that date.
4. Ask which time slot they prefer (e.g., 9-10 AM, 2-3 PM, etc.).
5. Confirm the booking details with the user before finalizing.
6. Use book_slot to complete the booking.
7. Provide a clear confirmation with the booking ID.
8. If they need multiple hours, offer to book additional consecutive slots.

Important rules:
- Always be polite and professional
- Each slot is exactly 1 hour (9-10, 10-11, 11-12, etc.)
- Available slots: 9-10, 10-11, 11-12, 12-1, 1-2, 2-3, 3-4, 4-5 (8 slots total)
- If a slot is unavailable, suggest alternatives
- Always confirm details before booking
- Provide clear error messages if something goes wrong
- For multiple hours, book each slot individually";

pub const DEFAULT_GREETING: &str =
    "Welcome to AI Booking Agent! How can I help you book a time slot today?";

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base")]
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_base")]
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Upper bound for a single model round trip.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub openai: Option<OpenAiConfig>,
    pub ollama: Option<OllamaConfig>,
    pub gemini: Option<GeminiConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            request_timeout_secs: default_request_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            openai: None,
            ollama: None,
            gemini: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// Sliding retention for a session transcript, refreshed on every write.
    #[serde(default = "default_history_ttl")]
    pub history_ttl_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            greeting: default_greeting(),
            max_tool_iterations: default_max_tool_iterations(),
            history_ttl_secs: default_history_ttl(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SLOTCHAT").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${OPENAI_API_KEY}
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.database.path = expand_env(&app_config.database.path);

        if let Some(ref mut openai) = app_config.llm.openai {
            openai.api_key = expand_env(&openai.api_key);
        }
        if let Some(ref mut gemini) = app_config.llm.gemini {
            gemini.api_key = expand_env(&gemini.api_key);
        }

        Ok(app_config)
    }
}

fn expand_env(val: &str) -> String {
    if val.starts_with("${") && val.ends_with('}') {
        let var_name = &val[2..val.len() - 1];
        std::env::var(var_name).unwrap_or_default()
    } else {
        val.to_string()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    "booking_db.duckdb".to_string()
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_gemini_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    400
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_max_tool_iterations() -> usize {
    5
}

fn default_history_ttl() -> u64 {
    3600 * 24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_reads_braced_variables() {
        std::env::set_var("SLOTCHAT_TEST_EXPAND", "secret");
        assert_eq!(expand_env("${SLOTCHAT_TEST_EXPAND}"), "secret");
        assert_eq!(expand_env("${SLOTCHAT_TEST_MISSING_VAR}"), "");
        assert_eq!(expand_env("plain"), "plain");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AppConfig::load("does-not-exist.yaml").unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.chat.max_tool_iterations, 5);
        assert_eq!(config.chat.history_ttl_secs, 86_400);
        assert!(config.llm.openai.is_none());
    }
}
