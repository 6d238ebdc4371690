pub mod args;
pub mod availability;
pub mod booking;

use serde_json::json;
use tracing::{info, warn};

use crate::db::DbPool;
use crate::llm::models::{FunctionDefinition, ToolCall, ToolDefinition};
use args::{parse_args, BookSlotArgs, CheckAvailabilityArgs};

pub const INVALID_DATE: &str = "Invalid date format. Please use YYYY-MM-DD format.";

/// The fixed set of tools the booking agent may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    CheckAvailability,
    BookSlot,
}

impl ToolName {
    pub const ALL: [ToolName; 2] = [ToolName::CheckAvailability, ToolName::BookSlot];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::CheckAvailability => "check_availability",
            ToolName::BookSlot => "book_slot",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn definition(&self) -> ToolDefinition {
        let (description, parameters) = match self {
            ToolName::CheckAvailability => (
                "Check available 1-hour time slots for a specific date between 9 AM and 5 PM. Each slot is exactly 1 hour.",
                json!({
                    "type": "object",
                    "properties": {
                        "date": {
                            "type": "string",
                            "description": "The date to check in YYYY-MM-DD format (e.g., 2026-01-20)"
                        }
                    },
                    "required": ["date"]
                }),
            ),
            ToolName::BookSlot => (
                "Book a 1-hour time slot for a user. Each booking is exactly 1 hour long.",
                json!({
                    "type": "object",
                    "properties": {
                        "user_name": {
                            "type": "string",
                            "description": "Name of the user making the booking"
                        },
                        "date": {
                            "type": "string",
                            "description": "The date for the booking in YYYY-MM-DD format (e.g., 2026-01-20)"
                        },
                        "hour": {
                            "type": "integer",
                            "description": "Starting hour in 24-hour format (9-16, where 9=9AM, 10=10AM, 16=4PM)"
                        }
                    },
                    "required": ["user_name", "date", "hour"]
                }),
            ),
        };

        ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: self.as_str().to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub name: String,
    pub content: String,
}

/// Runs tool calls against the slot store. Never fails: every problem,
/// from an unknown tool name to a database error, comes back as result text
/// the model can react to.
pub struct ToolExecutor {
    pool: DbPool,
}

impl ToolExecutor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolName::ALL.iter().map(|t| t.definition()).collect()
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let name = call.function.name.as_str();
        info!("Executing tool: {} with args: {}", name, call.function.arguments);

        let content = match ToolName::parse(name) {
            Some(tool) => self.dispatch(tool, &call.function.arguments),
            None => format!("Error: Unknown function '{}'", name),
        };

        info!("Tool result: {}", content);
        ToolResult {
            name: name.to_string(),
            content,
        }
    }

    pub fn check_availability(&self, args: &CheckAvailabilityArgs) -> String {
        match self.pool.lock() {
            Ok(conn) => availability::check_availability(&conn, args),
            Err(_) => "Error checking availability: storage unavailable".to_string(),
        }
    }

    pub fn book_slot(&self, args: &BookSlotArgs) -> String {
        match self.pool.lock() {
            Ok(conn) => booking::book_slot(&conn, args),
            Err(_) => "Error booking slot: storage unavailable".to_string(),
        }
    }

    fn dispatch(&self, tool: ToolName, raw_args: &str) -> String {
        match tool {
            ToolName::CheckAvailability => match parse_args::<CheckAvailabilityArgs>(raw_args) {
                Ok(args) => self.check_availability(&args),
                Err(e) => invalid_arguments(tool, e),
            },
            ToolName::BookSlot => match parse_args::<BookSlotArgs>(raw_args) {
                Ok(args) => self.book_slot(&args),
                Err(e) => invalid_arguments(tool, e),
            },
        }
    }
}

fn invalid_arguments(tool: ToolName, err: serde_json::Error) -> String {
    warn!("Rejected arguments for {}: {}", tool.as_str(), err);
    format!("Invalid arguments for {}: {}", tool.as_str(), err)
}
