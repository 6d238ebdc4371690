pub mod engine;

pub use engine::{CompletedTurn, TurnEngine, TurnOutcome, TurnSettings, APOLOGY, TOOL_LOOP_FALLBACK};
