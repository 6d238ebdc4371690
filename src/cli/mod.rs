pub mod commands;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::io::{self, BufRead, Write};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::cli::commands::{BookingAction, Commands, HistoryAction};
use crate::config::AppConfig;
use crate::db::{get_connection, BookingService, DbPool};
use crate::history::{DuckDbHistoryStore, HistoryError, HistoryStore, Role};
use crate::llm::ProviderFactory;
use crate::session::{Outbound, SessionController, TransportError};
use crate::tools::args::{BookSlotArgs, CheckAvailabilityArgs};
use crate::tools::{ToolExecutor, INVALID_DATE};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("history error: {0}")]
    History(#[from] HistoryError),
    #[error("LLM provider '{0}' is not configured")]
    Provider(String),
    #[error("{0}")]
    Input(String),
    #[error("database connection lock poisoned")]
    LockPoisoned,
}

pub async fn run_cli(command: Commands, config_path: String) -> Result<(), CliError> {
    let config = AppConfig::load(&config_path)?;
    let pool = get_connection(&config.database)?;

    match command {
        Commands::Serve => Err(CliError::Input(
            "serve runs the HTTP server and is not a terminal command".to_string(),
        )),
        Commands::Chat { session } => {
            let session = session.unwrap_or_else(|| Uuid::new_v4().to_string());
            run_repl(session, config, pool).await
        }
        Commands::Ask { session, message } => {
            let llm = ProviderFactory::create_default(&config)
                .ok_or_else(|| CliError::Provider(config.llm.provider.clone()))?;
            let engine = crate::build_engine(&config, pool, llm);
            println!("{}", engine.respond(&session, &message).await);
            Ok(())
        }
        Commands::Bookings { action } => run_bookings(action, pool),
        Commands::History { action } => {
            let store = DuckDbHistoryStore::new(pool, Duration::from_secs(config.chat.history_ttl_secs));
            match action {
                HistoryAction::Show { session } => {
                    let history = store.load(&session).await?;
                    if history.is_empty() {
                        println!("No history for session {}.", session);
                    }
                    for m in history {
                        let label = match m.role {
                            Role::User => "USER",
                            Role::Agent => "AGENT",
                        };
                        println!("[{}]: {}", label, m.content);
                        println!("---");
                    }
                }
                HistoryAction::Clear { session } => {
                    store.clear(&session).await?;
                    println!("Cleared history for session {}", session);
                }
            }
            Ok(())
        }
    }
}

fn run_bookings(action: BookingAction, pool: DbPool) -> Result<(), CliError> {
    let tools = ToolExecutor::new(pool.clone());

    match action {
        BookingAction::List { date } => {
            let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map_err(|_| CliError::Input(INVALID_DATE.to_string()))?;
            let bookings = {
                let conn = pool.lock().map_err(|_| CliError::LockPoisoned)?;
                BookingService::bookings_on(&conn, day)?
            };

            if bookings.is_empty() {
                println!("No bookings on {}.", date);
            } else {
                println!("{:<8} | {:<13} | {}", "ID", "Slot", "Name");
                println!("{:-<8}-+-{:-<13}-+-{:-<20}", "", "", "");
                for b in bookings {
                    let slot = format!("{}:00-{}:00", b.hour(), b.hour() + 1);
                    println!("{:<8} | {:<13} | {}", b.id, slot, b.user_name);
                }
            }
            println!("{}", tools.check_availability(&CheckAvailabilityArgs { date }));
        }
        BookingAction::Book { name, date, hour } => {
            println!("{}", tools.book_slot(&BookSlotArgs { user_name: name, date, hour }));
        }
    }
    Ok(())
}

/// Prints answers to the terminal.
struct TerminalOutbound;

#[async_trait]
impl Outbound for TerminalOutbound {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let mut stdout = io::stdout();
        writeln!(stdout, "\nAgent> {}", text).map_err(|_| TransportError::Closed)?;
        write!(stdout, "\nUser> ").map_err(|_| TransportError::Closed)?;
        stdout.flush().map_err(|_| TransportError::Closed)
    }
}

async fn run_repl(session_id: String, config: AppConfig, pool: DbPool) -> Result<(), CliError> {
    let llm = ProviderFactory::create_default(&config)
        .ok_or_else(|| CliError::Provider(config.llm.provider.clone()))?;
    let engine = crate::build_engine(&config, pool, llm);

    println!("--- AI Booking Agent Terminal Chat ---");
    println!("Session: {}", session_id);
    println!("Type /exit to quit. Messages sent while the agent is thinking are merged into one request.");
    println!("--------------------------------------");
    println!("\nAgent> {}", config.chat.greeting);
    print!("\nUser> ");
    let _ = io::stdout().flush();

    let (tx, rx) = mpsc::channel::<String>(16);

    // Stdin is blocking, so lines are read on their own thread.
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let text = line.trim();
            if text == "/exit" || text == "/quit" {
                break;
            }
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let controller = SessionController::new(session_id, engine, TerminalOutbound);
    controller.run(rx).await;
    println!();
    Ok(())
}
