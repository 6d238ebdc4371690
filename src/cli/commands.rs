use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "slotchat", version, about = "AI Booking Agent chat server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and WebSocket server
    Serve,

    /// Enter interactive terminal chat with the booking agent
    Chat {
        /// Session key to continue; a fresh one is generated when omitted
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Send a single message and print the answer
    Ask {
        #[arg(short, long)]
        session: String,
        message: String,
    },

    /// Inspect or create bookings directly
    Bookings {
        #[command(subcommand)]
        action: BookingAction,
    },

    /// Inspect or clear a session transcript
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
pub enum BookingAction {
    /// List bookings and free slots for a date
    List {
        /// Date in YYYY-MM-DD format
        #[arg(short, long)]
        date: String,
    },

    /// Book a one-hour slot
    Book {
        #[arg(short, long)]
        name: String,
        /// Date in YYYY-MM-DD format
        #[arg(short, long)]
        date: String,
        /// Start hour, 9-16
        #[arg(long)]
        hour: i64,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Print the stored transcript
    Show {
        #[arg(short, long)]
        session: String,
    },

    /// Delete the stored transcript
    Clear {
        #[arg(short, long)]
        session: String,
    },
}
