mod candidates;
mod client;
mod commands;
mod config;
mod error;
mod matcher;
mod models;
mod schedule;
mod summary;
mod worker;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Leisure-centre auto-booker — keep recurring gym, swimming and tennis
/// slots booked according to each user's standing preferences.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print detailed API traffic
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the booking daemon (one worker per user and class type)
    Run {
        /// Path to config file
        #[arg(short = 'c', long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// Show upcoming scheduled classes for a user
    Bookings {
        /// Path to config file
        #[arg(short = 'c', long, default_value = "config.toml")]
        config: PathBuf,

        /// Override login from config (defaults to first user)
        #[arg(short = 'u', long)]
        user: Option<String>,

        /// Override password from config (defaults to first user)
        #[arg(short = 'p', long)]
        password: Option<String>,
    },

    /// Cancel a booking by its identifier
    Cancel {
        /// Booking id as shown by `bookings`
        booking_id: String,

        /// Path to config file
        #[arg(short = 'c', long, default_value = "config.toml")]
        config: PathBuf,

        /// Override login from config (defaults to first user)
        #[arg(short = 'u', long)]
        user: Option<String>,

        /// Override password from config (defaults to first user)
        #[arg(short = 'p', long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match &cli.command {
        Command::Run { config } => {
            let cfg = config::load_config(config)?;
            commands::run_daemon(cfg).await?;
        }
        Command::Bookings {
            config,
            user,
            password,
        } => {
            commands::run_bookings(config, user, password).await?;
        }
        Command::Cancel {
            booking_id,
            config,
            user,
            password,
        } => {
            commands::run_cancel(config, user, password, booking_id).await?;
        }
    }

    Ok(())
}
