//! Bankroll Desk
//!
//! Session tracker for binary-options trading: Martingale position sizing,
//! daily goal and stop-loss, and a history of every session.

mod access;
mod db;
mod error;
mod history;
mod models;
mod trading;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::db::Database;
use crate::error::{AccessError, DeskError};
use crate::history::{HistoryFilter, HistoryRecorder, HistorySummary, ModeFilter, SavedSession};
use crate::models::{Outcome, SizingRule, Subscription, SubscriptionStatus};
use crate::trading::{PositionSizer, ThresholdEvent, TradeConfig, TradingDesk, Transition};

/// Binary-options bankroll desk CLI.
#[derive(Parser)]
#[command(name = "bankroll")]
#[command(about = "Track binary-options sessions with Martingale sizing, goals and stop-loss", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(short, long, env = "BANKROLL_DATABASE_URL", default_value = "sqlite:./bankroll.db?mode=rwc")]
    database: String,

    /// User id (e.g. email) the desk runs as
    #[arg(short, long, env = "BANKROLL_USER")]
    user: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "BANKROLL_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the trade configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Project a Martingale losing streak for the stored configuration
    Ladder {
        /// Number of consecutive losses to project
        #[arg(short, long, default_value = "6")]
        rungs: usize,
    },

    /// Start the interactive trading desk
    Trade,

    /// Browse saved sessions
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show or update the subscription record
    Subscription {
        #[command(subcommand)]
        action: SubscriptionAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the stored configuration
    Show,

    /// Update fields of the stored configuration (amounts like 20, or 2%)
    Set {
        /// Payout on a win, in percent
        #[arg(long)]
        payout: Option<Decimal>,

        /// Bankroll at session start
        #[arg(long)]
        bankroll: Option<Decimal>,

        /// Base entry
        #[arg(long)]
        entry: Option<SizingRule>,

        /// Daily goal
        #[arg(long)]
        goal: Option<SizingRule>,

        /// Stop loss
        #[arg(long)]
        stop: Option<SizingRule>,
    },

    /// Store the default configuration
    Defaults,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List sessions, newest first
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show a session with its operations
    Show { id: String },

    /// Attach a note to a session
    Note { id: String, text: String },

    /// Delete a session and its operations
    Delete { id: String },

    /// Aggregate statistics over sessions
    Summary {
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Day (YYYY-MM-DD), or start of the range when --to is given
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Inclusive end of the range (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// real, training or all
    #[arg(short, long, default_value = "real")]
    mode: ModeFilter,
}

impl FilterArgs {
    fn to_filter(&self) -> HistoryFilter {
        HistoryFilter {
            from: self.from,
            to: self.to,
            mode: self.mode,
        }
    }
}

#[derive(Subcommand)]
enum SubscriptionAction {
    /// Show the subscription status
    Show,

    /// Create or update the subscription record
    Set {
        /// trialing, active, past_due, canceled, incomplete, incomplete_expired, unpaid, paused
        status: SubscriptionStatus,

        /// End of the current period (RFC 3339)
        #[arg(long)]
        period_end: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Initialize database
    let db = Arc::new(Database::new(&cli.database).await?);
    let user = cli.user.as_deref();

    match cli.command {
        Commands::Config { action } => {
            let user_id = identity(user)?;

            match action {
                ConfigAction::Show => match db.load_config(user_id).await? {
                    Some(config) => print_config(&config),
                    None => {
                        println!("No configuration saved. Use 'bankroll config set' or 'bankroll config defaults'.");
                    }
                },

                ConfigAction::Set {
                    payout,
                    bankroll,
                    entry,
                    goal,
                    stop,
                } => {
                    let current = db.load_config(user_id).await?.unwrap_or_default();
                    let config = TradeConfig::new(
                        payout.unwrap_or(current.payout_percent),
                        bankroll.unwrap_or(current.initial_bankroll),
                        entry.unwrap_or(current.entry),
                        goal.unwrap_or(current.daily_goal),
                        stop.unwrap_or(current.stop_loss),
                    )?;

                    db.save_config(user_id, &config).await?;
                    info!(user = %user_id, "Trade configuration saved");
                    println!("Configuration saved.");
                    print_config(&config);
                }

                ConfigAction::Defaults => {
                    let config = TradeConfig::default();
                    db.save_config(user_id, &config).await?;
                    info!(user = %user_id, "Default trade configuration saved");
                    println!("Default configuration saved.");
                    print_config(&config);
                }
            }
        }

        Commands::Ladder { rungs } => {
            let config = match user {
                Some(user_id) => db.load_config(user_id).await?.unwrap_or_default(),
                None => TradeConfig::default(),
            };
            config.validate()?;
            let sizer = PositionSizer::new(config);

            println!("\n=== Martingale Ladder ===");
            println!(
                "Base entry {:.2} at {}% payout\n",
                sizer.base_entry(),
                sizer.config().payout_percent.normalize()
            );
            println!("{:>4} {:>12} {:>14} {:>12}", "RUNG", "STAKE", "TOTAL LOST", "NET IF WIN");
            println!("{}", "-".repeat(45));

            for rung in sizer.ladder(rungs) {
                println!(
                    "{:>4} {:>12.2} {:>14.2} {:>+12.2}",
                    rung.rung, rung.stake, rung.cumulative_loss, rung.net_if_win
                );
            }
        }

        Commands::Trade => {
            let user_id = access::require_active(&db, user).await?;
            let config = db
                .load_config(&user_id)
                .await?
                .ok_or(DeskError::NoConfiguration)?;
            config.validate()?;
            let mode = db.get_trade_mode(&user_id).await?;

            let recorder = HistoryRecorder::new(db.clone());
            let desk = TradingDesk::new(user_id.clone(), config, mode, recorder);

            info!(user = %user_id, mode = %mode, "Desk opened");
            run_desk(desk, &db, &user_id).await?;
        }

        Commands::History { action } => {
            let user_id = access::require_active(&db, user).await?;

            match action {
                HistoryAction::List { filter } => {
                    let sessions = db.list_sessions(&user_id, &filter.to_filter()).await?;

                    if sessions.is_empty() {
                        println!("No sessions found.");
                        return Ok(());
                    }

                    println!(
                        "\n{:<36} {:<10} {:<11} {:<8} {:<5} {:>10}  {}",
                        "ID", "DATE", "LABEL", "MODE", "STATUS", "PROFIT", "NOTES"
                    );
                    println!("{}", "-".repeat(110));

                    for s in sessions {
                        println!(
                            "{:<36} {:<10} {:<11} {:<8} {:<6} {:>+10.2}  {}",
                            s.id,
                            s.session_date,
                            s.label,
                            s.mode,
                            s.status,
                            s.total_profit,
                            truncate(s.notes.as_deref().unwrap_or(""), 20)
                        );
                    }
                }

                HistoryAction::Show { id } => {
                    let Some(session) = db.get_session(&user_id, &id).await? else {
                        println!("Session not found: {}", id);
                        return Ok(());
                    };
                    let operations = db.get_operations(&session.id).await?;

                    println!("\n=== {} ({}) ===", session.label, session.session_date);
                    println!("Mode:             {}", session.mode);
                    println!("Status:           {}", session.status);
                    println!("Initial Bankroll: {:.2}", session.initial_bankroll);
                    println!("Final Bankroll:   {:.2}", session.final_bankroll);
                    println!("Profit:           {:+.2}", session.total_profit);
                    if let Some(notes) = &session.notes {
                        println!("Notes:            {}", notes);
                    }

                    println!("\n--- Operations ({}) ---", operations.len());
                    for op in &operations {
                        let outcome = match op.result.parse::<Outcome>() {
                            Ok(Outcome::Win) => "WIN ",
                            Ok(Outcome::Loss) => "LOSS",
                            Err(e) => {
                                warn!(session = %session.label, sequence = op.sequence_id, error = %e, "Unreadable operation");
                                "????"
                            }
                        };
                        println!(
                            "  #{:<3} {} stake {:>10.2}  {:>+10.2}  bankroll {:>10.2}",
                            op.sequence_id, outcome, op.entry_value, op.profit_loss, op.bankroll_after
                        );
                    }
                }

                HistoryAction::Note { id, text } => {
                    if db.update_notes(&user_id, &id, &text).await? {
                        println!("Note saved.");
                    } else {
                        println!("Session not found: {}", id);
                    }
                }

                HistoryAction::Delete { id } => {
                    if db.delete_session(&user_id, &id).await? {
                        info!(user = %user_id, history_id = %id, "Session deleted");
                        println!("Session deleted.");
                    } else {
                        println!("Session not found: {}", id);
                    }
                }

                HistoryAction::Summary { filter } => {
                    let sessions = db.list_sessions(&user_id, &filter.to_filter()).await?;
                    println!("\n{}", HistorySummary::from_sessions(&sessions));
                }
            }
        }

        Commands::Subscription { action } => {
            let user_id = identity(user)?;

            match action {
                SubscriptionAction::Show => match db.get_subscription(user_id).await? {
                    Some(sub) => {
                        println!("\n=== Subscription ===");
                        println!("User:           {}", sub.user_id);
                        println!("Status:         {}", sub.status.as_str());
                        match sub.current_period_end {
                            Some(end) => {
                                println!("Period Ends:    {}", end.format("%Y-%m-%d"));
                                println!("Days Remaining: {}", sub.remaining_days(Utc::now()));
                            }
                            None => println!("Period Ends:    -"),
                        }
                        println!("Access:         {}", if sub.is_active() { "Yes" } else { "No" });
                    }
                    None => println!("No subscription found for {}.", user_id),
                },

                SubscriptionAction::Set { status, period_end } => {
                    let sub = Subscription {
                        user_id: user_id.to_string(),
                        status,
                        current_period_end: period_end,
                    };
                    db.upsert_subscription(&sub).await?;
                    info!(user = %user_id, status = %status.as_str(), "Subscription updated");
                    println!("Subscription set to {}.", status.as_str());
                }
            }
        }
    }

    Ok(())
}

/// Interactive loop: one command per line until quit, EOF or Ctrl+C.
async fn run_desk(mut desk: TradingDesk, db: &Database, user_id: &str) -> Result<()> {
    println!("\n=== Bankroll Desk ({}) ===", desk.mode().label());
    println!("w=win  l=loss  c=conservative loss  r=reset (save)  x=reset (discard)");
    println!("m=toggle mode  s=status  q=quit\n");
    println!("{}\n", desk.status());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => None,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim().to_lowercase().as_str() {
            "w" | "win" => {
                let result = desk.win();
                report_action(&desk, result);
            }
            "l" | "loss" => {
                let result = desk.loss();
                report_action(&desk, result);
            }
            "c" | "conservative" => {
                let result = desk.conservative_loss();
                report_action(&desk, result);
            }
            "r" | "reset" => {
                if desk.reset(true) {
                    println!("Saving session...");
                }
                println!("New session started.\n{}", desk.status());
            }
            "x" | "discard" => {
                desk.reset(false);
                println!("Session discarded.\n{}", desk.status());
            }
            "m" | "mode" => {
                let mode = desk.toggle_mode();
                if let Err(e) = db.set_trade_mode(user_id, mode).await {
                    warn!(user = %user_id, error = %e, "Failed to store trade mode");
                    println!("Note: could not remember the trade mode for next time.");
                }
                println!("Switched to {}.\n{}", mode.label(), desk.status());
            }
            "s" | "status" => {
                println!("{}", desk.status());
                print_recent(&desk, 5);
            }
            "q" | "quit" | "exit" => break,
            "" => {}
            other => println!("Unknown command '{}'.", other),
        }

        for result in desk.drain_completed().await {
            report_save(&result);
        }
    }

    println!("\nClosing desk...");
    if desk.pending_saves() > 0 {
        println!("Waiting for {} pending save(s)...", desk.pending_saves());
    }
    for result in desk.finish().await {
        report_save(&result);
    }

    Ok(())
}

fn report_action(desk: &TradingDesk, result: Result<Transition, DeskError>) {
    let t = match result {
        Ok(transition) => transition,
        Err(e) => {
            println!("{}", e);
            return;
        }
    };

    let op = &t.operation;
    println!(
        "#{} {} stake {:.2}  {:+.2}  bankroll {:.2}  next entry {:.2}",
        op.sequence_id,
        if op.is_win() { "WIN " } else { "LOSS" },
        op.entry_value,
        op.profit_loss,
        op.bankroll_after,
        t.next_entry
    );

    match t.threshold {
        Some(ThresholdEvent::GoalReached { profit, goal }) => {
            println!("Daily goal reached! Profit {:+.2} of {:.2}. Saving session...", profit, goal);
        }
        Some(ThresholdEvent::StopLossReached { limit, overshoot }) => {
            println!("Stop loss reached at -{:.2}. Saving session...", limit);
            if overshoot > Decimal::ZERO {
                println!("The last loss went {:.2} past the limit.", overshoot);
            }
        }
        None => {
            if let Some(line) = desk.status().encouragement() {
                println!("{}", line);
            }
        }
    }
}

fn report_save(result: &Result<SavedSession>) {
    match result {
        Ok(saved) if saved.is_complete() => {
            println!("{} saved to history ({}).", saved.label, saved.status);
        }
        Ok(saved) => {
            println!(
                "{} saved to history, but its operations could not be stored: {}",
                saved.label,
                saved.operations_error.as_deref().unwrap_or("unknown error")
            );
        }
        Err(e) => {
            println!("Could not save the session: {:#}", e);
        }
    }
}

/// Last `limit` operations, most recent first.
fn print_recent(desk: &TradingDesk, limit: usize) {
    let operations = desk.state().operations();
    if operations.is_empty() {
        return;
    }

    println!("\n--- Recent Operations ---");
    for op in operations.iter().rev().take(limit) {
        println!(
            "  #{:<3} {} {:>10.2}  {:>+10.2}  {}",
            op.sequence_id,
            if op.is_win() { "WIN " } else { "LOSS" },
            op.entry_value,
            op.profit_loss,
            op.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S")
        );
    }
}

fn print_config(config: &TradeConfig) {
    println!("\n=== Trade Configuration ===\n");
    println!("Payout:            {}%", config.payout_percent.normalize());
    println!("Initial Bankroll:  {:.2}", config.initial_bankroll);
    println!("Entry:             {} ({:.2})", config.entry, config.base_entry());
    println!("Daily Goal:        {} ({:.2})", config.daily_goal, config.goal_value());
    println!("Stop Loss:         {} ({:.2})", config.stop_loss, config.loss_limit());
}

fn identity(user: Option<&str>) -> Result<&str, AccessError> {
    user.map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(AccessError::NoIdentity)
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
