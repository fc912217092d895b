// ============================================================================
// concierge-db — CLI inspection tool for the session snapshot store
// ============================================================================
// Usage:
//   concierge-db stats                         Show snapshot store statistics
//   concierge-db list-sessions                 List stored sessions
//   concierge-db show-session ID [--full]      Show one session's state/turns
//   concierge-db export --format json          Export the store as JSON
//   concierge-db prune --older-than 90         Prune stale sessions
//   concierge-db delete-session ID             Delete one session snapshot
// ============================================================================

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use concierge_core::db::SnapshotStore;
use std::path::PathBuf;

/// Concierge session snapshot inspection tool
#[derive(Parser)]
#[command(name = "concierge-db", version, about = "Inspect and manage the Concierge snapshot store")]
struct Cli {
    /// Path to the database file (default: ~/.concierge/snapshots.redb)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show snapshot store statistics (sessions, retained turns)
    Stats,

    /// List stored session snapshots
    ListSessions,

    /// Show one session's stage state and retained turns
    ShowSession {
        /// Session identifier
        session_id: String,

        /// Print full turn inputs/responses instead of digests
        #[arg(long)]
        full: bool,
    },

    /// Export full store contents as JSON
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Prune sessions inactive longer than the given number of days
    Prune {
        /// Delete sessions inactive for more than this many days
        #[arg(long, default_value = "90")]
        older_than: i64,

        /// Show what would be pruned without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete one session snapshot
    DeleteSession {
        /// Session identifier
        session_id: String,
    },
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db = SnapshotStore::open(cli.db_path.as_deref())?;

    match cli.command {
        Commands::Stats => cmd_stats(&db),
        Commands::ListSessions => cmd_list_sessions(&db),
        Commands::ShowSession { session_id, full } => cmd_show_session(&db, &session_id, full),
        Commands::Export { format } => cmd_export(&db, &format),
        Commands::Prune {
            older_than,
            dry_run,
        } => cmd_prune(&db, older_than, dry_run),
        Commands::DeleteSession { session_id } => cmd_delete_session(&db, &session_id),
    }
}

fn cmd_stats(db: &SnapshotStore) -> Result<()> {
    let stats = db.stats()?;

    println!("=== Concierge Snapshot Store Stats ===");
    println!("Database: {}", db.path().display());
    println!();
    println!("Sessions:       {}", stats.total_sessions);
    println!("Retained turns: {}", stats.total_turns);

    Ok(())
}

fn cmd_list_sessions(db: &SnapshotStore) -> Result<()> {
    let mut sessions = db.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    sessions.sort_by_key(|s| std::cmp::Reverse(s.stage.last_active));

    println!(
        "{:<24}  {:<10}  {:>5}  {}",
        "SESSION ID", "STAGE", "TURNS", "LAST ACTIVE"
    );
    println!("{}", "-".repeat(70));

    for snapshot in &sessions {
        println!(
            "{:<24}  {:<10}  {:>5}  {}",
            snapshot.session_id,
            snapshot.stage.stage.to_string(),
            snapshot.turns.len(),
            format_timestamp(snapshot.stage.last_active)
        );
    }

    println!("\nTotal: {} sessions", sessions.len());
    Ok(())
}

fn cmd_show_session(db: &SnapshotStore, session_id: &str, full: bool) -> Result<()> {
    let Some(snapshot) = db.get_session(session_id)? else {
        println!("No snapshot for session '{}'.", session_id);
        return Ok(());
    };

    println!("Session:     {}", snapshot.session_id);
    println!("Stage:       {}", snapshot.stage.stage);
    println!("Created:     {}", format_timestamp(snapshot.stage.created_at));
    println!("Last active: {}", format_timestamp(snapshot.stage.last_active));
    println!("Saved:       {}", format_timestamp(snapshot.saved_at));

    let ctx = &snapshot.stage.user_context;
    if ctx.is_priority_customer {
        println!("Priority customer");
    }
    if ctx.cart_item_count > 0 {
        println!("Cart:        {} items", ctx.cart_item_count);
    }
    if let Some(order) = &ctx.recent_order_id {
        println!("Order:       #{}", order);
    }
    if !snapshot.stage.intent_history.is_empty() {
        println!("Intents:     {}", snapshot.stage.intent_history.join(" -> "));
    }

    println!("\n{} retained turns:", snapshot.turns.len());
    for turn in &snapshot.turns {
        if full {
            println!("\n--- turn #{} ({})", turn.turn_index, format_timestamp(turn.timestamp));
            println!("user:  {}", turn.user_input);
            println!("agent: {}", turn.agent_response);
            for call in &turn.tool_calls {
                println!("tool:  {}", call.name);
            }
        } else {
            println!("  #{:<4} {}", turn.turn_index, turn.summary);
        }
    }

    Ok(())
}

fn cmd_export(db: &SnapshotStore, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let sessions = db.list_sessions()?;
    let stats = db.stats()?;

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "stats": stats,
        "sessions": sessions,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

fn cmd_prune(db: &SnapshotStore, older_than: i64, dry_run: bool) -> Result<()> {
    if dry_run {
        println!("=== DRY RUN — no data will be deleted ===\n");

        let cutoff = Utc::now().timestamp() - (older_than * 86400);
        let sessions = db.list_sessions()?;
        let pruneable: Vec<_> = sessions
            .iter()
            .filter(|s| s.stage.last_active < cutoff)
            .collect();

        println!(
            "Would prune {} sessions inactive for more than {} days",
            pruneable.len(),
            older_than
        );
        for snapshot in &pruneable {
            println!(
                "  - {} (last active: {})",
                snapshot.session_id,
                format_timestamp(snapshot.stage.last_active)
            );
        }
    } else {
        let pruned = db.prune_stale_sessions(older_than)?;
        println!("Pruned {} sessions (inactive more than {} days)", pruned, older_than);
    }

    Ok(())
}

fn cmd_delete_session(db: &SnapshotStore, session_id: &str) -> Result<()> {
    if db.delete_session(session_id)? {
        println!("Deleted snapshot for session '{}'.", session_id);
    } else {
        println!("No snapshot for session '{}'.", session_id);
    }
    Ok(())
}
