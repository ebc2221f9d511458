use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use somnia_common::config::AppConfig;
use somnia_common::paths;
use somnia_core::events::OneShot;
use somnia_core::quality::QualityManager;
use somnia_core::records::{QUALITY_MAX, QUALITY_MIN};
use somnia_core::store::{SessionStore, run_blocking};
use somnia_core::tracker::TrackerManager;
use somnia_storage::session_store;
use somnia_storage::sqlite3::SqliteSessionStore;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about = "Track sleep sessions and rate their quality", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a new sleep session
    Start,
    /// End the active session
    Stop,
    /// Rate a completed session (defaults to the latest one)
    Rate {
        quality: i32,
        #[arg(long)]
        session: Option<i64>,
    },
    /// Print the recorded history
    History,
    /// Show the tracker state
    Status,
    /// Delete every recorded session
    Clear,
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn ensure_workspace_dir(workspace_dir: &PathBuf) -> Result<()> {
    if !workspace_dir.exists() {
        std::fs::create_dir_all(workspace_dir).context("Failed to create workspace directory")?;
    }
    Ok(())
}

fn report_health(health: &[String]) {
    for msg in health {
        eprintln!("warning: {msg}");
    }
}

async fn load_tracker(store: Arc<SqliteSessionStore>, history_limit: usize) -> TrackerManager {
    let mut tracker = TrackerManager::new(store, history_limit);
    tracker.wait_idle().await;
    tracker
}

/// Id of the most recent completed session, if any.
async fn latest_completed(store: &Arc<SqliteSessionStore>) -> Result<Option<i64>> {
    let store = Arc::clone(store);
    let sessions = run_blocking(move || store.all()).await?;
    Ok(sessions.into_iter().find(|s| !s.is_active()).map(|s| s.id))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = AppConfig::load()?;
    ensure_workspace_dir(&config.workspace_dir)?;
    let store = session_store(&paths::session_db(&config.workspace_dir))?;

    match cli.command {
        Commands::Start => {
            let mut tracker = load_tracker(store, config.history_limit).await;
            tracker.start_tracking();
            tracker.wait_idle().await;

            let snap = tracker.snapshot();
            report_health(&snap.health);
            match snap.tonight {
                Some(session) => println!(
                    "Tracking session {} (started {})",
                    session.id,
                    session.start_time.format("%Y-%m-%d %H:%M")
                ),
                None => println!("A session was already being tracked or the start did not take."),
            }
        }
        Commands::Stop => {
            let mut tracker = load_tracker(store, config.history_limit).await;
            tracker.stop_tracking();
            tracker.wait_idle().await;

            report_health(&tracker.snapshot().health);
            match tracker.rate_session_event() {
                OneShot::Pending(id) => {
                    tracker.acknowledge_rate_session();
                    println!(
                        "Session {id} ended. Rate it with `somnia rate <{QUALITY_MIN}-{QUALITY_MAX}> --session {id}`."
                    );
                }
                OneShot::Idle => println!("No active session to stop."),
            }
        }
        Commands::Rate { quality, session } => {
            let id = match session {
                Some(id) => id,
                None => latest_completed(&store)
                    .await?
                    .context("No completed session to rate")?,
            };

            let mut manager = QualityManager::new(store, id);
            manager.set_quality(quality);
            manager.wait_idle().await;

            if let Some(err) = manager.watch_errors().borrow().clone() {
                bail!(err);
            }
            if manager.navigation().is_pending() {
                manager.acknowledge_navigation();
                println!("Recorded quality {quality} for session {id}.");
            }
        }
        Commands::History => {
            let tracker = load_tracker(store, config.history_limit).await;
            let snap = tracker.snapshot();
            report_health(&snap.health);
            print!("{}", snap.history_text);
            if !snap.history_text.ends_with('\n') {
                println!();
            }
        }
        Commands::Status => {
            let tracker = load_tracker(store, config.history_limit).await;
            let snap = tracker.snapshot();
            report_health(&snap.health);
            match &snap.tonight {
                Some(session) => println!(
                    "Tracking session {} since {}",
                    session.id,
                    session.start_time.format("%Y-%m-%d %H:%M")
                ),
                None => println!("Idle; no session being tracked."),
            }
            println!(
                "start: {}  stop: {}  clear: {}  recorded sessions: {}",
                snap.start_enabled,
                snap.stop_enabled,
                snap.clear_enabled,
                snap.nights.len()
            );
        }
        Commands::Clear => {
            let mut tracker = load_tracker(store, config.history_limit).await;
            tracker.clear();
            tracker.wait_idle().await;

            report_health(&tracker.snapshot().health);
            if tracker.cleared_event().is_pending() {
                tracker.acknowledge_cleared();
                println!("Sleep history cleared.");
            }
        }
    }

    Ok(())
}
