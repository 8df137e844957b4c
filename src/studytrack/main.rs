use chrono::Local;
use clap::Parser;
use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::Arc;
use studytrack::backup::scheduler::{run_daily_backup_once, DailyBackupScheduler};
use studytrack::backup::BackupContext;
use studytrack::config::TrackerConfig;
use studytrack::error::Result;
use studytrack::store::fs::FileStore;
use studytrack::tracker::StudyTracker;
use tracing_subscriber::EnvFilter;

mod args;
use args::{BackupCommands, Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("studytrack=warn")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config = TrackerConfig::load(&data_dir).unwrap_or_default();
    let store = Arc::new(FileStore::new(data_dir.join("store")));
    let mut tracker = StudyTracker::load(store, config.user_id.clone()).await?;

    match cli.command {
        Some(Commands::Status) | None => handle_status(&tracker),
        Some(Commands::Backups { limit }) => {
            handle_backups(&tracker, limit.unwrap_or(config.history_limit)).await
        }
        Some(Commands::Backup { command }) => match command {
            BackupCommands::Create { description } => handle_create(&tracker, description).await,
            BackupCommands::Show { id } => handle_show(&tracker, &id).await,
            BackupCommands::Delete { id } => handle_delete(&tracker, &id).await,
            BackupCommands::Cleanup { keep } => {
                handle_cleanup(&tracker, keep.unwrap_or(config.keep_count)).await
            }
            BackupCommands::Export { id, out } => handle_export(&tracker, &id, out).await,
            BackupCommands::Import { file } => handle_import(&mut tracker, &file).await,
            BackupCommands::Restore { id } => handle_restore(&mut tracker, &id).await,
        },
        Some(Commands::Daily) => handle_daily(&tracker).await,
        Some(Commands::Watch) => handle_watch(&tracker).await,
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "studytrack", "studytrack")
        .expect("could not determine a data directory")
        .data_dir()
        .to_path_buf()
}

fn handle_status(tracker: &StudyTracker<FileStore>) -> Result<()> {
    let data = tracker.data();
    if data.subjects.is_empty() {
        println!("No subjects yet.");
        return Ok(());
    }

    let today = Local::now().date_naive();
    for subject in &data.subjects {
        let done = subject
            .chapters
            .iter()
            .filter(|c| c.topicals_completed)
            .count();
        println!(
            "{}  ({}/{} chapters, {} papers, {} sessions)",
            subject.name,
            done,
            subject.chapters.len(),
            subject.past_papers.len(),
            subject.study_sessions.len()
        );
    }

    let due = tracker.revisions_due_on(today);
    if !due.is_empty() {
        println!("\nDue today:");
        for d in &due {
            println!("  {} - {} ({})", d.subject_name, d.chapter_name, d.cycle);
        }
    }

    let overdue = tracker.overdue_revisions(today);
    if !overdue.is_empty() {
        println!("\nOverdue:");
        for d in &overdue {
            println!(
                "  {} - {} ({}, was due {})",
                d.subject_name, d.chapter_name, d.cycle, d.date
            );
        }
    }
    Ok(())
}

async fn handle_backups(tracker: &StudyTracker<FileStore>, limit: usize) -> Result<()> {
    let history = tracker.backups().backup_history(limit).await?;
    if history.is_empty() {
        println!("No backups yet.");
        return Ok(());
    }
    for backup in history {
        println!(
            "{}  {:<8}  {}",
            backup.timestamp.format("%Y-%m-%d %H:%M"),
            format!("{:?}", backup.backup_type).to_lowercase(),
            backup.name
        );
        println!("    id: {}", backup.id);
    }
    Ok(())
}

async fn handle_create(
    tracker: &StudyTracker<FileStore>,
    description: Option<String>,
) -> Result<()> {
    let mut context = BackupContext::manual();
    if let Some(description) = description {
        context = context.with_description(description);
    }
    let id = tracker
        .backups()
        .create_backup(tracker.data(), context)
        .await?;
    println!("Backup created: {}", id);
    Ok(())
}

async fn handle_show(tracker: &StudyTracker<FileStore>, id: &str) -> Result<()> {
    let backup = tracker.backups().backup(id).await?;
    println!("{}", backup.name);
    println!("  id:          {}", backup.id);
    println!("  created:     {}", backup.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  type:        {:?}", backup.backup_type);
    println!("  action:      {}", backup.action);
    println!("  description: {}", backup.description);
    println!(
        "  contents:    {} subjects, {} chapters, {} study sessions",
        backup.metadata.subject_count,
        backup.metadata.total_chapters,
        backup.metadata.total_study_sessions
    );
    Ok(())
}

async fn handle_delete(tracker: &StudyTracker<FileStore>, id: &str) -> Result<()> {
    // Surface NotFound before deleting so a typo doesn't silently succeed.
    tracker.backups().backup(id).await?;
    tracker.backups().delete_backup(id).await?;
    println!("Backup deleted: {}", id);
    Ok(())
}

async fn handle_cleanup(tracker: &StudyTracker<FileStore>, keep: usize) -> Result<()> {
    let deleted = tracker.backups().cleanup_old_backups(keep).await?;
    println!("Deleted {} old backups (kept up to {}).", deleted, keep);
    Ok(())
}

async fn handle_export(
    tracker: &StudyTracker<FileStore>,
    id: &str,
    out: Option<PathBuf>,
) -> Result<()> {
    let json = tracker.backups().export_backup_as_json(id).await?;
    match out {
        Some(path) => {
            std::fs::write(&path, json)?;
            println!("Backup {} exported to {}", id, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn handle_import(tracker: &mut StudyTracker<FileStore>, file: &PathBuf) -> Result<()> {
    let json = std::fs::read_to_string(file)?;
    tracker.import_from_json(&json).await?;
    println!(
        "Imported {} subjects from {}.",
        tracker.data().subject_count(),
        file.display()
    );
    Ok(())
}

async fn handle_restore(tracker: &mut StudyTracker<FileStore>, id: &str) -> Result<()> {
    tracker.restore_from_backup(id).await?;
    println!(
        "Restored {} subjects from backup {}.",
        tracker.data().subject_count(),
        id
    );
    Ok(())
}

async fn handle_daily(tracker: &StudyTracker<FileStore>) -> Result<()> {
    match run_daily_backup_once(tracker.backups()).await? {
        Some(id) => println!("Daily backup created: {}", id),
        None => println!("Daily backup already exists or nothing to back up."),
    }
    Ok(())
}

async fn handle_watch(tracker: &StudyTracker<FileStore>) -> Result<()> {
    let scheduler = DailyBackupScheduler::start(tracker.backups().clone());
    println!("Daily backup scheduler running; press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    scheduler.stop();
    println!("Stopped.");
    Ok(())
}
