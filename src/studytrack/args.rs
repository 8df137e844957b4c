use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "studytrack", version, about = "Spaced-repetition study tracker with snapshot backups")]
pub struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show subjects, chapters and revisions that want attention
    Status,

    /// List snapshots, newest first
    Backups {
        /// Maximum number of entries to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage snapshots
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Run the daily backup check once and exit (cron entry point;
    /// schedule at 18:30 UTC for midnight in the reference timezone)
    Daily,

    /// Keep the daily backup schedule running in the foreground
    Watch,
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Take a manual snapshot now
    Create {
        /// Optional note recorded in the snapshot name
        #[arg(long)]
        description: Option<String>,
    },

    /// Show one snapshot's details
    Show { id: String },

    /// Permanently delete one snapshot
    Delete { id: String },

    /// Delete everything but the most recent snapshots
    Cleanup {
        /// How many snapshots to keep
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Write a snapshot out as a JSON file
    Export {
        id: String,
        /// Output path; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Import a previously exported JSON file
    Import { file: PathBuf },

    /// Restore the dataset from a snapshot
    Restore { id: String },
}
