use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Subject not found: {0}")]
    SubjectNotFound(i64),

    #[error("Chapter not found: {0}")]
    ChapterNotFound(i64),

    #[error("Study session not found: {0}")]
    SessionNotFound(i64),

    #[error("Past paper not found: {0}")]
    PaperNotFound(i64),

    #[error("Revision index {index} out of range for session {session}")]
    RevisionOutOfRange { session: i64, index: usize },

    #[error("Invalid backup file format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
