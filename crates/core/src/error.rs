use crate::conflict::Conflict;
use crate::executor::UndoReport;
use crate::journal::Operation;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule {position}: invalid regex pattern {pattern:?}: {message}")]
    InvalidRegex {
        position: usize,
        pattern: String,
        message: String,
    },
    #[error("rule {position}: invalid date format {format:?}")]
    InvalidDateFormat { position: usize, format: String },
    #[error("rule {position}: parameter `{name}` must not be negative (got {value})")]
    NegativeParameter {
        position: usize,
        name: &'static str,
        value: i64,
    },
    #[error("rule {position}: position \"index\" requires an `index` parameter")]
    MissingIndex { position: usize },
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("{count} item(s) carry blocking conflicts")]
    BlockingConflicts {
        count: usize,
        blocked: Vec<BlockedItem>,
    },
    #[error("rename cycle through {} path(s) has no operation that can be staged", paths.len())]
    UnresolvableCycle { paths: Vec<PathBuf> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedItem {
    pub path: PathBuf,
    pub target: PathBuf,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("preview was superseded by a newer request")]
    Superseded,
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io failure at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("journal at {path} is not valid json")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("journal at {path} failed integrity check: {reason}")]
    Integrity { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("commit cancelled before any file was renamed")]
    Cancelled,
    #[error("journal could not be recorded")]
    Journal {
        journal_path: Option<PathBuf>,
        #[source]
        source: JournalError,
        rollback: Option<UndoReport>,
    },
    #[error(
        "rename failed at operation {}: {} -> {}",
        operation.seq,
        operation.from().display(),
        operation.to().display()
    )]
    Io {
        journal_path: PathBuf,
        operation: Box<Operation>,
        #[source]
        source: io::Error,
        rollback: UndoReport,
    },
}

impl CommitError {
    pub fn rollback(&self) -> Option<&UndoReport> {
        match self {
            CommitError::Journal { rollback, .. } => rollback.as_ref(),
            CommitError::Io { rollback, .. } => Some(rollback),
            _ => None,
        }
    }

    pub fn journal_path(&self) -> Option<&PathBuf> {
        match self {
            CommitError::Journal { journal_path, .. } => journal_path.as_ref(),
            CommitError::Io { journal_path, .. } => Some(journal_path),
            _ => None,
        }
    }
}
