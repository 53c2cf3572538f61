use crate::error::JournalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

pub const JOURNAL_VERSION: u32 = 1;
const JOURNAL_EXTENSION: &str = "json";
const STATUS_LOG_EXTENSION: &str = "log";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Planned,
    Started,
    Done,
    Failed,
    Reverted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Direct,
    ToTemporary,
    FromTemporary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Operation {
    pub seq: usize,
    pub original: PathBuf,
    pub target: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary: Option<PathBuf>,
    #[serde(default)]
    pub stage: Stage,
    pub status: OperationStatus,
}

impl Operation {
    pub fn direct(original: PathBuf, target: PathBuf) -> Self {
        Self {
            seq: 0,
            original,
            target,
            temporary: None,
            stage: Stage::Direct,
            status: OperationStatus::Planned,
        }
    }

    pub fn staged(original: PathBuf, target: PathBuf, temporary: PathBuf, stage: Stage) -> Self {
        Self {
            seq: 0,
            original,
            target,
            temporary: Some(temporary),
            stage,
            status: OperationStatus::Planned,
        }
    }

    pub fn from(&self) -> &Path {
        match self.stage {
            Stage::Direct | Stage::ToTemporary => &self.original,
            Stage::FromTemporary => self.temporary.as_deref().unwrap_or(self.original.as_path()),
        }
    }

    pub fn to(&self) -> &Path {
        match self.stage {
            Stage::Direct | Stage::FromTemporary => &self.target,
            Stage::ToTemporary => self.temporary.as_deref().unwrap_or(self.target.as_path()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Journal {
    pub version: u32,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub operations: Vec<Operation>,
}

impl Journal {
    pub fn new(mut operations: Vec<Operation>) -> Self {
        for (seq, op) in operations.iter_mut().enumerate() {
            op.seq = seq;
            op.status = OperationStatus::Planned;
        }
        Self {
            version: JOURNAL_VERSION,
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            operations,
        }
    }

    pub fn count(&self, status: OperationStatus) -> usize {
        self.operations
            .iter()
            .filter(|op| op.status == status)
            .count()
    }

    fn check_integrity(&self) -> Result<(), String> {
        if self.version != JOURNAL_VERSION {
            return Err(format!("unsupported journal version {}", self.version));
        }
        let mut open_temporaries = HashMap::<&Path, usize>::new();
        for (index, op) in self.operations.iter().enumerate() {
            if op.seq != index {
                return Err(format!("operation {index} carries sequence number {}", op.seq));
            }
            match (op.stage, op.temporary.as_deref()) {
                (Stage::Direct, _) => {}
                (Stage::ToTemporary, Some(temp)) => {
                    if open_temporaries.insert(temp, index).is_some() {
                        return Err(format!("temporary path reused at operation {index}"));
                    }
                }
                (Stage::FromTemporary, Some(temp)) => {
                    if open_temporaries.remove(temp).is_none() {
                        return Err(format!(
                            "operation {index} leaves a temporary that was never entered"
                        ));
                    }
                }
                (_, None) => {
                    return Err(format!("operation {index} is staged but has no temporary path"));
                }
            }
        }
        if let Some(index) = open_temporaries.values().min() {
            return Err(format!("operation {index} enters a temporary that is never left"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JournalStore {
    dir: PathBuf,
}

impl JournalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, journal: &Journal) -> PathBuf {
        self.dir.join(format!(
            "{}-{}.{}",
            journal.created_at.format("%Y%m%dT%H%M%S%.3fZ"),
            journal.id,
            JOURNAL_EXTENSION
        ))
    }

    pub fn persist(&self, journal: &Journal) -> Result<PathBuf, JournalError> {
        let path = self.path_for(journal);
        write_journal(&path, journal)?;
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<Journal, JournalError> {
        load_journal(path)
    }

    pub fn list(&self) -> Result<Vec<PathBuf>, JournalError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(JournalError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| JournalError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) == Some(JOURNAL_EXTENSION) {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn latest(&self) -> Result<Option<PathBuf>, JournalError> {
        Ok(self.list()?.pop())
    }
}

pub fn write_journal(path: &Path, journal: &Journal) -> Result<(), JournalError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|source| JournalError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let staging = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(journal).map_err(|source| JournalError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let io_err = |source| JournalError::Io {
        path: staging.clone(),
        source,
    };
    let mut file = File::create(&staging).map_err(io_err)?;
    file.write_all(&body).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&staging, path).map_err(|source| JournalError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    sync_dir(dir);

    debug!(transaction = %journal.id, path = %path.display(), "journal flushed");
    Ok(())
}

pub fn status_log_path(journal_path: &Path) -> PathBuf {
    journal_path.with_extension(STATUS_LOG_EXTENSION)
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusRecord {
    seq: usize,
    status: OperationStatus,
}

#[derive(Debug)]
pub struct JournalWriter {
    journal_path: PathBuf,
    log_path: PathBuf,
    dir_synced: bool,
}

impl JournalWriter {
    pub fn new(journal_path: &Path) -> Self {
        Self {
            journal_path: journal_path.to_path_buf(),
            log_path: status_log_path(journal_path),
            dir_synced: false,
        }
    }

    pub fn record(&mut self, seq: usize, status: OperationStatus) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(&StatusRecord { seq, status }).map_err(|source| {
            JournalError::Json {
                path: self.log_path.clone(),
                source,
            }
        })?;
        line.push(b'\n');

        let io_err = |source| JournalError::Io {
            path: self.log_path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(io_err)?;
        file.write_all(&line).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;
        if !self.dir_synced {
            sync_dir(self.log_path.parent().unwrap_or_else(|| Path::new(".")));
            self.dir_synced = true;
        }
        Ok(())
    }

    pub fn compact(&mut self, journal: &Journal) -> Result<(), JournalError> {
        write_journal(&self.journal_path, journal)?;
        match fs::remove_file(&self.log_path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(JournalError::Io {
                    path: self.log_path.clone(),
                    source,
                })
            }
        }
        self.dir_synced = false;
        Ok(())
    }
}

pub fn load_journal(path: &Path) -> Result<Journal, JournalError> {
    let raw = fs::read(path).map_err(|source| JournalError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut journal: Journal =
        serde_json::from_slice(&raw).map_err(|source| JournalError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    let integrity = |reason| JournalError::Integrity {
        path: path.to_path_buf(),
        reason,
    };
    journal.check_integrity().map_err(integrity)?;
    replay_status_log(&mut journal, path)?;
    Ok(journal)
}

// later records win; the journal file is only rewritten on compaction
fn replay_status_log(journal: &mut Journal, journal_path: &Path) -> Result<(), JournalError> {
    let log_path = status_log_path(journal_path);
    let raw = match fs::read(&log_path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(JournalError::Io {
                path: log_path,
                source,
            })
        }
    };

    let mut lines: Vec<&[u8]> = raw.split(|&byte| byte == b'\n').collect();
    // bytes after the last newline are an append that never completed
    if let Some(torn) = lines.pop().filter(|tail| !tail.is_empty()) {
        warn!(
            log = %log_path.display(),
            bytes = torn.len(),
            "ignoring incomplete status record"
        );
    }

    let mut applied = 0usize;
    for (number, line) in lines.into_iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let record: StatusRecord =
            serde_json::from_slice(line).map_err(|err| JournalError::Integrity {
                path: log_path.clone(),
                reason: format!("status record {} is malformed: {err}", number + 1),
            })?;
        let Some(op) = journal.operations.get_mut(record.seq) else {
            return Err(JournalError::Integrity {
                path: log_path.clone(),
                reason: format!(
                    "status record {} names unknown operation {}",
                    number + 1,
                    record.seq
                ),
            });
        };
        op.status = record.status;
        applied += 1;
    }
    debug!(log = %log_path.display(), records = applied, "status log replayed");
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
