use crate::conflict::detect_conflicts;
use crate::error::{CommitError, JournalError};
use crate::fs::{case_fold, FileSystem};
use crate::journal::{
    load_journal, Journal, JournalStore, JournalWriter, Operation, OperationStatus, Stage,
};
use crate::planner::plan;
use crate::preview::PreviewItem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitOutcome {
    pub transaction: Uuid,
    pub journal: PathBuf,
    pub applied: usize,
    pub operations: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Residual {
    pub seq: usize,
    pub original: PathBuf,
    pub target: PathBuf,
    pub location: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UndoReport {
    pub transaction: Option<Uuid>,
    pub reverted: usize,
    pub already_reverted: usize,
    pub not_applied: usize,
    pub residual: Vec<Residual>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub journal_errors: Vec<String>,
}

impl UndoReport {
    pub fn is_complete(&self) -> bool {
        self.residual.is_empty()
    }
}

pub fn commit(
    items: &[PreviewItem],
    fs: &dyn FileSystem,
    store: &JournalStore,
) -> Result<CommitOutcome, CommitError> {
    commit_with_cancel(items, fs, store, &AtomicBool::new(false))
}

pub fn commit_with_cancel(
    items: &[PreviewItem],
    fs: &dyn FileSystem,
    store: &JournalStore,
    cancel: &AtomicBool,
) -> Result<CommitOutcome, CommitError> {
    let mut items = items.to_vec();
    detect_conflicts(&mut items, fs);
    let operations = plan(&items, fs)?;
    if cancel.load(Ordering::Acquire) {
        info!("commit cancelled during planning");
        return Err(CommitError::Cancelled);
    }

    let mut journal = Journal::new(operations);
    let journal_path = store
        .persist(&journal)
        .map_err(|source| CommitError::Journal {
            journal_path: None,
            source,
            rollback: None,
        })?;
    info!(
        transaction = %journal.id,
        operations = journal.operations.len(),
        journal = %journal_path.display(),
        "transaction planned"
    );

    let mut writer = JournalWriter::new(&journal_path);
    for index in 0..journal.operations.len() {
        let seq = journal.operations[index].seq;
        if let Err(source) = writer.record(seq, OperationStatus::Started) {
            return Err(abort_on_journal_failure(journal, journal_path, source, fs));
        }
        journal.operations[index].status = OperationStatus::Started;

        let op = &journal.operations[index];
        debug!(
            transaction = %journal.id,
            seq,
            from = %op.from().display(),
            to = %op.to().display(),
            "rename"
        );
        match fs.rename(op.from(), op.to()) {
            Ok(()) => {
                journal.operations[index].status = OperationStatus::Done;
                if let Err(source) = writer.record(seq, OperationStatus::Done) {
                    return Err(abort_on_journal_failure(journal, journal_path, source, fs));
                }
            }
            Err(source) => {
                let failed = op.clone();
                warn!(
                    transaction = %journal.id,
                    seq,
                    error = %source,
                    "rename failed; rolling back"
                );
                journal.operations[index].status = OperationStatus::Failed;
                let mut earlier = Vec::new();
                if let Err(err) = writer.record(seq, OperationStatus::Failed) {
                    earlier.push(err.to_string());
                }
                let reverted = revert(&mut journal, &journal_path, fs);
                let rollback = merge_journal_errors(reverted, earlier);
                return Err(CommitError::Io {
                    journal_path,
                    operation: Box::new(failed),
                    source,
                    rollback,
                });
            }
        }
    }

    if let Err(err) = writer.compact(&journal) {
        warn!(
            transaction = %journal.id,
            error = %err,
            "journal compaction failed; the status log stays authoritative"
        );
    }

    let applied = journal
        .operations
        .iter()
        .filter(|op| op.stage != Stage::FromTemporary)
        .count();
    info!(transaction = %journal.id, applied, "transaction committed");
    Ok(CommitOutcome {
        transaction: journal.id,
        journal: journal_path,
        applied,
        operations: journal.operations.len(),
        unchanged: items.len().saturating_sub(applied),
    })
}

fn abort_on_journal_failure(
    mut journal: Journal,
    journal_path: PathBuf,
    source: JournalError,
    fs: &dyn FileSystem,
) -> CommitError {
    warn!(transaction = %journal.id, error = %source, "journal write failed; rolling back");
    let rollback = revert(&mut journal, &journal_path, fs);
    CommitError::Journal {
        journal_path: Some(journal_path),
        source,
        rollback: Some(rollback),
    }
}

fn merge_journal_errors(mut report: UndoReport, mut earlier: Vec<String>) -> UndoReport {
    earlier.append(&mut report.journal_errors);
    report.journal_errors = earlier;
    report
}

pub fn undo(path: &Path, fs: &dyn FileSystem) -> Result<UndoReport, JournalError> {
    let mut journal = load_journal(path)?;
    info!(transaction = %journal.id, journal = %path.display(), "undo requested");
    Ok(revert(&mut journal, path, fs))
}

pub fn revert(journal: &mut Journal, journal_path: &Path, fs: &dyn FileSystem) -> UndoReport {
    let mut report = UndoReport {
        transaction: Some(journal.id),
        ..UndoReport::default()
    };
    let mut writer = JournalWriter::new(journal_path);
    let mut changed = false;

    for index in (0..journal.operations.len()).rev() {
        let op = &journal.operations[index];
        let next_status = match op.status {
            OperationStatus::Planned | OperationStatus::Failed => {
                report.not_applied += 1;
                continue;
            }
            OperationStatus::Reverted => {
                report.already_reverted += 1;
                continue;
            }
            OperationStatus::Started if fs.exists(op.from()) && !fs.exists(op.to()) => {
                // intent was recorded but the rename never happened
                report.not_applied += 1;
                OperationStatus::Failed
            }
            OperationStatus::Started | OperationStatus::Done => match revert_one(op, fs) {
                Ok(()) => {
                    report.reverted += 1;
                    OperationStatus::Reverted
                }
                Err(reason) => {
                    warn!(seq = op.seq, reason = %reason, "operation could not be reverted");
                    report.residual.push(Residual {
                        seq: op.seq,
                        original: op.original.clone(),
                        target: op.target.clone(),
                        location: op.to().to_path_buf(),
                        reason,
                    });
                    continue;
                }
            },
        };

        let seq = op.seq;
        journal.operations[index].status = next_status;
        changed = true;
        if let Err(err) = writer.record(seq, next_status) {
            report.journal_errors.push(err.to_string());
        }
    }
    if changed {
        if let Err(err) = writer.compact(journal) {
            report.journal_errors.push(err.to_string());
        }
    }

    info!(
        transaction = %journal.id,
        reverted = report.reverted,
        already_reverted = report.already_reverted,
        not_applied = report.not_applied,
        residual = report.residual.len(),
        "revert finished"
    );
    report
}

fn revert_one(op: &Operation, fs: &dyn FileSystem) -> Result<(), String> {
    let here = op.to();
    let back = op.from();
    if !fs.exists(here) {
        return Err(format!("{} no longer exists", here.display()));
    }
    let case_only = case_fold(here) == case_fold(back);
    if !case_only && fs.exists(back) {
        return Err(format!("{} is occupied", back.display()));
    }
    fs.rename(here, back)
        .map_err(|err| format!("rename {} -> {} failed: {err}", here.display(), back.display()))
}
