mod config;
mod conflict;
mod error;
mod executor;
mod exif_reader;
mod fs;
mod journal;
mod metadata;
mod pipeline;
mod planner;
mod preview;
mod rule;

pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
};
pub use conflict::{detect_conflicts, is_reserved_name, Conflict};
pub use error::{BlockedItem, CommitError, JournalError, PlanError, PreviewError, RuleError};
pub use executor::{commit, commit_with_cancel, revert, undo, CommitOutcome, Residual, UndoReport};
pub use exif_reader::read_capture_time;
pub use fs::{case_fold, FileSystem, RealFileSystem};
pub use journal::{
    load_journal, status_log_path, write_journal, Journal, JournalStore, JournalWriter, Operation,
    OperationStatus, Stage, JOURNAL_VERSION,
};
pub use metadata::{resolve_timestamp, DateSource, FileEntry, FileMetadata, Timestamps};
pub use pipeline::{split_name, Evaluation, Pipeline};
pub use planner::plan;
pub use preview::{collect_files, generate_preview, CancelHandle, PreviewGenerator, PreviewItem};
pub use rule::{CaseStyle, CharClass, Position, PositionKind, Rule, RuleDefinition};
