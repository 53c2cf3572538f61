use crate::conflict::{detect_conflicts, Conflict};
use crate::error::PreviewError;
use crate::fs::FileSystem;
use crate::metadata::FileEntry;
use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviewItem {
    pub original_path: PathBuf,
    pub new_path: PathBuf,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<String>,
}

impl PreviewItem {
    pub fn is_blocked(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.original_path != self.new_path
    }
}

pub struct PreviewGenerator<'a> {
    fs: &'a dyn FileSystem,
    generation: Arc<AtomicU64>,
    pool: Option<rayon::ThreadPool>,
}

#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicU64>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

impl<'a> PreviewGenerator<'a> {
    pub fn new(fs: &'a dyn FileSystem) -> Self {
        Self {
            fs,
            generation: Arc::new(AtomicU64::new(0)),
            pool: None,
        }
    }

    pub fn with_threads(fs: &'a dyn FileSystem, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("preview-{i}"))
            .build()
            .context("failed to build preview worker pool")?;
        Ok(Self {
            fs,
            generation: Arc::new(AtomicU64::new(0)),
            pool: Some(pool),
        })
    }

    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.generation))
    }

    pub fn preview(
        &self,
        files: &[PathBuf],
        pipeline: &Pipeline,
    ) -> Result<Vec<PreviewItem>, PreviewError> {
        let ticket = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let current = || self.generation.load(Ordering::Acquire) == ticket;
        let now = Local::now();

        let compute = || {
            files
                .par_iter()
                .enumerate()
                .map(|(ordinal, path)| current().then(|| preview_one(path, ordinal, pipeline, now)))
                .collect::<Option<Vec<_>>>()
        };
        let items = match &self.pool {
            Some(pool) => pool.install(compute),
            None => compute(),
        };

        let Some(mut items) = items.filter(|_| current()) else {
            debug!(ticket, "preview superseded");
            return Err(PreviewError::Superseded);
        };
        detect_conflicts(&mut items, self.fs);
        if !current() {
            debug!(ticket, "preview superseded during conflict detection");
            return Err(PreviewError::Superseded);
        }

        debug!(
            ticket,
            files = items.len(),
            blocked = items.iter().filter(|i| i.is_blocked()).count(),
            "preview computed"
        );
        Ok(items)
    }
}

pub fn generate_preview(
    files: &[PathBuf],
    pipeline: &Pipeline,
    fs: &dyn FileSystem,
) -> Result<Vec<PreviewItem>, PreviewError> {
    PreviewGenerator::new(fs).preview(files, pipeline)
}

fn preview_one(
    path: &Path,
    ordinal: usize,
    pipeline: &Pipeline,
    now: DateTime<Local>,
) -> PreviewItem {
    let mut item = PreviewItem {
        original_path: path.to_path_buf(),
        new_path: path.to_path_buf(),
        conflicts: Vec::new(),
        warnings: Vec::new(),
    };

    let Some(file_name) = path.file_name() else {
        item.warnings
            .push("path has no file name; left unchanged".to_string());
        return item;
    };
    let Some(file_name) = file_name.to_str() else {
        item.warnings
            .push("file name is not valid UTF-8; left unchanged".to_string());
        return item;
    };

    let entry = FileEntry::new(path, now);
    let evaluation = pipeline.evaluate(file_name, ordinal, &entry);
    item.new_path = path.with_file_name(&evaluation.name);
    item.warnings = evaluation.warnings;
    item
}

pub fn collect_files(inputs: &[PathBuf], recursive: bool, include_hidden: bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        let input = std::path::absolute(input)
            .with_context(|| format!("cannot resolve path: {}", input.display()))?;
        if !input.is_dir() {
            out.push(input);
            continue;
        }

        let walker = WalkDir::new(&input)
            .min_depth(1)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || include_hidden || !is_hidden(entry.path()));
        for entry in walker {
            let entry =
                entry.with_context(|| format!("failed to walk directory: {}", input.display()))?;
            if entry.file_type().is_dir() {
                continue;
            }
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
