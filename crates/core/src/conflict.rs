use crate::fs::{case_fold, FileSystem};
use crate::preview::PreviewItem;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    TargetExists { path: PathBuf },
    Collision { path: PathBuf, with: Vec<PathBuf> },
    CaseCollision { path: PathBuf, with: PathBuf },
    ReservedName { name: String },
    InvalidName { name: String },
    SourceNotFound { path: PathBuf },
}

pub fn detect_conflicts(items: &mut [PreviewItem], fs: &dyn FileSystem) {
    let sources: HashSet<PathBuf> = items.iter().map(|i| i.original_path.clone()).collect();
    let sources_folded: HashSet<String> =
        items.iter().map(|i| case_fold(&i.original_path)).collect();

    let mut by_target = HashMap::<&Path, Vec<usize>>::new();
    let mut by_folded = HashMap::<String, Vec<usize>>::new();
    for (index, item) in items.iter().enumerate() {
        by_target.entry(&item.new_path).or_default().push(index);
        by_folded
            .entry(case_fold(&item.new_path))
            .or_default()
            .push(index);
    }

    let mut dirs = DirCache::new(fs);
    let mut found = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let mut conflicts = Vec::new();
        let target = item.new_path.as_path();
        let changed = target != item.original_path;

        if let Some(sharing) = by_target.get(target).filter(|v| v.len() > 1) {
            let mut with: Vec<PathBuf> = sharing
                .iter()
                .filter(|&&other| other != index)
                .map(|&other| items[other].original_path.clone())
                .collect();
            with.sort();
            conflicts.push(Conflict::Collision {
                path: target.to_path_buf(),
                with,
            });
        }

        let mut case_peers = BTreeSet::<PathBuf>::new();
        if let Some(folded) = by_folded.get(&case_fold(target)) {
            for &other in folded {
                if items[other].new_path != target {
                    case_peers.insert(items[other].new_path.clone());
                }
            }
        }
        if changed {
            if let Some(foreign) = dirs.case_variants(target) {
                for entry in foreign {
                    if !sources.contains(&entry) {
                        case_peers.insert(entry);
                    }
                }
            }
        }
        for with in case_peers {
            conflicts.push(Conflict::CaseCollision {
                path: target.to_path_buf(),
                with,
            });
        }

        if changed && fs.exists(target) {
            let insensitive = target
                .parent()
                .map(|dir| !dirs.is_case_sensitive(dir))
                .unwrap_or(false);
            let member =
                sources.contains(target) || (insensitive && sources_folded.contains(&case_fold(target)));
            if !member {
                conflicts.push(Conflict::TargetExists {
                    path: target.to_path_buf(),
                });
            }
        }

        match target_name(&item.original_path, target) {
            Ok(name) => {
                if is_reserved_name(&name) {
                    conflicts.push(Conflict::ReservedName { name });
                }
            }
            Err(name) => conflicts.push(Conflict::InvalidName { name }),
        }

        if !fs.exists(&item.original_path) {
            conflicts.push(Conflict::SourceNotFound {
                path: item.original_path.clone(),
            });
        }

        found.push(conflicts);
    }

    for (item, conflicts) in items.iter_mut().zip(found) {
        item.conflicts = conflicts;
    }
}

pub fn is_reserved_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).to_ascii_uppercase();
    WINDOWS_RESERVED_NAMES
        .iter()
        .any(|reserved| reserved == &stem)
}

fn target_name(original: &Path, target: &Path) -> Result<String, String> {
    let name = target
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .ok_or_else(|| target.to_string_lossy().to_string())?;
    if target.parent() != original.parent() || name.contains('\0') {
        return Err(name);
    }
    Ok(name)
}

struct DirCache<'a> {
    fs: &'a dyn FileSystem,
    sensitivity: HashMap<PathBuf, bool>,
    listings: HashMap<PathBuf, HashMap<String, Vec<String>>>,
}

impl<'a> DirCache<'a> {
    fn new(fs: &'a dyn FileSystem) -> Self {
        Self {
            fs,
            sensitivity: HashMap::new(),
            listings: HashMap::new(),
        }
    }

    fn is_case_sensitive(&mut self, dir: &Path) -> bool {
        let fs = self.fs;
        *self
            .sensitivity
            .entry(dir.to_path_buf())
            .or_insert_with(|| fs.is_case_sensitive(dir))
    }

    fn case_variants(&mut self, target: &Path) -> Option<Vec<PathBuf>> {
        let dir = target.parent()?;
        let name = target.file_name()?.to_string_lossy().to_string();
        let fs = self.fs;
        let listing = self.listings.entry(dir.to_path_buf()).or_insert_with(|| {
            let mut by_fold = HashMap::<String, Vec<String>>::new();
            if let Ok(names) = fs.read_dir_names(dir) {
                for entry in names {
                    let entry = entry.to_string_lossy().to_string();
                    by_fold.entry(entry.to_lowercase()).or_default().push(entry);
                }
            }
            by_fold
        });
        let variants = listing
            .get(&name.to_lowercase())?
            .iter()
            .filter(|entry| **entry != name)
            .map(|entry| dir.join(entry))
            .collect();
        Some(variants)
    }
}
