use crate::exif_reader::read_capture_time;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    #[default]
    Current,
    Created,
    Modified,
    Exif,
}

pub trait Timestamps {
    fn current(&self) -> DateTime<Local>;
    fn created(&self) -> Option<DateTime<Local>>;
    fn modified(&self) -> Option<DateTime<Local>>;
    fn captured(&self) -> Option<DateTime<Local>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub current: DateTime<Local>,
    pub created: Option<DateTime<Local>>,
    pub modified: Option<DateTime<Local>>,
    pub captured: Option<DateTime<Local>>,
}

impl FileMetadata {
    pub fn at(current: DateTime<Local>) -> Self {
        Self {
            current,
            created: None,
            modified: None,
            captured: None,
        }
    }
}

impl Timestamps for FileMetadata {
    fn current(&self) -> DateTime<Local> {
        self.current
    }

    fn created(&self) -> Option<DateTime<Local>> {
        self.created
    }

    fn modified(&self) -> Option<DateTime<Local>> {
        self.modified
    }

    fn captured(&self) -> Option<DateTime<Local>> {
        self.captured
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FsTimes {
    created: Option<DateTime<Local>>,
    modified: Option<DateTime<Local>>,
}

#[derive(Debug)]
pub struct FileEntry {
    path: PathBuf,
    current: DateTime<Local>,
    fs_times: OnceLock<FsTimes>,
    captured: OnceLock<Option<DateTime<Local>>>,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>, current: DateTime<Local>) -> Self {
        Self {
            path: path.into(),
            current,
            fs_times: OnceLock::new(),
            captured: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fs_times(&self) -> FsTimes {
        *self.fs_times.get_or_init(|| match fs::metadata(&self.path) {
            Ok(meta) => FsTimes {
                created: meta.created().ok().map(DateTime::from),
                modified: meta.modified().ok().map(DateTime::from),
            },
            Err(_) => FsTimes::default(),
        })
    }
}

impl Timestamps for FileEntry {
    fn current(&self) -> DateTime<Local> {
        self.current
    }

    fn created(&self) -> Option<DateTime<Local>> {
        self.fs_times().created
    }

    fn modified(&self) -> Option<DateTime<Local>> {
        self.fs_times().modified
    }

    fn captured(&self) -> Option<DateTime<Local>> {
        *self
            .captured
            .get_or_init(|| read_capture_time(&self.path).ok().flatten())
    }
}

pub fn resolve_timestamp(
    source: DateSource,
    timestamps: &dyn Timestamps,
    warnings: &mut Vec<String>,
) -> Option<DateTime<Local>> {
    match source {
        DateSource::Current => Some(timestamps.current()),
        DateSource::Modified => {
            let value = timestamps.modified();
            if value.is_none() {
                warnings.push("modification time unavailable".to_string());
            }
            value
        }
        DateSource::Exif => {
            if let Some(value) = timestamps.captured() {
                return Some(value);
            }
            warnings.push("no embedded capture time; using creation time".to_string());
            resolve_timestamp(DateSource::Created, timestamps, warnings)
        }
        DateSource::Created => {
            if let Some(value) = timestamps.created() {
                return Some(value);
            }
            warnings.push("creation time unavailable; using modification time".to_string());
            resolve_timestamp(DateSource::Modified, timestamps, warnings)
        }
    }
}
