// Catalog records
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::video::VideoMetadata;

/// A watched directory. Owns every video whose `directory_id` points at it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchedDirectory {
    pub id: i64,
    pub directory_path: PathBuf,
    pub last_scanned: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// One indexed video, unique by `file_path`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub id: i64,
    pub directory_id: i64,
    pub file_path: String,
    pub file_name: String,
    /// Parent directory of the source file
    pub directory: String,
    pub duration: f64,
    pub resolution: String,
    pub size_mb: f64,
    /// Relative to the output root
    pub contact_sheet_path: String,
    pub is_favorite: bool,
    pub file_mtime: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Relative to the output root, in sampling order
    pub screenshots: Vec<String>,
}

impl VideoRecord {
    /// Every generated file owned by this record, relative to the output root
    pub fn owned_files(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.contact_sheet_path.as_str()).chain(self.screenshots.iter().map(String::as_str))
    }
}

/// Everything needed to insert a new video with its screenshots
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub directory_id: i64,
    pub file_path: String,
    pub file_name: String,
    pub directory: String,
    pub metadata: VideoMetadata,
    pub contact_sheet_path: String,
    pub screenshots: Vec<String>,
    pub file_mtime: DateTime<Utc>,
}
