// Scanner module - directory reconciliation and per-video processing
mod fingerprint;
pub mod naming;

pub use fingerprint::*;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::db::{self, Database};
use crate::error::Result;
use crate::models::{NewVideo, VideoRecord, WatchedDirectory};
use crate::video::{build_contact_sheet, extract_metadata, remove_artifacts, ContactSheet, VideoBackend};
use naming::relative_to;

/// Supported video extensions (matched case-insensitively)
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mkv", ".avi", ".mov", ".flv"];

/// Result of processing one candidate file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A new record was created with this id
    Indexed(i64),
    /// A record for this exact path already exists
    AlreadyIndexed,
    /// The video could not be opened or stat'ed
    NoMetadata,
    /// Frames could not be sampled or written
    NoContactSheet,
}

/// Counts reported after a scan or rescan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub skipped: usize,
    /// Generated files that could not be deleted
    pub orphaned_files: usize,
}

/// Snapshot diff of a watched directory against its indexed records.
/// Every supported file under the root lands in exactly one set.
#[derive(Debug, Default)]
pub struct RescanPlan {
    pub added: Vec<PathBuf>,
    pub modified: Vec<(PathBuf, VideoRecord)>,
    pub unchanged: Vec<PathBuf>,
    pub removed: Vec<VideoRecord>,
}

/// Reconciles watched directories against the catalog.
///
/// Holds the database exclusively for the duration of a pass, so two passes
/// can never interleave within one process.
pub struct Scanner<'a, B: VideoBackend> {
    db: &'a mut Database,
    backend: &'a B,
    output_root: &'a Path,
}

impl<'a, B: VideoBackend> Scanner<'a, B> {
    pub fn new(db: &'a mut Database, backend: &'a B, output_root: &'a Path) -> Self {
        Self {
            db,
            backend,
            output_root,
        }
    }

    /// Index every supported file under a newly registered directory.
    /// Paths that already have a record are skipped, not re-validated.
    pub fn full_scan(&mut self, directory: &WatchedDirectory) -> Result<ScanSummary> {
        info!("full scan of {}", directory.directory_path.display());
        let mut summary = ScanSummary::default();

        for path in find_video_files(&directory.directory_path) {
            match self.process_video(directory.id, &path)? {
                ProcessOutcome::Indexed(_) => summary.added += 1,
                ProcessOutcome::AlreadyIndexed => summary.unchanged += 1,
                ProcessOutcome::NoMetadata | ProcessOutcome::NoContactSheet => summary.skipped += 1,
            }
        }

        Ok(summary)
    }

    /// Classify every file under a watched directory without mutating anything
    pub fn plan_rescan(&self, directory: &WatchedDirectory) -> Result<RescanPlan> {
        let mut known: HashMap<String, VideoRecord> = db::get_videos_in_directory(self.db.conn(), directory.id)?
            .into_iter()
            .map(|v| (v.file_path.clone(), v))
            .collect();

        let mut plan = RescanPlan::default();
        for path in find_video_files(&directory.directory_path) {
            let key = path.to_string_lossy().to_string();
            let Some(record) = known.remove(&key) else {
                plan.added.push(path);
                continue;
            };

            match file_mtime(&path) {
                Ok(mtime) if mtime > record.file_mtime => plan.modified.push((path, record)),
                Ok(_) => plan.unchanged.push(path),
                Err(e) => {
                    // Still on disk, so not removed; retried next pass
                    warn!("cannot stat {}: {}", path.display(), e);
                    plan.unchanged.push(path);
                }
            }
        }

        // Whatever was not visited is gone from disk
        plan.removed = known.into_values().collect();
        plan.removed.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        Ok(plan)
    }

    /// Reconcile a previously indexed directory: index new files, rebuild
    /// modified ones, drop records whose files disappeared.
    pub fn smart_rescan(&mut self, directory: &WatchedDirectory) -> Result<ScanSummary> {
        info!("rescanning {}", directory.directory_path.display());
        let plan = self.plan_rescan(directory)?;

        let mut summary = ScanSummary {
            unchanged: plan.unchanged.len(),
            ..Default::default()
        };

        for (path, record) in &plan.modified {
            info!("modified, reprocessing: {}", path.display());
            summary.orphaned_files += self.delete_videos(std::slice::from_ref(record))?;

            match self.process_video(directory.id, path)? {
                ProcessOutcome::Indexed(_) => summary.updated += 1,
                _ => summary.skipped += 1,
            }
        }

        for path in &plan.added {
            match self.process_video(directory.id, path)? {
                ProcessOutcome::Indexed(_) => summary.added += 1,
                ProcessOutcome::AlreadyIndexed => summary.unchanged += 1,
                ProcessOutcome::NoMetadata | ProcessOutcome::NoContactSheet => summary.skipped += 1,
            }
        }

        if !plan.removed.is_empty() {
            for record in &plan.removed {
                info!("removed from disk, deleting record: {}", record.file_path);
            }
            summary.orphaned_files += self.delete_videos(&plan.removed)?;
            summary.removed = plan.removed.len();
        }

        Ok(summary)
    }

    /// Extract metadata, build the contact sheet and store the record, as one unit.
    /// Nothing is stored unless both steps succeed.
    pub fn process_video(&mut self, directory_id: i64, path: &Path) -> Result<ProcessOutcome> {
        let file_path = path.to_string_lossy().to_string();
        if db::video_exists(self.db.conn(), &file_path)? {
            debug!("already indexed, skipping: {}", path.display());
            return Ok(ProcessOutcome::AlreadyIndexed);
        }

        let file_mtime = match file_mtime(path) {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!("cannot stat {}: {}", path.display(), e);
                return Ok(ProcessOutcome::NoMetadata);
            }
        };

        let Some(metadata) = extract_metadata(self.backend, path) else {
            return Ok(ProcessOutcome::NoMetadata);
        };

        let Some(sheet) = build_contact_sheet(self.backend, path, self.output_root) else {
            return Ok(ProcessOutcome::NoContactSheet);
        };

        let new_video = NewVideo {
            directory_id,
            file_path,
            file_name: path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            directory: path
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            metadata,
            contact_sheet_path: relative_to(&sheet.sheet_path, self.output_root),
            screenshots: sheet
                .screenshots
                .iter()
                .map(|p| relative_to(p, self.output_root))
                .collect(),
            file_mtime,
        };

        match commit_new_video(self.db, &new_video) {
            Ok(id) => {
                info!("indexed: {}", path.display());
                Ok(ProcessOutcome::Indexed(id))
            }
            Err(e) => {
                discard_sheet(&sheet);
                Err(e.into())
            }
        }
    }

    /// Remove a watched directory together with every video it owns
    pub fn remove_directory(&mut self, directory: &WatchedDirectory) -> Result<ScanSummary> {
        let videos = db::get_videos_in_directory(self.db.conn(), directory.id)?;

        let tx = self.db.conn_mut().transaction()?;
        for video in &videos {
            db::delete_video(&tx, video.id)?;
        }
        db::delete_directory(&tx, directory.id)?;
        tx.commit()?;

        info!(
            "removed {} and {} videos",
            directory.directory_path.display(),
            videos.len()
        );

        Ok(ScanSummary {
            removed: videos.len(),
            orphaned_files: self.delete_files(&videos),
            ..Default::default()
        })
    }

    /// Delete records in one transaction, then their files.
    /// Returns the number of files that could not be deleted.
    fn delete_videos(&mut self, videos: &[VideoRecord]) -> Result<usize> {
        let tx = self.db.conn_mut().transaction()?;
        for video in videos {
            db::delete_video(&tx, video.id)?;
        }
        tx.commit()?;

        Ok(self.delete_files(videos))
    }

    fn delete_files(&self, videos: &[VideoRecord]) -> usize {
        let paths: Vec<PathBuf> = videos
            .iter()
            .flat_map(|v| v.owned_files())
            .map(|rel| self.output_root.join(rel))
            .collect();
        remove_artifacts(paths.iter().map(PathBuf::as_path)).len()
    }
}

fn commit_new_video(db: &mut Database, video: &NewVideo) -> rusqlite::Result<i64> {
    let tx = db.conn_mut().transaction()?;
    let id = db::insert_video(&tx, video)?;
    tx.commit()?;
    Ok(id)
}

fn discard_sheet(sheet: &ContactSheet) {
    let failures = remove_artifacts(sheet.files());
    if !failures.is_empty() {
        warn!("{} generated files left behind", failures.len());
    }
}

/// Whether a path has one of the supported video extensions
pub fn is_supported(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    VIDEO_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Find all supported video files under a directory, in a stable order
pub fn find_video_files(path: &Path) -> Vec<PathBuf> {
    WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| is_file_entry(entry) && is_supported(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Regular files, plus symlinks that resolve to one. Directory links are
/// neither listed nor descended.
fn is_file_entry(entry: &walkdir::DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
}

fn file_mtime(path: &Path) -> std::io::Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}
