// Library service - watched directory lifecycle on top of the scanner
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use tracing::{info, warn};

use crate::db::{self, Database};
use crate::error::{IndexError, Result};
use crate::models::{VideoRecord, WatchedDirectory};
use crate::scanner::{ScanSummary, Scanner};
use crate::video::VideoBackend;

/// A watched directory named by id or by path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryRef {
    Id(i64),
    Path(PathBuf),
}

impl FromStr for DirectoryRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(id) => DirectoryRef::Id(id),
            Err(_) => DirectoryRef::Path(PathBuf::from(s)),
        })
    }
}

/// Outcome of registering a directory
#[derive(Debug)]
pub enum Registration {
    Added {
        directory: WatchedDirectory,
        summary: ScanSummary,
    },
    AlreadyRegistered(WatchedDirectory),
}

/// Filter for listing indexed videos
#[derive(Debug, Clone, Default)]
pub struct VideoFilter {
    pub favorites_only: bool,
    /// Only videos whose parent directory is this directory or below it
    pub directory: Option<PathBuf>,
}

/// The video catalog: database, decoder backend and output root
pub struct Library<B: VideoBackend> {
    db: Database,
    backend: B,
    output_root: PathBuf,
}

impl<B: VideoBackend> Library<B> {
    pub fn new(db: Database, backend: B, output_root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&output_root)?;
        Ok(Self {
            db,
            backend,
            output_root,
        })
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Register a directory and run its initial full scan
    pub fn register_directory(&mut self, path: &Path) -> Result<Registration> {
        if !path.is_dir() {
            return Err(IndexError::NotADirectory(path.to_path_buf()));
        }
        let path = path.canonicalize()?;

        let mut directory = match db::get_directory_by_path(self.db.conn(), &path)? {
            Some(existing) if existing.last_scanned.is_some() => {
                info!("already watching {}", path.display());
                return Ok(Registration::AlreadyRegistered(existing));
            }
            // Initial scan never completed; already indexed files are skipped
            Some(existing) => {
                info!("resuming initial scan of {}", path.display());
                existing
            }
            None => db::insert_directory(self.db.conn(), &path)?,
        };
        let summary = self.scanner().full_scan(&directory)?;

        let now = Utc::now();
        db::mark_scanned(self.db.conn(), directory.id, &now)?;
        directory.last_scanned = Some(now);

        info!(?summary, "registered {}", path.display());
        Ok(Registration::Added { directory, summary })
    }

    /// Reconcile a registered directory with the filesystem.
    /// A directory that no longer exists is marked inactive.
    pub fn rescan_directory(&mut self, target: &DirectoryRef) -> Result<(WatchedDirectory, ScanSummary)> {
        let mut directory = self.resolve(target)?;

        if !directory.directory_path.is_dir() {
            warn!("{} is gone, marking inactive", directory.directory_path.display());
            db::set_directory_active(self.db.conn(), directory.id, false)?;
            return Err(IndexError::NotADirectory(directory.directory_path));
        }

        let summary = self.scanner().smart_rescan(&directory)?;

        let now = Utc::now();
        db::mark_scanned(self.db.conn(), directory.id, &now)?;
        directory.last_scanned = Some(now);
        directory.is_active = true;

        info!(?summary, "rescanned {}", directory.directory_path.display());
        Ok((directory, summary))
    }

    /// Forget a directory, deleting its videos and their generated images
    pub fn remove_directory(&mut self, target: &DirectoryRef) -> Result<ScanSummary> {
        let directory = self.resolve(target)?;
        self.scanner().remove_directory(&directory)
    }

    pub fn directories(&self) -> Result<Vec<WatchedDirectory>> {
        Ok(db::get_all_directories(self.db.conn())?)
    }

    pub fn active_directories(&self) -> Result<Vec<WatchedDirectory>> {
        Ok(self.directories()?.into_iter().filter(|d| d.is_active).collect())
    }

    /// Indexed videos ordered by file name
    pub fn videos(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>> {
        let videos = db::get_all_videos(self.db.conn(), filter.favorites_only)?;
        Ok(match &filter.directory {
            Some(dir) => videos
                .into_iter()
                .filter(|v| Path::new(&v.directory).starts_with(dir))
                .collect(),
            None => videos,
        })
    }

    /// Distinct parent directories of indexed videos
    pub fn video_directories(&self) -> Result<Vec<String>> {
        Ok(db::get_video_directories(self.db.conn())?)
    }

    pub fn video(&self, video_id: i64) -> Result<VideoRecord> {
        db::get_video(self.db.conn(), video_id)?.ok_or(IndexError::UnknownVideo(video_id))
    }

    /// Flip a video's favorite flag, returning the new value
    pub fn toggle_favorite(&mut self, video_id: i64) -> Result<bool> {
        db::toggle_favorite(self.db.conn(), video_id)?.ok_or(IndexError::UnknownVideo(video_id))
    }

    /// Look up a registered directory
    pub fn resolve(&self, target: &DirectoryRef) -> Result<WatchedDirectory> {
        let found = match target {
            DirectoryRef::Id(id) => db::get_directory(self.db.conn(), *id)?,
            DirectoryRef::Path(path) => {
                // The directory may already be gone from disk
                let path = path.canonicalize().unwrap_or_else(|_| path.clone());
                db::get_directory_by_path(self.db.conn(), &path)?
            }
        };

        found.ok_or_else(|| {
            IndexError::UnknownDirectory(match target {
                DirectoryRef::Id(id) => id.to_string(),
                DirectoryRef::Path(path) => path.display().to_string(),
            })
        })
    }

    fn scanner(&mut self) -> Scanner<'_, B> {
        Scanner::new(&mut self.db, &self.backend, &self.output_root)
    }
}
