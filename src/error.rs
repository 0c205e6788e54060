// Error types shared by the indexer
use std::path::PathBuf;
use thiserror::Error;

/// Errors that cross the indexer boundary.
///
/// Expected per-file outcomes (unreadable video, too few frames) are not
/// errors; they are reported through `Option` / `ProcessOutcome` values.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("video decode error: {0}")]
    Decode(String),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("directory is not registered: {0}")]
    UnknownDirectory(String),

    #[error("no video with id {0}")]
    UnknownVideo(i64),

    #[error("invalid settings file {}: {source}", path.display())]
    Settings {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<ffmpeg_next::Error> for IndexError {
    fn from(err: ffmpeg_next::Error) -> Self {
        IndexError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
