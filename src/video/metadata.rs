// Metadata extraction - duration, resolution and size with numeric fallbacks
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use super::decoder::{VideoBackend, VideoStream};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Video metadata stored with every catalog entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    /// Seconds, always finite and >= 0
    pub duration: f64,
    /// "{width}x{height}"
    pub resolution: String,
    /// MiB, always finite and >= 0
    pub size_mb: f64,
}

/// Extract metadata for a video.
///
/// Returns None when the video cannot be opened; the caller skips the file.
/// Corrupt numeric values are coerced to 0.0 instead of failing.
pub fn extract_metadata<B: VideoBackend>(backend: &B, path: &Path) -> Option<VideoMetadata> {
    let stream = match backend.open(path) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("cannot open {}: {}", path.display(), e);
            return None;
        }
    };

    let duration = duration_seconds(stream.frame_count(), stream.fps());
    let (width, height) = stream.dimensions();

    // Release the decoder before touching the filesystem again
    drop(stream);

    Some(VideoMetadata {
        duration,
        resolution: format!("{}x{}", width, height),
        size_mb: file_size_mb(path),
    })
}

/// frame_count / fps, or 0.0 when either is unusable or the result is not finite
pub fn duration_seconds(frame_count: u64, fps: f64) -> f64 {
    if frame_count == 0 || !(fps > 0.0) {
        return 0.0;
    }
    let duration = frame_count as f64 / fps;
    if duration.is_finite() {
        duration
    } else {
        0.0
    }
}

fn file_size_mb(path: &Path) -> f64 {
    match std::fs::metadata(path) {
        Ok(meta) => {
            let size = meta.len() as f64 / BYTES_PER_MIB;
            if size.is_finite() {
                size
            } else {
                0.0
            }
        }
        Err(e) => {
            warn!("cannot stat {}: {}", path.display(), e);
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::testing::{FakeBackend, FakeVideo};

    #[test]
    fn duration_is_frames_over_fps() {
        assert_eq!(duration_seconds(100, 25.0), 4.0);
    }

    #[test]
    fn duration_falls_back_to_zero() {
        assert_eq!(duration_seconds(0, 25.0), 0.0);
        assert_eq!(duration_seconds(100, 0.0), 0.0);
        assert_eq!(duration_seconds(100, -1.0), 0.0);
        assert_eq!(duration_seconds(100, f64::NAN), 0.0);
        assert_eq!(duration_seconds(100, f64::MIN_POSITIVE), 0.0);
    }

    #[test]
    fn extracts_duration_resolution_and_size() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.mp4");
        std::fs::write(&path, vec![0u8; 3 * 1024 * 1024]).unwrap();

        let backend = FakeBackend::new();
        backend.add(&path, FakeVideo::new(100, 25.0, 1920, 1080));

        let meta = extract_metadata(&backend, &path).unwrap();
        assert_eq!(meta.duration, 4.0);
        assert_eq!(meta.resolution, "1920x1080");
        assert!((meta.size_mb - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unopenable_video_yields_none() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.mkv");
        std::fs::write(&path, b"not a video").unwrap();

        let backend = FakeBackend::new();
        assert!(extract_metadata(&backend, &path).is_none());
    }

    #[test]
    fn missing_file_size_is_zero() {
        let backend = FakeBackend::new();
        let path = Path::new("/does/not/exist.mp4");
        backend.add(path, FakeVideo::new(10, 0.0, 640, 480));

        let meta = extract_metadata(&backend, path).unwrap();
        assert_eq!(meta.size_mb, 0.0);
        assert_eq!(meta.duration, 0.0);
        assert_eq!(meta.resolution, "640x480");
    }
}
