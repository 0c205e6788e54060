// Contact sheet generation - 4 sampled screenshots composed into a 2x2 grid
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use tracing::{debug, warn};

use super::decoder::{VideoBackend, VideoStream};
use crate::error::Result;
use crate::scanner::naming::{organized_dir, unique_filename};

/// Relative positions (fraction of total frames) of the sampled frames
pub const SAMPLE_OFFSETS: [f64; 4] = [0.2, 0.4, 0.6, 0.8];

/// JPEG quality of individual screenshots
pub const SCREENSHOT_QUALITY: u8 = 95;

/// JPEG quality of the composed sheet
pub const CONTACT_SHEET_QUALITY: u8 = 85;

const EXTENSION: &str = ".jpg";

/// Files produced for one video
#[derive(Debug, Clone, PartialEq)]
pub struct ContactSheet {
    pub sheet_path: PathBuf,
    /// Screenshots in sampling order
    pub screenshots: Vec<PathBuf>,
}

impl ContactSheet {
    /// Every file owned by this sheet
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.sheet_path.as_path()).chain(self.screenshots.iter().map(PathBuf::as_path))
    }
}

/// Frame indices sampled from a video with `frame_count` frames
pub fn sample_indices(frame_count: u64) -> [u64; 4] {
    SAMPLE_OFFSETS.map(|offset| (frame_count as f64 * offset).floor() as u64)
}

/// Build the screenshots and contact sheet for a video.
///
/// All-or-nothing: on any failure every file written for this video is
/// removed again and None is returned.
pub fn build_contact_sheet<B: VideoBackend>(
    backend: &B,
    video_path: &Path,
    output_root: &Path,
) -> Option<ContactSheet> {
    let mut stream = match backend.open(video_path) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("cannot open {}: {}", video_path.display(), e);
            return None;
        }
    };

    let frame_count = stream.frame_count();
    if frame_count < SAMPLE_OFFSETS.len() as u64 {
        debug!("{} has only {} frames", video_path.display(), frame_count);
        return None;
    }

    let output_dir = match organized_dir(video_path, output_root) {
        Ok(dir) => dir,
        Err(e) => {
            warn!("cannot create output directory for {}: {}", video_path.display(), e);
            return None;
        }
    };

    let stem = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut screenshots = Vec::with_capacity(SAMPLE_OFFSETS.len());
    let mut frames = Vec::with_capacity(SAMPLE_OFFSETS.len());

    for (i, index) in sample_indices(frame_count).into_iter().enumerate() {
        let Some(frame) = stream.read_frame(index) else {
            warn!("failed to decode frame {} of {}", index, video_path.display());
            continue;
        };

        let filename = unique_filename(video_path, &format!("{}_ss_{}", stem, i + 1), EXTENSION);
        let path = output_dir.join(filename);
        match save_jpeg(&frame, &path, SCREENSHOT_QUALITY) {
            Ok(()) => {
                screenshots.push(path);
                frames.push(frame);
            }
            Err(e) => {
                warn!("failed to write {}: {}", path.display(), e);
                remove_artifacts([path.as_path()]);
            }
        }
    }

    // Decoder is not needed for compositing
    drop(stream);

    if frames.len() < SAMPLE_OFFSETS.len() {
        warn!(
            "only {} of {} frames extracted from {}, discarding",
            frames.len(),
            SAMPLE_OFFSETS.len(),
            video_path.display()
        );
        remove_artifacts(screenshots.iter().map(PathBuf::as_path));
        return None;
    }

    let grid = compose_grid(&frames);
    let sheet_path = output_dir.join(unique_filename(video_path, &format!("{}_contact", stem), EXTENSION));

    if let Err(e) = save_jpeg(&grid, &sheet_path, CONTACT_SHEET_QUALITY) {
        warn!("failed to write contact sheet {}: {}", sheet_path.display(), e);
        remove_artifacts(screenshots.iter().map(PathBuf::as_path).chain([sheet_path.as_path()]));
        return None;
    }

    Some(ContactSheet {
        sheet_path,
        screenshots,
    })
}

/// Compose four frames into a grid twice as wide and tall as the first one.
/// Order: top-left, top-right, bottom-left, bottom-right.
pub fn compose_grid(frames: &[RgbImage]) -> RgbImage {
    let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
    let mut grid = RgbImage::new(width * 2, height * 2);

    let origins = [(0, 0), (width, 0), (0, height), (width, height)];
    for (frame, (x, y)) in frames.iter().zip(origins) {
        imageops::replace(&mut grid, frame, i64::from(x), i64::from(y));
    }

    grid
}

fn save_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, quality).encode_image(image)?;
    writer.flush()?;
    Ok(())
}

/// Delete generated files, treating already-missing files as deleted.
/// Returns the files that could not be removed.
pub fn remove_artifacts<'a, I>(paths: I) -> Vec<(PathBuf, std::io::Error)>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut failures = Vec::new();
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("could not remove {}: {}", path.display(), e);
                failures.push((path.to_path_buf(), e));
            }
        }
    }
    failures
}
