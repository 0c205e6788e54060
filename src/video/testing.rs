// Synthetic video backend for tests
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::{Rgb, RgbImage};

use super::decoder::{VideoBackend, VideoStream};
use crate::error::{IndexError, Result};

/// Description of a fake video served by [`FakeBackend`]
#[derive(Debug, Clone)]
pub struct FakeVideo {
    pub frame_count: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Frame indices whose decode fails
    pub failing_frames: HashSet<u64>,
}

impl FakeVideo {
    pub fn new(frame_count: u64, fps: f64, width: u32, height: u32) -> Self {
        Self {
            frame_count,
            fps,
            width,
            height,
            failing_frames: HashSet::new(),
        }
    }

    pub fn failing_at(mut self, index: u64) -> Self {
        self.failing_frames.insert(index);
        self
    }
}

/// Size of every decoded fake frame, a whole number of JPEG MCUs
pub const FRAME_WIDTH: u32 = 32;
pub const FRAME_HEIGHT: u32 = 16;

/// Solid colour used for a given frame index
pub fn frame_color(index: u64) -> Rgb<u8> {
    let v = (index * 2).min(255) as u8;
    Rgb([v, 255 - v, 128])
}

/// Backend serving solid-colour frames for registered paths.
/// Unregistered paths fail to open like a corrupt file would.
#[derive(Default)]
pub struct FakeBackend {
    videos: RefCell<HashMap<PathBuf, FakeVideo>>,
    open_streams: Rc<Cell<i64>>,
    reads: Rc<RefCell<Vec<(PathBuf, u64)>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, path: &Path, video: FakeVideo) {
        self.videos.borrow_mut().insert(path.to_path_buf(), video);
    }

    /// Streams opened and not yet dropped
    pub fn open_streams(&self) -> i64 {
        self.open_streams.get()
    }

    /// Every (path, frame index) requested so far
    pub fn reads(&self) -> Vec<(PathBuf, u64)> {
        self.reads.borrow().clone()
    }
}

impl VideoBackend for FakeBackend {
    type Stream = FakeStream;

    fn open(&self, path: &Path) -> Result<FakeStream> {
        let video = self
            .videos
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| IndexError::Decode(format!("unreadable: {}", path.display())))?;

        self.open_streams.set(self.open_streams.get() + 1);
        Ok(FakeStream {
            path: path.to_path_buf(),
            video,
            open_streams: Rc::clone(&self.open_streams),
            reads: Rc::clone(&self.reads),
        })
    }
}

pub struct FakeStream {
    path: PathBuf,
    video: FakeVideo,
    open_streams: Rc<Cell<i64>>,
    reads: Rc<RefCell<Vec<(PathBuf, u64)>>>,
}

impl VideoStream for FakeStream {
    fn frame_count(&self) -> u64 {
        self.video.frame_count
    }

    fn fps(&self) -> f64 {
        self.video.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.video.width, self.video.height)
    }

    fn read_frame(&mut self, index: u64) -> Option<RgbImage> {
        self.reads.borrow_mut().push((self.path.clone(), index));
        if index >= self.video.frame_count || self.video.failing_frames.contains(&index) {
            return None;
        }
        Some(RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, frame_color(index)))
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.open_streams.set(self.open_streams.get() - 1);
    }
}
