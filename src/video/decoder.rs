// Frame-accurate video decoder using ffmpeg-next
use std::path::Path;

use image::RgbImage;
use tracing::debug;

use crate::error::{IndexError, Result};

extern crate ffmpeg_next as ffmpeg;

/// Packets always allowed while looking for one target frame
const MIN_PACKET_BUDGET: usize = 500;

/// Extra seconds of packets on top of the frame count, covering decoder
/// reordering delay and frame counts estimated from duration
const PACKET_BUDGET_SLACK_SECS: f64 = 2.0;

/// Something that can open video files for frame sampling.
///
/// The indexer only ever talks to this trait, so the scanning logic can be
/// exercised without real media files.
pub trait VideoBackend {
    type Stream: VideoStream;

    /// Open a video for decoding. Errors mean the file is not processable.
    fn open(&self, path: &Path) -> Result<Self::Stream>;
}

/// An opened video. Dropping it releases every decoder resource.
pub trait VideoStream {
    /// Total number of frames (0 when unknown)
    fn frame_count(&self) -> u64;

    /// Average frame rate (0.0 when unknown)
    fn fps(&self) -> f64;

    /// Frame dimensions as reported by the stream
    fn dimensions(&self) -> (u32, u32);

    /// Seek to a frame index and decode it as RGB.
    /// Returns None if the frame could not be decoded.
    fn read_frame(&mut self, index: u64) -> Option<RgbImage>;
}

/// ffmpeg-backed implementation of [`VideoBackend`]
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl VideoBackend for FfmpegBackend {
    type Stream = VideoDecoder;

    fn open(&self, path: &Path) -> Result<VideoDecoder> {
        VideoDecoder::open(path)
    }
}

/// Video decoder for extracting frames at specific frame indices
pub struct VideoDecoder {
    format_ctx: ffmpeg::format::context::Input,
    video_stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    /// Stream time base as seconds per tick
    time_base: f64,
    /// Stream start time in stream ticks
    start_time: i64,
    frame_count: u64,
    fps: f64,
    width: u32,
    height: u32,
    packet_budget: usize,
}

impl VideoDecoder {
    /// Open a video file for decoding
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg::init()?;

        let format_ctx = ffmpeg::format::input(path)?;

        let stream = format_ctx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| IndexError::Decode("no video stream found".into()))?;

        let video_stream_index = stream.index();

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context_decoder.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();

        let time_base = f64::from(stream.time_base());
        let start_time = if stream.start_time() == ffmpeg::ffi::AV_NOPTS_VALUE {
            0
        } else {
            stream.start_time()
        };

        let fps = pick_fps(f64::from(stream.avg_frame_rate()), f64::from(stream.rate()));
        let duration = duration_seconds(stream.duration(), time_base, format_ctx.duration());
        let frame_count = estimate_frame_count(stream.frames(), duration, fps);

        debug!(
            path = %path.display(),
            frame_count,
            fps,
            width,
            height,
            "opened video"
        );

        Ok(Self {
            format_ctx,
            video_stream_index,
            decoder,
            time_base,
            start_time,
            frame_count,
            fps,
            width,
            height,
            packet_budget: packet_budget(frame_count, fps),
        })
    }

    /// Decode frames until one at or past `target` (stream ticks) appears
    fn decode_until(&mut self, target: Option<i64>) -> Option<RgbImage> {
        let mut decoded_frame = ffmpeg::frame::Video::empty();
        let mut packet_count = 0;

        for (stream, packet) in self.format_ctx.packets() {
            if stream.index() != self.video_stream_index {
                continue;
            }

            packet_count += 1;
            if packet_count > self.packet_budget {
                debug!("gave up after {} packets", self.packet_budget);
                return None;
            }

            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            while self.decoder.receive_frame(&mut decoded_frame).is_ok() {
                if reached(&decoded_frame, target) {
                    return to_rgb(&decoded_frame);
                }
            }
        }

        // Drain whatever the decoder still buffers at end of stream
        if self.decoder.send_eof().is_ok() {
            while self.decoder.receive_frame(&mut decoded_frame).is_ok() {
                if reached(&decoded_frame, target) {
                    return to_rgb(&decoded_frame);
                }
            }
        }

        None
    }
}

impl VideoStream for VideoDecoder {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self, index: u64) -> Option<RgbImage> {
        let target = frame_target_ticks(index, self.fps, self.time_base, self.start_time);

        // Seek to the keyframe at or before the target
        let seek_to = target
            .map(|ts| seek_position(ts, self.time_base))
            .unwrap_or(0);
        if self.format_ctx.seek(seek_to, ..seek_to).is_err() {
            // Try seeking from the start if the backward seek fails
            let _ = self.format_ctx.seek(0, ..seek_to);
        }

        // Flush decoder buffers after seek
        self.decoder.flush();

        self.decode_until(target)
    }
}

/// Whether a decoded frame is at or past the target timestamp
fn reached(frame: &ffmpeg::frame::Video, target: Option<i64>) -> bool {
    reached_target(frame.timestamp().or_else(|| frame.pts()), target)
}

/// Frames without a timestamp, or searches without a target, stop at the
/// first decoded frame
fn reached_target(ts: Option<i64>, target: Option<i64>) -> bool {
    match (target, ts) {
        (Some(target), Some(ts)) => ts >= target,
        _ => true,
    }
}

fn usable_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Average frame rate, then the stream's base rate, then 0.0 for unknown
fn pick_fps(avg_frame_rate: f64, base_rate: f64) -> f64 {
    if usable_rate(avg_frame_rate) {
        avg_frame_rate
    } else if usable_rate(base_rate) {
        base_rate
    } else {
        0.0
    }
}

/// Duration in seconds, from the stream first and the container second.
/// `container_duration` is in AV_TIME_BASE units; 0.0 means unknown.
fn duration_seconds(stream_duration: i64, time_base: f64, container_duration: i64) -> f64 {
    if stream_duration > 0 && usable_rate(time_base) {
        stream_duration as f64 * time_base
    } else if container_duration > 0 {
        container_duration as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
    } else {
        0.0
    }
}

/// Frame count recorded by the container, or floor(duration * fps)
fn estimate_frame_count(stream_frames: i64, duration: f64, fps: f64) -> u64 {
    if stream_frames > 0 {
        return stream_frames as u64;
    }
    let estimate = (duration * fps).floor();
    if estimate.is_finite() && estimate > 0.0 {
        estimate as u64
    } else {
        0
    }
}

/// Presentation timestamp, in stream ticks, from which frame `index` is
/// accepted. Half a frame of slack absorbs timestamp rounding in the
/// container. None when the rate or time base is unknown.
fn frame_target_ticks(index: u64, fps: f64, time_base: f64, start_time: i64) -> Option<i64> {
    if !usable_rate(fps) || !usable_rate(time_base) {
        return None;
    }
    let seconds = (index as f64 - 0.5).max(0.0) / fps;
    Some(start_time + (seconds / time_base) as i64)
}

/// Stream ticks converted to the AV_TIME_BASE units used for container seeks
fn seek_position(ticks: i64, time_base: f64) -> i64 {
    (ticks as f64 * time_base * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64
}

/// Packets that may be read after a seek before giving up on a frame.
/// Decoding forward from any keyframe never needs more packets than the
/// stream has frames, so long keyframe intervals still reach their target.
fn packet_budget(frame_count: u64, fps: f64) -> usize {
    let slack = if usable_rate(fps) {
        (fps * PACKET_BUDGET_SLACK_SECS).ceil() as usize
    } else {
        0
    };
    (frame_count as usize)
        .saturating_add(slack)
        .max(MIN_PACKET_BUDGET)
}

/// Convert a decoded frame to a packed RGB image at its native size
fn to_rgb(frame: &ffmpeg::frame::Video) -> Option<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    if width == 0 || height == 0 {
        return None;
    }

    let mut scaler = ffmpeg::software::scaling::Context::get(
        frame.format(),
        width,
        height,
        ffmpeg::format::Pixel::RGB24,
        width,
        height,
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .ok()?;

    let mut rgb_frame = ffmpeg::frame::Video::empty();
    scaler.run(frame, &mut rgb_frame).ok()?;

    // Copy data accounting for stride
    let data = rgb_frame.data(0);
    let stride = rgb_frame.stride(0);
    let row_len = width as usize * 3;
    let mut rgb_data = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let row_start = y * stride;
        rgb_data.extend_from_slice(&data[row_start..row_start + row_len]);
    }

    RgbImage::from_raw(width, height, rgb_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 25 fps in a 1/12800 time base: one frame every 512 ticks
    const TIME_BASE: f64 = 1.0 / 12800.0;
    const TICKS_PER_FRAME: i64 = 512;

    #[test]
    fn fps_falls_back_to_base_rate_then_zero() {
        assert_eq!(pick_fps(25.0, 50.0), 25.0);
        assert_eq!(pick_fps(0.0, 30.0), 30.0);
        assert_eq!(pick_fps(f64::NAN, 30.0), 30.0);
        assert_eq!(pick_fps(-1.0, 24.0), 24.0);
        assert_eq!(pick_fps(f64::NAN, f64::INFINITY), 0.0);
        assert_eq!(pick_fps(0.0, -5.0), 0.0);
    }

    #[test]
    fn duration_prefers_stream_over_container() {
        assert!((duration_seconds(51200, TIME_BASE, 9_000_000) - 4.0).abs() < 1e-9);
        assert_eq!(duration_seconds(0, TIME_BASE, 4_000_000), 4.0);
        assert_eq!(duration_seconds(-1, TIME_BASE, 2_500_000), 2.5);
        assert_eq!(duration_seconds(0, TIME_BASE, 0), 0.0);
    }

    #[test]
    fn frame_count_is_estimated_when_container_has_none() {
        assert_eq!(estimate_frame_count(100, 9.0, 30.0), 100);
        assert_eq!(estimate_frame_count(0, 4.0, 25.0), 100);
        assert_eq!(estimate_frame_count(0, 4.03, 25.0), 100);
        assert_eq!(estimate_frame_count(0, 0.0, 25.0), 0);
        assert_eq!(estimate_frame_count(0, 4.0, 0.0), 0);
        assert_eq!(estimate_frame_count(0, 4.0, f64::NAN), 0);
        assert_eq!(estimate_frame_count(0, 4.0, -25.0), 0);
    }

    #[test]
    fn targets_land_between_previous_and_requested_frame() {
        for index in [20u64, 40, 60, 80] {
            let target = frame_target_ticks(index, 25.0, TIME_BASE, 0).unwrap();
            let pts = index as i64 * TICKS_PER_FRAME;

            assert!(reached_target(Some(pts), Some(target)), "frame {index} accepted");
            assert!(!reached_target(Some(pts - TICKS_PER_FRAME), Some(target)), "frame {} rejected", index - 1);
        }
    }

    #[test]
    fn first_frame_targets_stream_start() {
        assert_eq!(frame_target_ticks(0, 25.0, TIME_BASE, 0), Some(0));
        assert_eq!(frame_target_ticks(0, 25.0, TIME_BASE, 1000), Some(1000));
    }

    #[test]
    fn targets_are_offset_by_start_time() {
        let start = 3600;
        let target = frame_target_ticks(40, 25.0, TIME_BASE, start).unwrap();
        let pts = start + 40 * TICKS_PER_FRAME;

        assert!(reached_target(Some(pts), Some(target)));
        assert!(!reached_target(Some(pts - TICKS_PER_FRAME), Some(target)));
    }

    #[test]
    fn unknown_rates_give_no_target() {
        assert_eq!(frame_target_ticks(20, 0.0, TIME_BASE, 0), None);
        assert_eq!(frame_target_ticks(20, f64::NAN, TIME_BASE, 0), None);
        assert_eq!(frame_target_ticks(20, -25.0, TIME_BASE, 0), None);
        assert_eq!(frame_target_ticks(20, 25.0, 0.0, 0), None);
    }

    #[test]
    fn missing_timestamps_accept_first_frame() {
        assert!(reached_target(None, Some(10_000)));
        assert!(reached_target(Some(0), None));
        assert!(reached_target(Some(10_000), Some(10_000)));
    }

    #[test]
    fn seek_position_converts_to_microseconds() {
        let time_base = 1.0 / 1024.0;
        assert_eq!(seek_position(1024, time_base), 1_000_000);
        assert_eq!(seek_position(512, time_base), 500_000);
        assert_eq!(seek_position(0, TIME_BASE), 0);
    }

    #[test]
    fn packet_budget_covers_whole_stream() {
        assert_eq!(packet_budget(100, 25.0), MIN_PACKET_BUDGET);
        assert_eq!(packet_budget(0, 0.0), MIN_PACKET_BUDGET);
        // A ten-minute screen recording with a single keyframe
        assert_eq!(packet_budget(18_000, 30.0), 18_060);
    }
}
