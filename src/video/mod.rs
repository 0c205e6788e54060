// Video processing module
// Contains: frame decoding, metadata extraction, contact sheet generation

pub mod contact_sheet;
mod decoder;
pub mod metadata;

#[cfg(test)]
pub mod testing;

pub use contact_sheet::{build_contact_sheet, remove_artifacts, ContactSheet};
pub use decoder::{FfmpegBackend, VideoBackend, VideoStream};
pub use metadata::{extract_metadata, VideoMetadata};
