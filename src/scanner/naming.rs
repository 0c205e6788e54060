// Output naming - sanitized segments, organized directories, collision-safe filenames
use std::path::{Component, Path, PathBuf, Prefix};

use super::fingerprint::path_fingerprint;

/// Characters that are illegal in file names on at least one common filesystem
const ILLEGAL_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Placeholder used when sanitizing leaves nothing behind
const UNNAMED: &str = "unnamed";

/// Segment used when a source file has no usable parent directory
const ROOT_SEGMENT: &str = "root";

/// Make a single path segment safe to use as a file or directory name.
///
/// Only the characters in [`ILLEGAL_CHARS`] are replaced; everything else,
/// including non-Latin scripts, is kept as-is. Leading and trailing spaces and
/// dots are trimmed. Never returns an empty string.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) { '_' } else { c })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        UNNAMED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sanitized directory segments mirroring the directory that contains `source`.
///
/// A drive letter is folded lower-cased into the first segment (`C:\a\b` ->
/// `c/a/b`). Root, `.` and `..` components are dropped.
pub fn organized_segments(source: &Path) -> Vec<String> {
    let Some(parent) = source.parent() else {
        return Vec::new();
    };

    let mut segments = Vec::new();
    for component in parent.components() {
        match component {
            Component::Prefix(prefix) => match prefix.kind() {
                Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
                    segments.push((letter as char).to_ascii_lowercase().to_string());
                }
                Prefix::UNC(server, share) | Prefix::VerbatimUNC(server, share) => {
                    segments.push(server.to_string_lossy().to_lowercase());
                    segments.push(share.to_string_lossy().into_owned());
                }
                _ => segments.push(prefix.as_os_str().to_string_lossy().to_lowercase()),
            },
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            Component::RootDir | Component::CurDir | Component::ParentDir => {}
        }
    }

    segments
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| sanitize_filename(s))
        .collect()
}

/// Output directory for artifacts generated from `source`, created if absent.
pub fn organized_dir(source: &Path, output_root: &Path) -> std::io::Result<PathBuf> {
    let segments = organized_segments(source);

    let mut dir = output_root.to_path_buf();
    if segments.is_empty() {
        dir.push(ROOT_SEGMENT);
    } else {
        dir.extend(segments);
    }

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// `{sanitized base}_{fingerprint of source path}{extension}`
///
/// The same source path always yields the same name, so re-processing a file
/// overwrites its previous artifacts instead of accumulating new ones.
pub fn unique_filename(source: &Path, base_name: &str, extension: &str) -> String {
    format!(
        "{}_{}{}",
        sanitize_filename(base_name),
        path_fingerprint(source),
        extension
    )
}

/// Path of `path` relative to `root`, with `/` separators, as stored in the catalog.
pub fn relative_to(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
