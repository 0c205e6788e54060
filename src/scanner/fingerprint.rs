// Source-path fingerprinting for output file naming
use std::path::Path;
use md5::{Md5, Digest};

/// Number of hex characters kept from the digest
const FINGERPRINT_LEN: usize = 8;

/// Short fingerprint of a source path.
/// Uses: MD5(UTF-8 path string), first 8 hex characters.
/// Only the path is hashed, never the file contents, so a file rewritten in
/// place keeps producing the same output names.
pub fn path_fingerprint(path: &Path) -> String {
    let path_str = path.to_string_lossy();

    let mut hasher = Md5::new();
    hasher.update(path_str.as_bytes());

    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_eight_lowercase_hex_chars() {
        let fp = path_fingerprint(Path::new("/videos/trip/clip.mp4"));
        assert_eq!(fp.len(), 8);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprint_matches_md5_prefix() {
        // md5("abc") = 900150983cd24fb0d6963f7d28e17f72
        assert_eq!(path_fingerprint(Path::new("abc")), "90015098");
    }

    #[test]
    fn fingerprint_depends_only_on_path() {
        let a = path_fingerprint(Path::new("/videos/a/clip.mp4"));
        let b = path_fingerprint(Path::new("/videos/b/clip.mp4"));
        assert_eq!(a, path_fingerprint(Path::new("/videos/a/clip.mp4")));
        assert_ne!(a, b);
    }
}
