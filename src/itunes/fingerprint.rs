//! Library-file fingerprinting — §4.I. CRC32 is chosen over a
//! cryptographic hash because the plist can be large (up to ~200MB) and
//! CRC32 is roughly an order of magnitude faster; the fingerprint is used
//! only to detect external modification, never for integrity.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::store::models::ITunesLibraryFingerprint;

use super::error::ITunesError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LibraryFingerprint {
    pub size: u64,
    pub mod_time: i64,
    pub crc32: u32,
}

pub fn compute_fingerprint(path: &Path) -> Result<LibraryFingerprint, ITunesError> {
    let metadata = std::fs::metadata(path).map_err(|e| ITunesError::Unreadable(path.to_path_buf(), e))?;
    let mod_time = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let mut file = File::open(path).map_err(|e| ITunesError::Unreadable(path.to_path_buf(), e))?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| ITunesError::Unreadable(path.to_path_buf(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(LibraryFingerprint { size: metadata.len(), mod_time, crc32: hasher.finalize() })
}

/// mod_time is not compared — filesystem clock drift across bind mounts
/// and network shares is tolerated; size+crc32 is the integrity signal.
pub fn matches(a: &LibraryFingerprint, b: &LibraryFingerprint) -> bool {
    a.size == b.size && a.crc32 == b.crc32
}

pub fn to_stored(path: &str, fp: LibraryFingerprint, updated_at: i64) -> ITunesLibraryFingerprint {
    ITunesLibraryFingerprint { path: path.to_string(), size: fp.size, mod_time: fp.mod_time, crc32: fp.crc32, updated_at }
}

pub fn from_stored(stored: &ITunesLibraryFingerprint) -> LibraryFingerprint {
    LibraryFingerprint { size: stored.size, mod_time: stored.mod_time, crc32: stored.crc32 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn identical_content_produces_matching_fingerprints() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Library.xml");
        std::fs::write(&path, b"<plist>same</plist>").unwrap();

        let a = compute_fingerprint(&path).unwrap();
        let b = compute_fingerprint(&path).unwrap();
        assert!(matches(&a, &b));
    }

    #[test]
    fn modified_content_does_not_match() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Library.xml");
        std::fs::write(&path, b"<plist>original</plist>").unwrap();
        let before = compute_fingerprint(&path).unwrap();

        std::fs::write(&path, b"<plist>changed, and longer</plist>").unwrap();
        let after = compute_fingerprint(&path).unwrap();

        assert!(!matches(&before, &after));
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = compute_fingerprint(Path::new("/nonexistent/Library.xml"));
        assert!(result.is_err());
    }
}
