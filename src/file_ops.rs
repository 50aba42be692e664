//! Filesystem primitives — §4.F.
//!
//! Pure helpers with no knowledge of books, templates, or the store: hash,
//! safe copy with verify, reflink/hardlink/copy, and the `auto` fallback
//! chain the organiser drives.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("io error on {path:?}: {source}")]
    Io { path: std::path::PathBuf, source: io::Error },

    #[error("checksum mismatch after copy: {src:?} -> {dst:?}")]
    ChecksumMismatch { src: std::path::PathBuf, dst: std::path::PathBuf },

    #[error("reflink not supported on this filesystem")]
    ReflinkUnsupported,
}

fn io_err(path: &Path, source: io::Error) -> FileOpError {
    FileOpError::Io { path: path.to_path_buf(), source }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStrategy {
    Auto,
    Reflink,
    Hardlink,
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMethod {
    Reflink,
    Hardlink,
    Copy,
}

/// Streaming SHA-256 of the file at `path`. Returns an error for a missing
/// or unreadable file.
pub fn compute_file_hash(path: &Path) -> Result<String, FileOpError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn ensure_parent_dir(path: &Path) -> Result<(), FileOpError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            let mut perms = fs::metadata(parent).map_err(|e| io_err(parent, e))?.permissions();
            std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
            fs::set_permissions(parent, perms).map_err(|e| io_err(parent, e))?;
        }
    }
    Ok(())
}

/// Copies `src` to `dst` via a same-directory temp file and atomic rename,
/// fsyncing before rename, then verifies the destination hash matches the
/// source hash. Deletes `dst` and returns an error on mismatch.
pub fn safe_copy_with_verify(src: &Path, dst: &Path) -> Result<(), FileOpError> {
    ensure_parent_dir(dst)?;
    let src_hash = compute_file_hash(src)?;

    let dir = dst.parent().unwrap_or(Path::new("."));
    let tmp_path = dir.join(format!(".{}.tmp", uuid_like()));

    {
        let mut reader = File::open(src).map_err(|e| io_err(src, e))?;
        let mut writer = File::create(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;
        io::copy(&mut reader, &mut writer).map_err(|e| io_err(&tmp_path, e))?;
        writer.flush().map_err(|e| io_err(&tmp_path, e))?;
        writer.sync_all().map_err(|e| io_err(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, dst).map_err(|e| io_err(dst, e))?;

    let dst_hash = compute_file_hash(dst)?;
    if dst_hash != src_hash {
        let _ = fs::remove_file(dst);
        return Err(FileOpError::ChecksumMismatch { src: src.to_path_buf(), dst: dst.to_path_buf() });
    }
    Ok(())
}

/// Copy-on-write clone via the Linux `FICLONE` ioctl. Returns
/// [`FileOpError::ReflinkUnsupported`] if the underlying filesystem (or
/// platform) doesn't support it.
pub fn reflink(src: &Path, dst: &Path) -> Result<(), FileOpError> {
    ensure_parent_dir(dst)?;
    #[cfg(target_os = "linux")]
    {
        let src_file = File::open(src).map_err(|e| io_err(src, e))?;
        let dst_file = File::create(dst).map_err(|e| io_err(dst, e))?;
        // FICLONE = _IOW(0x94, 9, int), see linux/fs.h.
        const FICLONE: libc::c_ulong = 0x4004_94_09;
        let ret = unsafe { libc::ioctl(dst_file.as_raw_fd(), FICLONE, src_file.as_raw_fd()) };
        if ret == 0 {
            return Ok(());
        }
        let _ = fs::remove_file(dst);
        Err(FileOpError::ReflinkUnsupported)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (src, dst);
        Err(FileOpError::ReflinkUnsupported)
    }
}

/// Wraps the OS hard-link call.
pub fn hardlink(src: &Path, dst: &Path) -> Result<(), FileOpError> {
    ensure_parent_dir(dst)?;
    fs::hard_link(src, dst).map_err(|e| io_err(dst, e))
}

/// Tries `strategy`; with `Auto`, tries reflink, then hardlink, then copy,
/// in order, returning the method that actually succeeded.
pub fn link_or_copy(src: &Path, dst: &Path, strategy: LinkStrategy) -> Result<LinkMethod, FileOpError> {
    match strategy {
        LinkStrategy::Reflink => reflink(src, dst).map(|_| LinkMethod::Reflink),
        LinkStrategy::Hardlink => hardlink(src, dst).map(|_| LinkMethod::Hardlink),
        LinkStrategy::Copy => safe_copy_with_verify(src, dst).map(|_| LinkMethod::Copy),
        LinkStrategy::Auto => {
            if reflink(src, dst).is_ok() {
                return Ok(LinkMethod::Reflink);
            }
            if hardlink(src, dst).is_ok() {
                return Ok(LinkMethod::Hardlink);
            }
            safe_copy_with_verify(src, dst).map(|_| LinkMethod::Copy)
        }
    }
}

fn uuid_like() -> String {
    ulid::Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn hash_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello world").unwrap();
        let h1 = compute_file_hash(&path).unwrap();
        let h2 = compute_file_hash(&path).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn hash_missing_file_errors() {
        let result = compute_file_hash(Path::new("/nonexistent/file.m4b"));
        assert!(result.is_err());
    }

    #[test]
    fn safe_copy_produces_identical_content() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.m4b");
        let dst = dir.path().join("nested").join("dst.m4b");
        fs::write(&src, b"audiobook bytes").unwrap();

        safe_copy_with_verify(&src, &dst).unwrap();

        assert_eq!(fs::read(&src).unwrap(), fs::read(&dst).unwrap());
    }

    #[test]
    fn hardlink_shares_inode() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.m4b");
        let dst = dir.path().join("dst.m4b");
        fs::write(&src, b"data").unwrap();

        hardlink(&src, &dst).unwrap();

        use std::os::unix::fs::MetadataExt;
        assert_eq!(fs::metadata(&src).unwrap().ino(), fs::metadata(&dst).unwrap().ino());
    }

    #[test]
    fn link_or_copy_auto_falls_back_to_copy_across_filesystems() {
        // /tmp and a tempdir are typically the same fs, so this mostly
        // exercises that *some* method succeeds and content matches.
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.m4b");
        let dst = dir.path().join("dst.m4b");
        fs::write(&src, b"payload").unwrap();

        let method = link_or_copy(&src, &dst, LinkStrategy::Auto).unwrap();
        assert!(matches!(method, LinkMethod::Reflink | LinkMethod::Hardlink | LinkMethod::Copy));
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }
}
