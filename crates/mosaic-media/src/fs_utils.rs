//! Filesystem utilities: atomic publishes and cross-device moves.

use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};

/// Write `bytes` to `dest` atomically: the content lands in a sibling
/// temporary file first and is renamed into place, so no partial file
/// is ever visible at `dest`.
pub async fn write_atomic(dest: impl AsRef<Path>, bytes: &[u8]) -> MediaResult<()> {
    let dest = dest.as_ref();
    if let Some(parent) = dest.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let tmp = sibling_tmp_path(dest);
    fs::write(&tmp, bytes).await?;

    if let Err(e) = fs::rename(&tmp, dest).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(MediaError::from(e));
    }
    Ok(())
}

/// A unique temporary path next to `dest`, on the same filesystem.
pub fn sibling_tmp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp_name = format!(".{name}.tmp-{}", Uuid::new_v4().simple());
    match dest.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// A fast rename is attempted first; EXDEV falls back to copying into
/// a sibling temp file and renaming, keeping the publish atomic on the
/// destination filesystem.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename detected, falling back to copy+rename: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Check if an IO error is EXDEV (cross-device link).
fn is_cross_device_error(e: &std::io::Error) -> bool {
    // EXDEV is error code 18 on Linux/macOS
    e.raw_os_error() == Some(18)
}

/// Copy file to destination (via temp file) then delete source.
async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let tmp_dst = sibling_tmp_path(dst);

    fs::copy(src, &tmp_dst).await?;

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(MediaError::from(e));
    }

    // Best effort; the artifact is already published.
    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(
            "Failed to remove source after cross-device move: {}: {}",
            src.display(),
            e
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_creates_parents() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested").join("out.bin");

        write_atomic(&dest, b"payload").await.unwrap();

        assert_eq!(fs::read(&dest).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");

        write_atomic(&dest, b"payload").await.unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["out.bin".to_string()]);
    }

    #[tokio::test]
    async fn test_move_file_same_filesystem() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.txt");
        let dst = dir.path().join("dest.txt");

        fs::write(&src, b"test content").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists(), "Source file should be removed");
        assert!(dst.exists(), "Destination file should exist");
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "test content");
    }

    #[tokio::test]
    async fn test_move_file_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.txt");
        let dst = dir.path().join("dest.txt");

        fs::write(&src, b"new content").await.unwrap();
        fs::write(&dst, b"old content").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "new content");
    }

    #[test]
    fn test_is_cross_device_error() {
        let exdev_error = std::io::Error::from_raw_os_error(18);
        assert!(is_cross_device_error(&exdev_error));

        let not_found = std::io::Error::from_raw_os_error(2);
        assert!(!is_cross_device_error(&not_found));
    }

    #[test]
    fn test_sibling_tmp_path_stays_in_parent() {
        let tmp = sibling_tmp_path(Path::new("/out/dir/mosaic.png"));
        assert_eq!(tmp.parent(), Some(Path::new("/out/dir")));
        assert!(tmp.file_name().unwrap().to_string_lossy().contains("mosaic.png"));
    }
}
