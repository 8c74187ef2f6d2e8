//! Input discovery: expand a path into ordered work items.

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use mosaic_media::{CancelToken, MediaError, PREVIEW_MARKER};

use crate::error::{PipelineError, PipelineResult};
use crate::playlist::read_playlist;

/// Recognized video file extensions, lowercase.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "m4v", "webm", "ts"];

/// Directory segment collecting default outputs: `<parent>/0th/<width>/`.
pub const OUTPUT_DIR_MARKER: &str = "0th";

/// One unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub source: PathBuf,
    pub output_dir: PathBuf,
}

impl WorkItem {
    /// Display key used for progress reporting and cancellation
    /// addressing.
    pub fn filename(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// Discovery result.
#[derive(Debug, Clone)]
pub struct Discovered {
    pub items: Vec<WorkItem>,
    /// Set when the input was a single file; the aggregate summary is
    /// disabled in that case.
    pub single_file: bool,
}

/// Whether a path looks like a video source by extension.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|e| {
            let lower = e.to_string_lossy().to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Whether the file name carries the preview marker token.
fn is_preview_artifact(path: &Path) -> bool {
    path.file_stem()
        .map(|s| s.to_string_lossy().contains(PREVIEW_MARKER))
        .unwrap_or(false)
}

fn is_m3u8(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case("m3u8"))
        .unwrap_or(false)
}

/// Default output directory for one source file.
fn default_output_dir(source: &Path, root: &Path, width: u32, save_at_root: bool) -> PathBuf {
    let base = if save_at_root {
        root.to_path_buf()
    } else {
        source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf())
    };
    base.join(OUTPUT_DIR_MARKER).join(width.to_string())
}

/// Expand `input` into an ordered sequence of work items.
///
/// - A directory is walked depth-first in sorted order; regular files
///   with a recognized extension become items, preview artifacts are
///   skipped.
/// - An `.m3u8` playlist contributes one item per listed path, routed
///   to `<playlist-parent>/Playlist/<playlist-stem>/`.
/// - A single video file becomes a single item with the summary
///   disabled.
///
/// Output directories are created as the walk goes (idempotent), and
/// `on_progress` receives the running item count.
pub async fn discover(
    input: &Path,
    width: u32,
    save_at_root: bool,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(u64),
) -> PipelineResult<Discovered> {
    if !input.exists() {
        return Err(MediaError::InputNotFound(input.to_path_buf()).into());
    }

    if input.is_dir() {
        let mut items = Vec::new();
        for entry in WalkDir::new(input).sort_by_file_name() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let entry = entry.map_err(|e| {
                PipelineError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::other("walk failed")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !is_video_file(path) || is_preview_artifact(path) {
                continue;
            }
            let output_dir = default_output_dir(path, input, width, save_at_root);
            tokio::fs::create_dir_all(&output_dir).await?;
            items.push(WorkItem {
                source: path.to_path_buf(),
                output_dir,
            });
            on_progress(items.len() as u64);
        }
        debug!("discovered {} items under {}", items.len(), input.display());
        return Ok(Discovered {
            items,
            single_file: false,
        });
    }

    if is_m3u8(input) {
        let parent = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "playlist".to_string());
        let output_dir = parent.join("Playlist").join(stem);
        tokio::fs::create_dir_all(&output_dir).await?;

        let mut items = Vec::new();
        for source in read_playlist(input).await? {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            items.push(WorkItem {
                source,
                output_dir: output_dir.clone(),
            });
            on_progress(items.len() as u64);
        }
        return Ok(Discovered {
            items,
            single_file: false,
        });
    }

    if !is_video_file(input) {
        return Err(MediaError::NotAVideoFile(input.to_path_buf()).into());
    }

    let root = input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let output_dir = default_output_dir(input, &root, width, save_at_root);
    tokio::fs::create_dir_all(&output_dir).await?;
    on_progress(1);

    Ok(Discovered {
        items: vec![WorkItem {
            source: input.to_path_buf(),
            output_dir,
        }],
        single_file: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[tokio::test]
    async fn test_directory_walk_filters_and_orders() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b.mp4"));
        touch(&dir.path().join("a.mov"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("clip-amprv-M.mp4"));
        touch(&dir.path().join("nested/c.mkv"));

        let found = discover(dir.path(), 1920, false, &CancelToken::noop(), |_| {})
            .await
            .unwrap();

        let names: Vec<String> = found.items.iter().map(|i| i.filename()).collect();
        assert_eq!(names, vec!["a.mov", "b.mp4", "c.mkv"]);
        assert!(!found.single_file);

        // Outputs land next to each source under 0th/<width>.
        assert_eq!(
            found.items[0].output_dir,
            dir.path().join("0th").join("1920")
        );
        assert_eq!(
            found.items[2].output_dir,
            dir.path().join("nested").join("0th").join("1920")
        );
        assert!(found.items[0].output_dir.is_dir());
    }

    #[tokio::test]
    async fn test_save_at_root_collects_outputs() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("nested/c.mkv"));

        let found = discover(dir.path(), 5120, true, &CancelToken::noop(), |_| {})
            .await
            .unwrap();

        assert_eq!(
            found.items[0].output_dir,
            dir.path().join("0th").join("5120")
        );
    }

    #[tokio::test]
    async fn test_discovery_is_idempotent() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.mp4"));
        touch(&dir.path().join("b.mp4"));

        let first = discover(dir.path(), 1920, false, &CancelToken::noop(), |_| {})
            .await
            .unwrap();
        let second = discover(dir.path(), 1920, false, &CancelToken::noop(), |_| {})
            .await
            .unwrap();

        assert_eq!(first.items, second.items);
    }

    #[tokio::test]
    async fn test_single_file_disables_summary() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("solo.mp4");
        touch(&file);

        let found = discover(&file, 1280, false, &CancelToken::noop(), |_| {})
            .await
            .unwrap();

        assert!(found.single_file);
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].output_dir, dir.path().join("0th").join("1280"));
    }

    #[tokio::test]
    async fn test_m3u8_expansion_keeps_missing_entries() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("real.mp4");
        touch(&present);
        let playlist = dir.path().join("mix.m3u8");
        std::fs::write(
            &playlist,
            format!(
                "#EXTM3U\n#EXTINF:-1,real\n{}\n/gone/away.mp4\n",
                present.display()
            ),
        )
        .unwrap();

        let found = discover(&playlist, 1920, false, &CancelToken::noop(), |_| {})
            .await
            .unwrap();

        assert_eq!(found.items.len(), 2);
        assert_eq!(
            found.items[0].output_dir,
            dir.path().join("Playlist").join("mix")
        );
        assert_eq!(found.items[1].source, PathBuf::from("/gone/away.mp4"));
    }

    #[tokio::test]
    async fn test_missing_input_errors() {
        let result = discover(
            Path::new("/definitely/not/here"),
            1920,
            false,
            &CancelToken::noop(),
            |_| {},
        )
        .await;
        assert!(matches!(
            result,
            Err(PipelineError::Media(MediaError::InputNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_non_video_file_errors() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.txt");
        touch(&file);

        let result = discover(&file, 1920, false, &CancelToken::noop(), |_| {}).await;
        assert!(matches!(
            result,
            Err(PipelineError::Media(MediaError::NotAVideoFile(_)))
        ));
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        assert!(is_video_file(Path::new("clip.MP4")));
        assert!(is_video_file(Path::new("clip.WebM")));
        assert!(!is_video_file(Path::new("clip.txt")));
        assert!(!is_video_file(Path::new("noext")));
    }
}
