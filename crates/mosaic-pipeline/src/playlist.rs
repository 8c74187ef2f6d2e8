//! M3U8 playlist parsing and emission.
//!
//! Only the minimal subset is spoken: an `#EXTM3U` header, optional
//! `#EXTINF` tags, one file path per line. Comments and blank lines are
//! ignored on input; output is terminated with a trailing newline.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::warn;

use walkdir::WalkDir;

use mosaic_media::{fs_utils::write_atomic, VideoBackend};

use crate::discovery::is_video_file;
use crate::error::PipelineResult;

/// How playlist entries are annotated and ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistMode {
    /// Input order, `#EXTINF:-1,<stem>` tags.
    Standard,
    /// Probed durations, sorted ascending, `#EXTINF:<seconds>,<stem>`.
    DurationBased,
}

impl PlaylistMode {
    fn token(&self) -> &'static str {
        match self {
            PlaylistMode::Standard => "all",
            PlaylistMode::DurationBased => "duration",
        }
    }
}

/// Extract the path lines from playlist text.
pub fn parse_m3u8(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read a playlist file, resolving relative entries against its parent
/// directory. Listed files are not required to exist; missing sources
/// surface later as per-item errors.
pub async fn read_playlist(path: &Path) -> PipelineResult<Vec<PathBuf>> {
    let content = tokio::fs::read_to_string(path).await?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(parse_m3u8(&content)
        .into_iter()
        .map(|line| {
            let p = PathBuf::from(&line);
            if p.is_absolute() {
                p
            } else {
                parent.join(p)
            }
        })
        .collect())
}

/// Render playlist text for `(path, duration, title)` entries.
fn render_m3u8(entries: &[(PathBuf, Option<f64>, String)]) -> String {
    let mut out = String::from("#EXTM3U\n");
    for (path, duration, title) in entries {
        match duration {
            Some(d) => out.push_str(&format!("#EXTINF:{},{}\n", d.round() as i64, title)),
            None => out.push_str(&format!("#EXTINF:-1,{title}\n")),
        }
        out.push_str(&format!("{}\n", path.display()));
    }
    out
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Build a playlist over `inputs` and write it into `out_dir` as
/// `<YYYYMMDD>-<mode>.m3u8`. Returns the written path.
pub async fn build_playlist(
    backend: &dyn VideoBackend,
    inputs: &[PathBuf],
    out_dir: &Path,
    mode: PlaylistMode,
) -> PipelineResult<PathBuf> {
    let mut entries: Vec<(PathBuf, Option<f64>, String)> = Vec::with_capacity(inputs.len());

    match mode {
        PlaylistMode::Standard => {
            for input in inputs {
                entries.push((input.clone(), None, stem_of(input)));
            }
        }
        PlaylistMode::DurationBased => {
            for input in inputs {
                match backend.probe(input).await {
                    Ok(meta) => {
                        entries.push((input.clone(), Some(meta.duration_seconds), stem_of(input)))
                    }
                    Err(e) => warn!("skipping unprobeable playlist entry {}: {e}", input.display()),
                }
            }
            entries.sort_by(|a, b| {
                a.1.unwrap_or(0.0)
                    .partial_cmp(&b.1.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    let name = format!(
        "{}-{}.m3u8",
        chrono::Local::now().format("%Y%m%d"),
        mode.token()
    );
    let target = out_dir.join(name);
    write_atomic(&target, render_m3u8(&entries).as_bytes()).await?;
    Ok(target)
}

/// Build a standard playlist of the videos under `root` whose modified
/// time falls inside `[start, end]` (inclusive), written to `out_dir`
/// as `<start>-<end>.m3u8`.
pub async fn build_date_range_playlist(
    root: &Path,
    start: NaiveDate,
    end: NaiveDate,
    out_dir: &Path,
) -> PipelineResult<PathBuf> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            crate::error::PipelineError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk failed")),
            )
        })?;
        if !entry.file_type().is_file() || !is_video_file(entry.path()) {
            continue;
        }
        let modified = tokio::fs::metadata(entry.path())
            .await
            .and_then(|m| m.modified())
            .ok();
        let Some(modified) = modified else { continue };
        let date = chrono::DateTime::<chrono::Local>::from(modified).date_naive();
        if date >= start && date <= end {
            let path = entry.path().to_path_buf();
            let stem = stem_of(&path);
            entries.push((path, None, stem));
        }
    }

    let name = format!("{}-{}.m3u8", start.format("%Y%m%d"), end.format("%Y%m%d"));
    let target = out_dir.join(name);
    write_atomic(&target, render_m3u8(&entries).as_bytes()).await?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_comments_and_blanks() {
        let content = "#EXTM3U\n\n#EXTINF:-1,clip\n/videos/a.mp4\n  \n/videos/b.mp4\n";
        assert_eq!(parse_m3u8(content), vec!["/videos/a.mp4", "/videos/b.mp4"]);
    }

    #[test]
    fn test_render_emits_minimal_subset() {
        let entries = vec![
            (PathBuf::from("/v/a.mp4"), None, "a".to_string()),
            (PathBuf::from("/v/b.mp4"), Some(63.4), "b".to_string()),
        ];
        let text = render_m3u8(&entries);
        assert!(text.starts_with("#EXTM3U\n"));
        assert!(text.contains("#EXTINF:-1,a\n/v/a.mp4\n"));
        assert!(text.contains("#EXTINF:63,b\n/v/b.mp4\n"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_render_parse_round_trip() {
        let entries = vec![
            (PathBuf::from("/v/a.mp4"), None, "a".to_string()),
            (PathBuf::from("/v/b.mp4"), None, "b".to_string()),
        ];
        let text = render_m3u8(&entries);
        let parsed = parse_m3u8(&text);
        assert_eq!(parsed, vec!["/v/a.mp4", "/v/b.mp4"]);

        // A second render over the parsed paths is identical.
        let again: Vec<(PathBuf, Option<f64>, String)> = parsed
            .iter()
            .map(|p| {
                let path = PathBuf::from(p);
                let stem = stem_of(&path);
                (path, None, stem)
            })
            .collect();
        assert_eq!(render_m3u8(&again), text);
    }

    #[tokio::test]
    async fn test_read_playlist_resolves_relative_entries() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = dir.path().join("list.m3u8");
        tokio::fs::write(&playlist, "#EXTM3U\nclips/a.mp4\n/abs/b.mp4\n")
            .await
            .unwrap();

        let paths = read_playlist(&playlist).await.unwrap();
        assert_eq!(paths[0], dir.path().join("clips/a.mp4"));
        assert_eq!(paths[1], PathBuf::from("/abs/b.mp4"));
    }
}
