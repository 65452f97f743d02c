//! Frame source backed by a directory of still images.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stepseg_common::config::SourceConfig;
use stepseg_common::frame::Frame;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Ordered list of image files with one capture timestamp each.
#[derive(Debug)]
pub struct DirectorySource {
    entries: Vec<(PathBuf, f64)>,
}

impl DirectorySource {
    pub fn open(config: &SourceConfig) -> Result<Self, SourceError> {
        let files = list_images(&config.frames_dir)?;
        let timestamps = match &config.timestamps_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| SourceError::Io(path.display().to_string(), e))?;
                let ts = parse_timestamps(&text)?;
                if ts.len() != files.len() {
                    return Err(SourceError::CountMismatch {
                        frames: files.len(),
                        timestamps: ts.len(),
                    });
                }
                ts
            }
            None => (0..files.len()).map(|i| i as f64 / config.fps).collect(),
        };

        info!(
            dir = %config.frames_dir.display(),
            frames = files.len(),
            timestamps = if config.timestamps_file.is_some() { "file" } else { "fps" },
            "opened frame directory"
        );

        Ok(Self {
            entries: files.into_iter().zip(timestamps).collect(),
        })
    }

    /// Decode frames in order on a blocking thread and send them over a
    /// bounded channel of `capacity`.
    ///
    /// The stream ends after the last file, when `stop` is set, or when the
    /// receiver is dropped. Files that fail to read or decode are skipped.
    pub fn spawn(self, capacity: usize, stop: Arc<AtomicBool>) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::task::spawn_blocking(move || {
            let total = self.entries.len();
            let mut sent = 0usize;
            for (path, ts) in self.entries {
                if stop.load(Ordering::Relaxed) {
                    info!(sent, total, "frame source stopped early");
                    return;
                }
                let frame = match std::fs::read(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|data| Frame::decode(&data, ts).map_err(|e| e.to_string()))
                {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable frame");
                        continue;
                    }
                };
                if tx.blocking_send(frame).is_err() {
                    debug!(sent, "frame receiver dropped");
                    return;
                }
                sent += 1;
            }
            debug!(sent, total, "frame source exhausted");
        });
        rx
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    if !dir.is_dir() {
        return Err(SourceError::MissingDir(dir.display().to_string()));
    }
    let entries =
        std::fs::read_dir(dir).map_err(|e| SourceError::Io(dir.display().to_string(), e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| SourceError::Io(dir.display().to_string(), e))?
            .path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(SourceError::Empty(dir.display().to_string()));
    }
    files.sort();
    Ok(files)
}

/// One timestamp in seconds per non-blank line, non-decreasing.
fn parse_timestamps(text: &str) -> Result<Vec<f64>, SourceError> {
    let mut out: Vec<f64> = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let ts = match line.parse::<f64>() {
            Ok(ts) if ts.is_finite() => ts,
            _ => {
                return Err(SourceError::BadTimestamp {
                    line: n + 1,
                    value: line.to_string(),
                })
            }
        };
        if let Some(&prev) = out.last() {
            if ts < prev {
                return Err(SourceError::Decreasing {
                    line: n + 1,
                    prev,
                    next: ts,
                });
            }
        }
        out.push(ts);
    }
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("frames directory not found: {0}")]
    MissingDir(String),
    #[error("no image files in {0}")]
    Empty(String),
    #[error("I/O error on {0}: {1}")]
    Io(String, std::io::Error),
    #[error("{frames} frames but {timestamps} timestamps")]
    CountMismatch { frames: usize, timestamps: usize },
    #[error("line {line}: invalid timestamp {value:?}")]
    BadTimestamp { line: usize, value: String },
    #[error("line {line}: timestamp {next} is before {prev}")]
    Decreasing { line: usize, prev: f64, next: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_config(dir: &Path) -> SourceConfig {
        SourceConfig {
            frames_dir: dir.to_path_buf(),
            fps: 10.0,
            timestamps_file: None,
            channel_capacity: 4,
        }
    }

    fn write_png(dir: &Path, name: &str, shade: u8) {
        let frame = Frame::from_luma(4, 4, vec![shade; 16], 0.0).unwrap();
        std::fs::write(dir.join(name), frame.encode_png().unwrap()).unwrap();
    }

    fn timestamps(source: &DirectorySource) -> Vec<f64> {
        source.entries.iter().map(|(_, ts)| *ts).collect()
    }

    async fn collect(mut rx: mpsc::Receiver<Frame>) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Some(frame) = rx.recv().await {
            out.push(frame);
        }
        out
    }

    #[test]
    fn lists_images_in_name_order_with_fps_timestamps() {
        let tmp = tempfile::tempdir().unwrap();
        write_png(tmp.path(), "frame_002.png", 2);
        write_png(tmp.path(), "frame_000.png", 0);
        write_png(tmp.path(), "frame_001.PNG", 1);
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let source = DirectorySource::open(&source_config(tmp.path())).unwrap();
        assert_eq!(timestamps(&source), vec![0.0, 0.1, 0.2]);
        let names: Vec<_> = source
            .entries
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["frame_000.png", "frame_001.PNG", "frame_002.png"]);
    }

    #[test]
    fn reads_timestamps_file() {
        let tmp = tempfile::tempdir().unwrap();
        let frames = tmp.path().join("frames");
        std::fs::create_dir(&frames).unwrap();
        write_png(&frames, "a.png", 0);
        write_png(&frames, "b.png", 0);
        let ts_file = tmp.path().join("ts.txt");
        std::fs::write(&ts_file, "1.5\n\n  2.25 \n").unwrap();

        let mut config = source_config(&frames);
        config.timestamps_file = Some(ts_file);
        let source = DirectorySource::open(&config).unwrap();
        assert_eq!(timestamps(&source), vec![1.5, 2.25]);
    }

    #[test]
    fn rejects_bad_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = source_config(&tmp.path().join("nope"));
        assert!(matches!(
            DirectorySource::open(&missing),
            Err(SourceError::MissingDir(_))
        ));
        assert!(matches!(
            DirectorySource::open(&source_config(tmp.path())),
            Err(SourceError::Empty(_))
        ));
    }

    #[test]
    fn rejects_mismatched_timestamps() {
        let tmp = tempfile::tempdir().unwrap();
        let frames = tmp.path().join("frames");
        std::fs::create_dir(&frames).unwrap();
        write_png(&frames, "a.png", 0);
        let ts_file = tmp.path().join("ts.txt");
        std::fs::write(&ts_file, "0.0\n1.0\n").unwrap();

        let mut config = source_config(&frames);
        config.timestamps_file = Some(ts_file);
        assert!(matches!(
            DirectorySource::open(&config),
            Err(SourceError::CountMismatch {
                frames: 1,
                timestamps: 2
            })
        ));
    }

    #[test]
    fn timestamp_parsing_errors() {
        assert!(matches!(
            parse_timestamps("0.0\nabc\n"),
            Err(SourceError::BadTimestamp { line: 2, .. })
        ));
        assert!(matches!(
            parse_timestamps("0.0\ninf\n"),
            Err(SourceError::BadTimestamp { line: 2, .. })
        ));
        assert!(matches!(
            parse_timestamps("1.0\n1.0\n0.5\n"),
            Err(SourceError::Decreasing { line: 3, .. })
        ));
    }

    #[tokio::test]
    async fn streams_frames_and_skips_undecodable() {
        let tmp = tempfile::tempdir().unwrap();
        write_png(tmp.path(), "0.png", 10);
        std::fs::write(tmp.path().join("1.png"), b"not an image").unwrap();
        write_png(tmp.path(), "2.png", 30);

        let source = DirectorySource::open(&source_config(tmp.path())).unwrap();
        let frames = collect(source.spawn(1, Arc::new(AtomicBool::new(false)))).await;

        let ts: Vec<f64> = frames.iter().map(|f| f.timestamp()).collect();
        assert_eq!(ts, vec![0.0, 0.2]);
        assert_eq!(frames[1].luma().get_pixel(0, 0).0, [30]);
    }

    #[tokio::test]
    async fn stop_flag_ends_stream() {
        let tmp = tempfile::tempdir().unwrap();
        write_png(tmp.path(), "0.png", 0);
        write_png(tmp.path(), "1.png", 0);

        let source = DirectorySource::open(&source_config(tmp.path())).unwrap();
        let frames = collect(source.spawn(4, Arc::new(AtomicBool::new(true)))).await;
        assert!(frames.is_empty());
    }
}
