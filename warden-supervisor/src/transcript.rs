//! Timestamped engine transcript.
//!
//! Every line the engine prints is appended byte for byte, prefixed with the
//! seconds elapsed since the supervisor started: `12.345678s #1 INITED ...`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::SupervisorError;

/// Append-only transcript writer.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    writer: BufWriter<tokio::fs::File>,
    start: Instant,
}

impl Transcript {
    /// Open `path` for appending, creating it and its parent directory.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Transcript`] if the file cannot be opened.
    pub async fn open(path: &Path, start: Instant) -> Result<Self, SupervisorError> {
        let wrap = |source| SupervisorError::Transcript { path: path.to_owned(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(wrap)?;

        Ok(Self { path: path.to_owned(), writer: BufWriter::new(file), start })
    }

    /// Append one raw engine line, without its `\n`, behind the elapsed-time
    /// prefix. The bytes are not decoded or trimmed.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Transcript`] on write failure.
    pub async fn record(&mut self, line: &[u8]) -> Result<(), SupervisorError> {
        let prefix = format_prefix(self.start.elapsed().as_secs_f64());
        self.write(prefix.as_bytes()).await?;
        self.write(line).await?;
        self.write(b"\n").await
    }

    /// Push buffered lines to disk.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Transcript`] on write failure.
    pub async fn flush(&mut self) -> Result<(), SupervisorError> {
        self.writer.flush().await.map_err(|source| self.error(source))
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), SupervisorError> {
        self.writer.write_all(bytes).await.map_err(|source| self.error(source))
    }

    fn error(&self, source: std::io::Error) -> SupervisorError {
        SupervisorError::Transcript { path: self.path.clone(), source }
    }
}

fn format_prefix(elapsed_secs: f64) -> String {
    format!("{elapsed_secs:.6}s ")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_bytes(path: &Path) -> Vec<u8> {
        match tokio::fs::read(path).await {
            Ok(c) => c,
            Err(e) => panic!("read failed: {e}"),
        }
    }

    #[test]
    fn format_prefix_is_elapsed_seconds() {
        assert_eq!(format_prefix(1.5), "1.500000s ");
        assert_eq!(format_prefix(0.0), "0.000000s ");
    }

    #[tokio::test]
    async fn record_appends_prefixed_lines() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir failed: {e}"),
        };
        let path = dir.path().join("logs/fz.log");

        let mut transcript = match Transcript::open(&path, Instant::now()).await {
            Ok(t) => t,
            Err(e) => panic!("open failed: {e}"),
        };
        for line in ["INFO: Seed: 1", "#2 INITED cov: 10 ft: 5"] {
            if let Err(e) = transcript.record(line.as_bytes()).await {
                panic!("record failed: {e}");
            }
        }
        if let Err(e) = transcript.flush().await {
            panic!("flush failed: {e}");
        }

        let content = String::from_utf8_lossy(&read_bytes(&path).await).into_owned();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("s INFO: Seed: 1"), "got {:?}", lines[0]);
        assert!(lines[1].ends_with("s #2 INITED cov: 10 ft: 5"), "got {:?}", lines[1]);
        let stamp = lines[0].split_once("s ").map(|(s, _)| s).unwrap_or_default();
        assert!(stamp.parse::<f64>().is_ok(), "prefix must be a number of seconds, got {stamp:?}");
    }

    #[tokio::test]
    async fn record_keeps_invalid_utf8_and_carriage_return() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir failed: {e}"),
        };
        let path = dir.path().join("fz.log");

        let mut transcript = match Transcript::open(&path, Instant::now()).await {
            Ok(t) => t,
            Err(e) => panic!("open failed: {e}"),
        };
        assert!(transcript.record(b"crash \xff input\r").await.is_ok());
        assert!(transcript.flush().await.is_ok());

        let bytes = read_bytes(&path).await;
        assert!(
            bytes.ends_with(b"s crash \xff input\r\n"),
            "line must be stored unchanged, got {bytes:?}"
        );
    }

    #[tokio::test]
    async fn open_appends_to_existing_transcript() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir failed: {e}"),
        };
        let path = dir.path().join("fz.log");
        if let Err(e) = tokio::fs::write(&path, "previous run\n").await {
            panic!("seed write failed: {e}");
        }

        let mut transcript = match Transcript::open(&path, Instant::now()).await {
            Ok(t) => t,
            Err(e) => panic!("open failed: {e}"),
        };
        assert!(transcript.record(b"#1 READ").await.is_ok());
        assert!(transcript.flush().await.is_ok());

        let content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        assert!(content.starts_with("previous run\n"));
        assert!(content.trim_end().ends_with("#1 READ"));
    }

    #[tokio::test]
    async fn open_in_missing_unwritable_location_fails() {
        let result = Transcript::open(Path::new("/proc/fuzzwarden/fz.log"), Instant::now()).await;
        assert!(matches!(result, Err(SupervisorError::Transcript { .. })));
    }

    proptest::proptest! {
        #[test]
        fn proptest_prefix_parses_back_to_seconds(secs in 0.0f64..1.0e6) {
            let prefix = format_prefix(secs);
            let stamp = prefix.strip_suffix("s ").unwrap_or_default();
            proptest::prop_assert!(!stamp.contains(' '));
            let parsed = stamp.parse::<f64>().unwrap_or(f64::NAN);
            proptest::prop_assert!((parsed - secs).abs() < 1e-6);
        }
    }
}
