//! Worker side-channel
//!
//! Stderr is only logged and scanned for the line announcing that the
//! manifest has been opened for writing. Nothing else is parsed.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;

use crate::registry::SessionKey;

/// Flips the readiness flag on the first matching stderr line
pub struct DiagnosticScanner {
    marker: String,
    manifest: String,
    ready: Arc<watch::Sender<bool>>,
}

impl DiagnosticScanner {
    pub fn new(marker: &str, manifest: &str, ready: Arc<watch::Sender<bool>>) -> Self {
        Self {
            marker: marker.to_string(),
            manifest: manifest.to_string(),
            ready,
        }
    }

    /// Inspect one line. Returns true when this line made the worker ready.
    pub fn observe(&self, line: &str) -> bool {
        if *self.ready.borrow() {
            return false;
        }

        if line.contains(&self.marker) && line.contains(&self.manifest) {
            self.ready.send_replace(true);
            true
        } else {
            false
        }
    }
}

/// Drain the worker's stderr until it closes
pub(crate) async fn watch_stderr<R>(stderr: R, scanner: Option<DiagnosticScanner>, key: SessionKey)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(key = %key, "worker: {}", line.trim_end());
                if scanner.as_ref().is_some_and(|s| s.observe(&line)) {
                    tracing::info!(key = %key, "Worker output ready");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Worker stderr read failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> (DiagnosticScanner, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (DiagnosticScanner::new("Opening '", "index.m3u8", Arc::new(tx)), rx)
    }

    #[test]
    fn test_segment_open_is_not_ready() {
        let (scanner, rx) = scanner();
        assert!(!scanner.observe("[hls @ 0x1] Opening '/tmp/k/segment_00000.ts' for writing"));
        assert!(!scanner.observe("Output #0, hls, to '/tmp/k/index.m3u8':"));
        assert!(!*rx.borrow());
    }

    #[test]
    fn test_manifest_open_is_ready_once() {
        let (scanner, rx) = scanner();
        assert!(scanner.observe("[hls @ 0x1] Opening '/tmp/k/index.m3u8.tmp' for writing"));
        assert!(*rx.borrow());
        assert!(!scanner.observe("[hls @ 0x1] Opening '/tmp/k/index.m3u8.tmp' for writing"));
    }

    #[tokio::test]
    async fn test_watch_stderr_marks_ready() {
        let (scanner, mut rx) = scanner();
        let stderr: &'static [u8] =
            b"ffmpeg version x\nOpening 'a/segment_00000.ts' for writing\nOpening 'a/index.m3u8.tmp' for writing\n";

        watch_stderr(stderr, Some(scanner), SessionKey::parse("k").unwrap()).await;

        assert!(*rx.borrow_and_update());
    }
}
