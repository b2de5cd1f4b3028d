//! Output forwarding and readiness detection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::process::ProcessEvent;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum OutputStream {
    Stdout,
    Stderr,
}

/// One-shot readiness latch shared by the stdout and stderr forwarders.
pub(crate) struct Readiness {
    pattern: Option<String>,
    fired: AtomicBool,
    events: mpsc::UnboundedSender<ProcessEvent>,
}

impl Readiness {
    pub(crate) fn new(
        pattern: Option<String>,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pattern: pattern.filter(|p| !p.is_empty()),
            fired: AtomicBool::new(false),
            events,
        })
    }

    pub(crate) fn has_pattern(&self) -> bool {
        self.pattern.is_some()
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Emit `Ready` unless it was already emitted. Returns true if this call fired.
    pub(crate) fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.events.send(ProcessEvent::Ready);
        true
    }

    /// Test one output line against the pattern.
    pub(crate) fn observe(&self, line: &str) -> bool {
        match &self.pattern {
            Some(pattern) if !self.is_ready() && line.contains(pattern.as_str()) => self.fire(),
            _ => false,
        }
    }
}

/// Forward every line of `reader` to the log until EOF.
pub(crate) async fn forward_lines<R>(
    id: String,
    reader: R,
    stream: OutputStream,
    readiness: Arc<Readiness>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buf);
                let line = decoded.trim_end_matches(['\n', '\r']);
                if line.is_empty() {
                    continue;
                }

                if readiness.observe(line) {
                    info!(process = %id, "readiness marker seen");
                }

                match stream {
                    OutputStream::Stdout => info!(process = %id, "{line}"),
                    OutputStream::Stderr => warn!(process = %id, "{line}"),
                }
            }
            Err(e) => {
                debug!(process = %id, error = %e, "output stream closed with error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_fires_once_on_first_match() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let readiness = Readiness::new(Some("Server started".to_string()), tx);

        assert!(!readiness.observe("loading graph"));
        assert!(!readiness.is_ready());
        assert!(readiness.observe("INFO Server started on :8989"));
        assert!(!readiness.observe("INFO Server started on :8990"));
        assert!(readiness.is_ready());

        assert_eq!(rx.try_recv(), Ok(ProcessEvent::Ready));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn empty_pattern_counts_as_none() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let readiness = Readiness::new(Some(String::new()), tx);
        assert!(!readiness.has_pattern());
        assert!(!readiness.observe("anything"));
    }

    #[tokio::test]
    async fn forwarder_matches_across_lossy_and_crlf_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let readiness = Readiness::new(Some("ready".to_string()), tx);

        let input: &[u8] = b"boot\r\n\xff\xfe garbage\n\nall ready\r\nready again\n";
        forward_lines("test".to_string(), input, OutputStream::Stdout, readiness.clone()).await;

        assert!(readiness.is_ready());
        assert_eq!(rx.try_recv(), Ok(ProcessEvent::Ready));
        assert!(rx.try_recv().is_err());
    }
}
