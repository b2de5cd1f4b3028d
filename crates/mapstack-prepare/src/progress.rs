//! Throttled download progress.

use std::fmt;
use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// One progress observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl Progress {
    /// Percentage complete; `None` when the total size is unknown.
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => {
                Some((self.downloaded as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent() {
            Some(pct) => write!(f, "{pct:.1}%"),
            None => write!(f, "{} bytes", self.downloaded),
        }
    }
}

/// Counts transferred bytes and yields an observation at most once per interval.
#[derive(Debug)]
pub struct ProgressThrottle {
    downloaded: u64,
    total: Option<u64>,
    interval: Duration,
    last_report: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            downloaded: 0,
            total,
            interval: REPORT_INTERVAL,
            last_report: None,
        }
    }

    pub fn advance(&mut self, bytes: u64) -> Option<Progress> {
        self.advance_at(bytes, Instant::now())
    }

    pub fn advance_at(&mut self, bytes: u64, now: Instant) -> Option<Progress> {
        self.downloaded += bytes;
        if let Some(last) = self.last_report {
            if now.duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_report = Some(now);
        Some(self.current())
    }

    pub fn current(&self) -> Progress {
        Progress {
            downloaded: self.downloaded,
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_at_most_once_per_interval() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(Some(1000));

        assert!(throttle.advance_at(100, start).is_some());
        assert!(throttle.advance_at(100, start + Duration::from_millis(300)).is_none());
        assert!(throttle.advance_at(100, start + Duration::from_millis(900)).is_none());

        let report = throttle
            .advance_at(100, start + Duration::from_millis(1000))
            .unwrap();
        assert_eq!(report.downloaded, 400);
        assert_eq!(report.percent(), Some(40.0));
    }

    #[test]
    fn unknown_total_has_no_percentage() {
        let mut throttle = ProgressThrottle::new(None);
        let report = throttle.advance(2048).unwrap();
        assert_eq!(report.percent(), None);
        assert_eq!(report.to_string(), "2048 bytes");
    }

    #[test]
    fn zero_total_is_unknown() {
        let progress = Progress { downloaded: 10, total: Some(0) };
        assert_eq!(progress.percent(), None);
    }
}
