//! Transfer progress for streaming fetches

use std::path::Path;
use std::time::{Duration, Instant};

/// Receives progress for streaming transfers
pub trait ProgressSink: Send + Sync {
    /// A transfer to `target` began
    fn started(&self, target: &Path, total: Option<u64>);
    /// More bytes arrived
    fn advanced(&self, progress: &Progress);
    /// The body was fully received
    fn finished(&self, progress: &Progress);
}

/// Progress of one streaming transfer
#[derive(Debug, Clone)]
pub struct Progress {
    /// Expected size in bytes, when the server sent a content length
    pub total: Option<u64>,
    /// Bytes written to the temporary file so far
    pub downloaded: u64,
    /// Completion percentage (0.0 to 100.0), zero when the total is unknown
    pub percent: f64,
    /// Average speed in bytes per second
    pub speed: Option<f64>,
    /// Estimated time remaining
    pub eta: Option<Duration>,
    started: Instant,
}

impl Progress {
    /// Start tracking a transfer
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            downloaded: 0,
            percent: 0.0,
            speed: None,
            eta: None,
            started: Instant::now(),
        }
    }

    /// Record `len` more bytes
    pub fn advance(&mut self, len: u64) {
        self.downloaded += len;

        if let Some(total) = self.total {
            self.percent = (self.downloaded as f64 / total as f64 * 100.0).min(100.0);
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let speed = self.downloaded as f64 / elapsed;
            self.speed = Some(speed);
            self.eta = match self.total {
                Some(total) if speed > 0.0 && total > self.downloaded => Some(
                    Duration::from_secs(((total - self.downloaded) as f64 / speed) as u64),
                ),
                _ => None,
            };
        }
    }

    /// Time since the transfer started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Check if every expected byte arrived
    pub fn is_complete(&self) -> bool {
        self.total.map_or(false, |total| self.downloaded >= total)
    }

    /// One-line summary such as `1.5 MB of 3.0 MB at 512.0 KB/s`
    pub fn summary(&self) -> String {
        let speed = self
            .speed
            .map(format_bytes_per_second)
            .unwrap_or_else(|| "unknown speed".to_string());
        match self.total {
            Some(total) => format!(
                "{} of {} at {}",
                format_bytes(self.downloaded),
                format_bytes(total),
                speed
            ),
            None => format!("{} at {}", format_bytes(self.downloaded), speed),
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exp = (bytes_f64.ln() / THRESHOLD.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f64 / THRESHOLD.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.1} {}", value, UNITS[exp])
    }
}

/// Format bytes per second as human-readable string
pub fn format_bytes_per_second(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second as u64))
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}
