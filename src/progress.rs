use colored::Colorize;
use std::io::{self, Write};
use std::time::Instant;

/// Single line stderr progress for one representation's segment fetch.
/// Redrawn in place on every completed segment, finished with a newline on
/// drop so log output continues cleanly below it.
pub struct Progress {
    label: String,
    total_segments: usize,
    completed_segments: usize,
    downloaded_bytes: usize,
    last_stat_time: Instant,
    last_stat_bytes: usize,
}

impl Progress {
    pub fn new(label: &str, total_segments: usize) -> Self {
        Self {
            label: label.to_owned(),
            total_segments,
            completed_segments: 0,
            downloaded_bytes: 0,
            last_stat_time: Instant::now(),
            last_stat_bytes: 0,
        }
    }

    pub fn update(&mut self, chunk_bytes: usize) {
        self.completed_segments += 1;
        self.downloaded_bytes += chunk_bytes;

        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.last_stat_time).as_secs_f64();

        let speed = if elapsed_secs > 0.0 {
            (self.downloaded_bytes.saturating_sub(self.last_stat_bytes)) as f64 / elapsed_secs
        } else {
            0.0
        };

        let estimated_total = if self.completed_segments > 0 {
            (self.downloaded_bytes / self.completed_segments) * self.total_segments
        } else {
            0
        };

        let remaining_bytes = estimated_total.saturating_sub(self.downloaded_bytes);

        let eta_seconds = if speed > 0.0 {
            (remaining_bytes as f64 / speed) as usize
        } else {
            0
        };

        let stderr = io::stderr();
        let mut handle = stderr.lock();
        let _ = write!(
            handle,
            "\r\x1B[2K{}{} SG:{} DL:{} ETA:{}{}",
            "[".magenta(),
            self.label,
            format!("{}/{}", self.completed_segments, self.total_segments).cyan(),
            crate::utils::format_bytes(self.downloaded_bytes, 1).green(),
            Eta(eta_seconds).to_string().yellow(),
            "]".magenta(),
        );
        let _ = handle.flush();

        self.last_stat_time = now;
        self.last_stat_bytes = self.downloaded_bytes;
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(handle);
        let _ = handle.flush();
    }
}

struct Eta(usize);

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total_seconds = self.0;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            write!(f, "{}h{}m{}s", hours, minutes, seconds)
        } else if minutes > 0 {
            write!(f, "{}m{}s", minutes, seconds)
        } else {
            write!(f, "{}s", seconds)
        }
    }
}
