//! Wall-clock metadata for generation summaries.

use std::time::{Instant, SystemTime};

pub fn wall_time_iso_utc() -> String {
    // Metadata only (startedAt/finishedAt); generation never branches on time.
    let now = SystemTime::now();
    let dt: time::OffsetDateTime = now.into();
    dt.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[derive(Debug, Clone)]
pub struct Stopwatch {
    started: Instant,
    started_at: String,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: wall_time_iso_utc(),
        }
    }

    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
    }
}
