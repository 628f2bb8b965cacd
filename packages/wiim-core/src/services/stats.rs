//! Request statistics for `/api/stats`.
//!
//! Counters are cheap atomics bumped by the HTTP middleware. When stats are
//! disabled the middleware is still installed but records nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

/// Which counter a request path feeds (besides `total`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCategory {
    Status,
    Control,
    Media,
    Players,
    Other,
}

/// First match wins, checked in this order.
#[must_use]
pub fn classify_path(path: &str) -> RequestCategory {
    if path.contains("/status") || path.contains("/info") {
        RequestCategory::Status
    } else if path.contains("/control") || path.contains("/volume") {
        RequestCategory::Control
    } else if path.contains("/media") {
        RequestCategory::Media
    } else if path.contains("/players") {
        RequestCategory::Players
    } else {
        RequestCategory::Other
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestCounts {
    pub total: u64,
    pub status: u64,
    pub control: u64,
    pub media: u64,
    pub players: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrafficCounts {
    pub sent: u64,
    pub received: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub enabled: bool,
    /// Milliseconds since start or last reset.
    pub uptime: u64,
    pub requests: RequestCounts,
    pub traffic: TrafficCounts,
    pub errors: u64,
    pub requests_per_second: f64,
}

pub struct ServerStats {
    enabled: bool,
    started: Mutex<Instant>,
    total: AtomicU64,
    status: AtomicU64,
    control: AtomicU64,
    media: AtomicU64,
    players: AtomicU64,
    sent: AtomicU64,
    received: AtomicU64,
    errors: AtomicU64,
}

impl ServerStats {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            started: Mutex::new(Instant::now()),
            total: AtomicU64::new(0),
            status: AtomicU64::new(0),
            control: AtomicU64::new(0),
            media: AtomicU64::new(0),
            players: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records one finished request.
    pub fn record(&self, path: &str, received: u64, sent: u64, is_error: bool) {
        if !self.enabled {
            return;
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match classify_path(path) {
            RequestCategory::Status => Some(&self.status),
            RequestCategory::Control => Some(&self.control),
            RequestCategory::Media => Some(&self.media),
            RequestCategory::Players => Some(&self.players),
            RequestCategory::Other => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        self.received.fetch_add(received, Ordering::Relaxed);
        self.sent.fetch_add(sent, Ordering::Relaxed);
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn reset(&self) {
        *self.started.lock() = Instant::now();
        for counter in [
            &self.total,
            &self.status,
            &self.control,
            &self.media,
            &self.players,
            &self.sent,
            &self.received,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        log::info!("[Stats] Counters reset");
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let uptime = self.started.lock().elapsed();
        let total = self.total.load(Ordering::Relaxed);
        let secs = uptime.as_secs_f64();
        let rps = if secs > 0.0 { total as f64 / secs } else { 0.0 };
        StatsSnapshot {
            enabled: self.enabled,
            uptime: uptime.as_millis() as u64,
            requests: RequestCounts {
                total,
                status: self.status.load(Ordering::Relaxed),
                control: self.control.load(Ordering::Relaxed),
                media: self.media.load(Ordering::Relaxed),
                players: self.players.load(Ordering::Relaxed),
            },
            traffic: TrafficCounts {
                sent: self.sent.load(Ordering::Relaxed),
                received: self.received.load(Ordering::Relaxed),
            },
            errors: self.errors.load(Ordering::Relaxed),
            requests_per_second: (rps * 100.0).round() / 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_classified_in_order() {
        assert_eq!(classify_path("/api/players/p1/status"), RequestCategory::Status);
        assert_eq!(classify_path("/api/server-info"), RequestCategory::Status);
        assert_eq!(classify_path("/api/players/p1/volume"), RequestCategory::Control);
        assert_eq!(classify_path("/api/players/p1/control/next"), RequestCategory::Control);
        assert_eq!(classify_path("/api/media/upload"), RequestCategory::Media);
        assert_eq!(classify_path("/api/players"), RequestCategory::Players);
        assert_eq!(classify_path("/health"), RequestCategory::Other);
    }

    #[test]
    fn counters_accumulate_and_reset() {
        let stats = ServerStats::new(true);
        stats.record("/api/players", 10, 200, false);
        stats.record("/api/players/p1/status", 0, 50, false);
        stats.record("/api/players/p1/play", 30, 80, true);

        let snap = stats.snapshot();
        assert_eq!(snap.requests.total, 3);
        assert_eq!(snap.requests.players, 2);
        assert_eq!(snap.requests.status, 1);
        assert_eq!(snap.traffic.sent, 330);
        assert_eq!(snap.traffic.received, 40);
        assert_eq!(snap.errors, 1);

        stats.reset();
        assert_eq!(stats.snapshot().requests.total, 0);
    }

    #[test]
    fn disabled_stats_record_nothing() {
        let stats = ServerStats::new(false);
        stats.record("/api/players", 10, 10, true);
        let snap = stats.snapshot();
        assert!(!snap.enabled);
        assert_eq!(snap.requests.total, 0);
        assert_eq!(snap.errors, 0);
    }
}
