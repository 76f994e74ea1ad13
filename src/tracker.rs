//! Client-resident interaction outbox.
//!
//! UI actions are appended to a durable spool file and delivered to the
//! batch ingestion endpoint on a timer, so browsing is never blocked on
//! telemetry. Recording never fails visibly; delivery is retried with
//! bounded backoff until the server confirms the batch.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::HashSet,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::recommendations::schemas::{InteractionKind, SESSION_ID_HEADER};

pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 45;
const MAX_BACKOFF_SHIFT: u32 = 4;

#[derive(Error, Debug)]
pub enum FlushError {
    #[error("spool unavailable: {0}")]
    Spool(#[from] std::io::Error),

    #[error("delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error("server rejected batch: {0}")]
    Rejected(reqwest::StatusCode),

    #[error("flush already in progress")]
    InFlight,
}

/// One spooled event. The client-generated `event_id` doubles as an
/// idempotency key, so the server can de-duplicate if a batch is ever
/// delivered twice.
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingInteraction {
    pub event_id: String,
    pub product_id: String,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub recorded_at: u64,
}

pub struct InteractionTracker {
    spool_path: PathBuf,
    endpoint: String,
    session_id: String,
    client: Client,
    in_flight: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl InteractionTracker {
    pub fn new(spool_path: impl AsRef<Path>, endpoint: impl Into<String>) -> Self {
        Self {
            spool_path: spool_path.as_ref().to_path_buf(),
            endpoint: endpoint.into(),
            session_id: Uuid::new_v4().to_string(),
            client: Client::new(),
            in_flight: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Appends an event to the spool. Side effect only: if the spool cannot
    /// be written the event is dropped silently, trading durability for
    /// never surfacing telemetry failures to the user.
    pub fn record(&self, product_id: &str, kind: InteractionKind) {
        let event = PendingInteraction {
            event_id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            kind,
            recorded_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };

        let Ok(line) = serde_json::to_string(&event) else {
            return;
        };

        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.spool_path)
            .and_then(|mut file| writeln!(file, "{}", line));

        if let Err(err) = appended {
            debug!(error = %err, "spool write failed, dropping interaction");
        }
    }

    /// Everything currently spooled. Lines that fail to parse are skipped.
    pub fn pending(&self) -> Vec<PendingInteraction> {
        let Ok(contents) = std::fs::read_to_string(&self.spool_path) else {
            return Vec::new();
        };

        contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Delivers the whole spool in one request. The spool is cleared only on
    /// a confirmed 2xx, so failed batches are retried on the next tick. A
    /// single in-flight flush is allowed at a time; overlapping calls bail
    /// out instead of double-sending.
    pub async fn flush(&self) -> Result<usize, FlushError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(FlushError::InFlight);
        }

        let result = self.flush_spool().await;
        self.in_flight.store(false, Ordering::Release);

        match &result {
            Ok(_) => self.consecutive_failures.store(0, Ordering::Relaxed),
            Err(_) => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        result
    }

    async fn flush_spool(&self) -> Result<usize, FlushError> {
        let pending = self.pending();
        if pending.is_empty() {
            return Ok(0);
        }

        let body = json!({
            "interactions": pending
                .iter()
                .map(|event| json!({
                    "product_id": event.product_id,
                    "type": event.kind.as_str(),
                    "event_id": event.event_id,
                }))
                .collect::<Vec<_>>()
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header(SESSION_ID_HEADER, &self.session_id)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlushError::Rejected(status));
        }

        // Confirmed delivery; drop exactly the delivered events. Anything
        // recorded while the request was in flight stays spooled for the
        // next tick.
        let delivered: HashSet<String> = pending
            .iter()
            .map(|event| event.event_id.clone())
            .collect();
        self.retain_undelivered(&delivered)?;

        info!(count = pending.len(), "flushed interaction batch");
        Ok(pending.len())
    }

    /// Rewrites the spool keeping only events outside the delivered batch.
    fn retain_undelivered(&self, delivered: &HashSet<String>) -> std::io::Result<()> {
        let contents = std::fs::read_to_string(&self.spool_path).unwrap_or_default();

        let kept: Vec<&str> = contents
            .lines()
            .filter(|line| match serde_json::from_str::<PendingInteraction>(line) {
                Ok(event) => !delivered.contains(&event.event_id),
                Err(_) => false,
            })
            .collect();

        let mut rewritten = kept.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        std::fs::write(&self.spool_path, rewritten)
    }

    /// Delay before the next flush attempt: the base interval, doubled per
    /// consecutive failure up to a fixed cap.
    fn next_delay(&self, base: Duration) -> Duration {
        let failures = self
            .consecutive_failures
            .load(Ordering::Relaxed)
            .min(MAX_BACKOFF_SHIFT);
        base * 2_u32.pow(failures)
    }

    /// Timer-driven delivery loop: single task, no parallelism. Callers
    /// should also invoke [`flush`](Self::flush) once on session teardown.
    pub async fn run(&self, base_interval: Duration) -> ! {
        loop {
            tokio::time::sleep(self.next_delay(base_interval)).await;

            match self.flush().await {
                Ok(_) | Err(FlushError::InFlight) => {}
                Err(err) => warn!(error = %err, "interaction flush failed, will retry"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    fn tracker() -> InteractionTracker {
        let spool = temp_dir().join(format!("shopwise-spool-{}.jsonl", Uuid::new_v4()));
        InteractionTracker::new(spool, "http://127.0.0.1:9/recommendations/track/batch")
    }

    #[test]
    fn record_appends_and_pending_parses() {
        let tracker = tracker();

        tracker.record("p-1", InteractionKind::View);
        tracker.record("p-2", InteractionKind::Purchase);

        let pending = tracker.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].product_id, "p-1");
        assert_eq!(pending[0].kind, InteractionKind::View);
        assert_eq!(pending[1].kind, InteractionKind::Purchase);
        assert_ne!(pending[0].event_id, pending[1].event_id);

        std::fs::remove_file(&tracker.spool_path).ok();
    }

    #[test]
    fn pending_skips_corrupt_lines() {
        let tracker = tracker();

        tracker.record("p-1", InteractionKind::Cart);
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(&tracker.spool_path)
                .unwrap();
            writeln!(file, "not json").unwrap();
        }
        tracker.record("p-2", InteractionKind::Wishlist);

        assert_eq!(tracker.pending().len(), 2);

        std::fs::remove_file(&tracker.spool_path).ok();
    }

    #[test]
    fn clearing_a_delivered_batch_keeps_later_events() {
        let tracker = tracker();
        tracker.record("p-1", InteractionKind::View);

        let snapshot = tracker.pending();
        // Recorded while the snapshot batch is still in flight.
        tracker.record("p-2", InteractionKind::Cart);

        let delivered: HashSet<String> = snapshot
            .iter()
            .map(|event| event.event_id.clone())
            .collect();
        tracker.retain_undelivered(&delivered).unwrap();

        let remaining = tracker.pending();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].product_id, "p-2");
        assert_eq!(remaining[0].kind, InteractionKind::Cart);

        std::fs::remove_file(&tracker.spool_path).ok();
    }

    #[tokio::test]
    async fn empty_spool_flush_is_a_noop() {
        let tracker = tracker();
        // No events recorded: no network attempt, nothing to clear.
        assert!(matches!(tracker.flush().await, Ok(0)));
    }

    #[tokio::test]
    async fn concurrent_flush_is_rejected() {
        let tracker = tracker();
        tracker.record("p-1", InteractionKind::View);

        tracker.in_flight.store(true, Ordering::Release);
        assert!(matches!(tracker.flush().await, Err(FlushError::InFlight)));

        // The guard holder clears the flag; later flush attempts may run.
        tracker.in_flight.store(false, Ordering::Release);
        assert_eq!(tracker.pending().len(), 1);

        std::fs::remove_file(&tracker.spool_path).ok();
    }

    #[tokio::test]
    async fn failed_delivery_keeps_spool_and_backs_off() {
        let tracker = tracker();
        tracker.record("p-1", InteractionKind::View);

        let base = Duration::from_secs(30);
        assert_eq!(tracker.next_delay(base), base);

        // Port 9 (discard) refuses connections; delivery fails.
        assert!(tracker.flush().await.is_err());
        assert_eq!(tracker.pending().len(), 1);
        assert_eq!(tracker.next_delay(base), base * 2);

        assert!(tracker.flush().await.is_err());
        assert_eq!(tracker.next_delay(base), base * 4);

        // Backoff is capped.
        tracker
            .consecutive_failures
            .store(MAX_BACKOFF_SHIFT + 10, Ordering::Relaxed);
        assert_eq!(tracker.next_delay(base), base * 2_u32.pow(MAX_BACKOFF_SHIFT));

        std::fs::remove_file(&tracker.spool_path).ok();
    }
}
