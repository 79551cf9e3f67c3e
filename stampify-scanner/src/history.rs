//! Scan history cache
//!
//! Holds the stamps the current operator created for the active event,
//! newest first. The server is the source of truth: `replace_all` rebuilds the
//! list wholesale, `prepend` adds an optimistic entry right after a successful
//! check-in and is a no-op for stamp ids already present.

use crate::client::StampApi;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use stampify_common::events::{EventBus, ScanEvent};
use stampify_common::models::StampRecord;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Running statistics shown next to the history table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanStats {
    pub total: usize,
    pub today: usize,
    pub unique_members: usize,
    /// Scans per minute over the trailing rate window
    pub scans_per_minute: f64,
    /// Share of SUCCESS stamps, 0-100
    pub success_rate: u32,
}

/// Per-session stamp list for one event
#[derive(Debug, Clone, Default)]
pub struct ScanHistory {
    event_id: Option<i64>,
    records: Vec<StampRecord>,
}

impl ScanHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_id(&self) -> Option<i64> {
        self.event_id
    }

    pub fn records(&self) -> &[StampRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Switch to another event, dropping everything cached for the previous one
    pub fn reset(&mut self, event_id: i64) {
        self.event_id = Some(event_id);
        self.records.clear();
    }

    /// Replace the whole list with a server snapshot
    ///
    /// Records for other events are dropped; the result is sorted newest first
    /// and de-duplicated by stamp id.
    pub fn replace_all(&mut self, event_id: i64, records: Vec<StampRecord>) {
        let mut seen = HashSet::new();
        let mut records: Vec<StampRecord> = records
            .into_iter()
            .filter(|r| r.event_id == event_id)
            .filter(|r| seen.insert(r.id))
            .collect();
        // None sorts first ascending, so reverse ordering puts undated records last
        records.sort_by(|a, b| b.stamped_at.cmp(&a.stamped_at).then(b.id.cmp(&a.id)));

        self.event_id = Some(event_id);
        self.records = records;
    }

    /// Optimistically insert a freshly created stamp
    ///
    /// Returns false if the stamp belongs to another event or is already listed.
    pub fn prepend(&mut self, record: StampRecord) -> bool {
        if self.event_id.is_some_and(|id| id != record.event_id) {
            return false;
        }
        if self.records.iter().any(|r| r.id == record.id) {
            return false;
        }
        self.event_id = Some(record.event_id);
        self.records.insert(0, record);
        true
    }

    /// Compute statistics as of `now`
    pub fn stats(&self, now: DateTime<Utc>, rate_window: ChronoDuration) -> ScanStats {
        let total = self.records.len();
        let today = now.date_naive();

        let today_count = self
            .records
            .iter()
            .filter(|r| r.stamped_at.is_some_and(|t| t.date_naive() == today))
            .count();

        let unique_members = self
            .records
            .iter()
            .map(|r| match &r.member_id {
                Some(id) => format!("m:{}", id),
                None => format!("p:{}", r.passport_id),
            })
            .collect::<HashSet<_>>()
            .len();

        let window_start = now - rate_window;
        let in_window = self
            .records
            .iter()
            .filter(|r| r.stamped_at.is_some_and(|t| t > window_start && t <= now))
            .count();
        let window_minutes = rate_window.num_seconds() as f64 / 60.0;
        let scans_per_minute = if window_minutes > 0.0 {
            (in_window as f64 / window_minutes * 10.0).round() / 10.0
        } else {
            0.0
        };

        let successes = self.records.iter().filter(|r| r.counts_as_attendance()).count();
        let success_rate = if total == 0 {
            0
        } else {
            ((successes as f64 / total as f64) * 100.0).round() as u32
        };

        ScanStats {
            total,
            today: today_count,
            unique_members,
            scans_per_minute,
            success_rate,
        }
    }
}

/// Shared handle used by the service and the refresh task
pub type SharedHistory = Arc<RwLock<ScanHistory>>;

/// Fetch the scanner's stamps and rebuild the cache for `event_id`
///
/// The network call happens before the write lock is taken, so readers are
/// never blocked on the backend.
pub async fn refresh_history(
    api: &dyn StampApi,
    history: &SharedHistory,
    event_bus: &EventBus,
    scanner_id: i64,
    event_id: i64,
) -> Result<usize, crate::client::ClientError> {
    let records = api.stamps_for_scanner(scanner_id).await?;

    let count = {
        let mut guard = history.write().await;
        // event switched while the request was in flight; this snapshot is stale
        if guard.event_id().is_some_and(|id| id != event_id) {
            debug!(event_id, "Discarding history snapshot for previous event");
            return Ok(guard.len());
        }
        guard.replace_all(event_id, records);
        guard.len()
    };

    event_bus.emit_lossy(ScanEvent::HistoryRefreshed {
        event_id,
        count,
        timestamp: stampify_common::time::now(),
    });
    Ok(count)
}

/// Periodically rebuild the cache until `cancel` fires
///
/// `target` is read at each tick so an event switch takes effect on the next
/// refresh. Failures are logged and retried on the next tick.
pub fn spawn_history_refresh<F>(
    api: Arc<dyn StampApi>,
    history: SharedHistory,
    event_bus: EventBus,
    interval: Duration,
    cancel: CancellationToken,
    target: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn() -> Option<(i64, i64)> + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!("History refresh task started (every {:?})", interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("History refresh task stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let Some((scanner_id, event_id)) = target() else {
                        continue;
                    };
                    match refresh_history(api.as_ref(), &history, &event_bus, scanner_id, event_id).await {
                        Ok(count) => debug!(event_id, count, "History refreshed"),
                        Err(e) => warn!(event_id, "History refresh failed: {}", e),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stampify_common::models::ScanStatus;

    fn record(id: i64, event_id: i64, member: &str, minute: u32) -> StampRecord {
        StampRecord {
            id,
            passport_id: id * 10,
            event_id,
            scanner_id: Some(5),
            member_id: Some(member.to_string()),
            member_name: None,
            event_name: None,
            stamped_at: Some(Utc.with_ymd_and_hms(2025, 3, 14, 9, minute, 0).unwrap()),
            status: ScanStatus::Success,
            valid: true,
        }
    }

    #[test]
    fn test_replace_all_filters_sorts_and_dedups() {
        let mut history = ScanHistory::new();
        history.replace_all(
            3,
            vec![
                record(1, 3, "a", 1),
                record(2, 4, "b", 2),
                record(3, 3, "c", 5),
                record(3, 3, "c", 5),
            ],
        );
        let ids: Vec<i64> = history.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(history.event_id(), Some(3));
    }

    #[test]
    fn test_prepend_dedups_by_id() {
        let mut history = ScanHistory::new();
        history.reset(3);
        assert!(history.prepend(record(7, 3, "a", 1)));
        assert!(!history.prepend(record(7, 3, "a", 1)));
        assert!(!history.prepend(record(8, 4, "b", 1)));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_refresh_supersedes_optimistic_entries() {
        let mut history = ScanHistory::new();
        history.reset(3);
        history.prepend(record(7, 3, "a", 1));
        history.replace_all(3, vec![record(7, 3, "a", 1), record(6, 3, "b", 0)]);
        assert_eq!(history.len(), 2);
        assert_eq!(history.records()[0].id, 7);
    }

    #[test]
    fn test_stats() {
        let mut history = ScanHistory::new();
        let mut failed = record(4, 3, "a", 8);
        failed.status = ScanStatus::Failed;
        history.replace_all(
            3,
            vec![
                record(1, 3, "a", 0),
                record(2, 3, "b", 6),
                record(3, 3, "c", 9),
                failed,
            ],
        );

        let now = Utc.with_ymd_and_hms(2025, 3, 14, 9, 10, 0).unwrap();
        let stats = history.stats(now, ChronoDuration::minutes(5));
        assert_eq!(stats.total, 4);
        assert_eq!(stats.today, 4);
        assert_eq!(stats.unique_members, 3);
        // minutes 6, 8 and 9 fall inside (9:05, 9:10]
        assert_eq!(stats.scans_per_minute, 0.6);
        assert_eq!(stats.success_rate, 75);

        let tomorrow = Utc.with_ymd_and_hms(2025, 3, 15, 9, 10, 0).unwrap();
        let stats = history.stats(tomorrow, ChronoDuration::minutes(5));
        assert_eq!(stats.today, 0);
        assert_eq!(stats.scans_per_minute, 0.0);
    }

    #[test]
    fn test_empty_stats() {
        let stats = ScanHistory::new().stats(Utc::now(), ChronoDuration::minutes(5));
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0);
        assert_eq!(stats.scans_per_minute, 0.0);
    }
}
