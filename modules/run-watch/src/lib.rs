//! Audit list state and the status polling loop.
//!
//! This is the console's only mutable state: the audit entries currently
//! on screen. Every lifecycle transition happens server-side; the watcher
//! merely observes pending runs until none is left, one independent
//! status request per run and per tick.

use std::time::Duration;

use audit_api::{ApiClient, AuditListItem, RunStatusResponse};
use tokio::time::MissedTickBehavior;
use tracing::warn;

pub const DEFAULT_INTERVAL_MS: u64 = 3_000;

/// Ordered audit entries, newest first when the backend dated them.
#[derive(Debug, Default, Clone)]
pub struct WatchList {
    entries: Vec<AuditListItem>,
}

impl WatchList {
    /// Build from a fresh list response. Entries with a parseable
    /// `createdAt` are ordered newest first, comparing instants so mixed
    /// UTC offsets cannot misorder; the rest keep their server order, last.
    pub fn from_list(mut items: Vec<AuditListItem>) -> Self {
        items.sort_by(|a, b| {
            console_core::rfc3339_desc(a.created_at.as_deref(), b.created_at.as_deref())
        });
        WatchList { entries: items }
    }

    pub fn entries(&self) -> &[AuditListItem] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, run_id: i64) -> Option<&AuditListItem> {
        self.entries.iter().find(|e| e.run_id == run_id)
    }

    /// Optimistic insert after a successful submission: any entry with the
    /// same run id is replaced, and the new one goes first.
    pub fn upsert_front(&mut self, item: AuditListItem) {
        self.entries.retain(|e| e.run_id != item.run_id);
        self.entries.insert(0, item);
    }

    /// Runs that still need polling.
    pub fn pending_runs(&self) -> Vec<i64> {
        self.entries
            .iter()
            .filter(|e| !e.status.is_terminal())
            .map(|e| e.run_id)
            .collect()
    }

    /// True once every tracked run reached a terminal status. An empty
    /// list is settled.
    pub fn is_settled(&self) -> bool {
        self.entries.iter().all(|e| e.status.is_terminal())
    }

    /// Merge one status update into the matching entry. Only fields the
    /// status endpoint actually returned overwrite local state; everything
    /// else is preserved. Updates for untracked runs are dropped.
    pub fn apply(&mut self, update: &RunStatusResponse) {
        let Some(entry) = self.entries.iter_mut().find(|e| e.run_id == update.run_id) else {
            return;
        };
        entry.status = update.status;
        if update.result_json.is_some() {
            entry.result_json = update.result_json.clone();
        }
        if update.finished_at.is_some() {
            entry.finished_at = update.finished_at.clone();
        }
        if update.report_token.is_some() {
            entry.report_token = update.report_token.clone();
        }
    }
}

/// One polling pass: a concurrent status request per pending run, each on
/// its own task so one failure never cancels the others. Failed polls are
/// logged and retried on the next tick. Returns how many updates landed.
pub async fn poll_once(client: &ApiClient, list: &mut WatchList) -> usize {
    let pending = list.pending_runs();
    let mut tasks = Vec::with_capacity(pending.len());
    for run_id in pending {
        let client = client.clone();
        tasks.push(tokio::spawn(
            async move { (run_id, client.run_status(run_id).await) },
        ));
    }
    let mut applied = 0;
    for task in tasks {
        let Ok((run_id, result)) = task.await else {
            continue;
        };
        match result {
            Ok(update) => {
                list.apply(&update);
                applied += 1;
            }
            Err(err) => warn!(run_id, error = %err, "status poll failed"),
        }
    }
    applied
}

/// Poll every `interval` until the list settles, calling `on_tick` after
/// each pass. The first pass runs one interval after entry, mirroring the
/// backend's own queue-then-run cadence. A zero `interval` is floored to
/// one millisecond.
pub async fn watch<F>(client: &ApiClient, list: &mut WatchList, interval: Duration, mut on_tick: F)
where
    F: FnMut(&WatchList),
{
    if list.is_settled() {
        return;
    }
    // tokio's interval panics on a zero period.
    let period = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The immediate first tick of a fresh interval.
    ticker.tick().await;
    while !list.is_settled() {
        ticker.tick().await;
        poll_once(client, list).await;
        on_tick(list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_api::RunStatus;

    fn item(run_id: i64, status: RunStatus) -> AuditListItem {
        AuditListItem {
            audit_id: run_id,
            input_url: format!("site-{run_id}.example"),
            normalized_url: format!("https://site-{run_id}.example/"),
            run_id,
            status,
            created_at: None,
            finished_at: None,
            result_json: None,
            report_token: None,
        }
    }

    fn update(run_id: i64, status: RunStatus) -> RunStatusResponse {
        RunStatusResponse {
            run_id,
            audit_id: run_id,
            status,
            last_error: None,
            result_json: None,
            report_token: None,
            created_at: None,
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn from_list_orders_dated_entries_newest_first() {
        let mut older = item(1, RunStatus::Completed);
        older.created_at = Some("2025-08-20T08:00:00Z".to_string());
        let mut newer = item(2, RunStatus::Queued);
        newer.created_at = Some("2025-08-21T08:00:00Z".to_string());
        let list = WatchList::from_list(vec![older, newer]);
        let ids: Vec<i64> = list.entries().iter().map(|e| e.run_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn from_list_orders_by_instant_across_utc_offsets() {
        // 08:00+02:00 is 06:00 UTC, an hour older than 07:00Z, even though
        // the string compares bigger.
        let mut offset = item(1, RunStatus::Completed);
        offset.created_at = Some("2025-08-21T08:00:00+02:00".to_string());
        let mut utc = item(2, RunStatus::Completed);
        utc.created_at = Some("2025-08-21T07:00:00Z".to_string());
        let list = WatchList::from_list(vec![offset, utc]);
        let ids: Vec<i64> = list.entries().iter().map(|e| e.run_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn from_list_keeps_server_order_without_dates() {
        let list = WatchList::from_list(vec![
            item(5, RunStatus::Queued),
            item(3, RunStatus::Running),
            item(9, RunStatus::Completed),
        ]);
        let ids: Vec<i64> = list.entries().iter().map(|e| e.run_id).collect();
        assert_eq!(ids, vec![5, 3, 9]);
    }

    #[test]
    fn upsert_front_prepends_and_replaces_by_run_id() {
        let mut list = WatchList::from_list(vec![item(1, RunStatus::Completed)]);
        list.upsert_front(item(2, RunStatus::Queued));
        assert_eq!(list.len(), 2);
        assert_eq!(list.entries()[0].run_id, 2);

        // Re-submitting the same run must not duplicate it.
        list.upsert_front(item(1, RunStatus::Queued));
        assert_eq!(list.len(), 2);
        assert_eq!(list.entries()[0].run_id, 1);
        assert_eq!(list.entries()[0].status, RunStatus::Queued);
    }

    #[test]
    fn pending_runs_excludes_terminal_entries() {
        let list = WatchList::from_list(vec![
            item(1, RunStatus::Completed),
            item(2, RunStatus::Running),
            item(3, RunStatus::Failed),
            item(4, RunStatus::Queued),
        ]);
        assert_eq!(list.pending_runs(), vec![2, 4]);
        assert!(!list.is_settled());
    }

    #[test]
    fn empty_list_is_settled() {
        assert!(WatchList::default().is_settled());
    }

    #[test]
    fn apply_merges_only_returned_fields() {
        let mut seeded = item(1, RunStatus::Running);
        seeded.result_json = Some("{\"old\":true}".to_string());
        seeded.report_token = Some("tok-old".to_string());
        let mut list = WatchList::from_list(vec![seeded]);

        // A bare status update keeps the existing payload fields.
        list.apply(&update(1, RunStatus::Running));
        let entry = list.get(1).unwrap();
        assert_eq!(entry.result_json.as_deref(), Some("{\"old\":true}"));
        assert_eq!(entry.report_token.as_deref(), Some("tok-old"));

        // A terminal update with a payload overwrites them.
        let mut done = update(1, RunStatus::Completed);
        done.result_json = Some("{\"new\":true}".to_string());
        done.finished_at = Some("2025-08-21T09:00:00Z".to_string());
        list.apply(&done);
        let entry = list.get(1).unwrap();
        assert_eq!(entry.status, RunStatus::Completed);
        assert_eq!(entry.result_json.as_deref(), Some("{\"new\":true}"));
        assert_eq!(entry.finished_at.as_deref(), Some("2025-08-21T09:00:00Z"));
        assert_eq!(entry.report_token.as_deref(), Some("tok-old"));
    }

    #[test]
    fn apply_drops_updates_for_untracked_runs() {
        let mut list = WatchList::from_list(vec![item(1, RunStatus::Running)]);
        list.apply(&update(999, RunStatus::Completed));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(1).unwrap().status, RunStatus::Running);
        assert!(list.get(999).is_none());
    }
}
