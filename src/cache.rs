// ===============================
// src/cache.rs (client-side daily series cache)
// ===============================
//
// Opaque key-value collaborator. The engine reuses the cached prefix of a
// series and recomputes everything an interval crossing `cached_up_to` can
// touch: late reports for the most recent day must never be served stale, and
// a delta spread across the boundary must not be counted on both sides.
//
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use ahash::AHashMap as HashMap;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{DailySalesPoint, TicketSnapshot};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSeries {
    pub data: Vec<DailySalesPoint>,
    pub cached_up_to: NaiveDate,
}

pub trait SeriesCache: Send + Sync {
    fn get(&self, prefs_key: &str, entity_ids: &[String]) -> Option<CachedSeries>;
    fn put(&self, prefs_key: &str, entity_ids: &[String], data: &[DailySalesPoint]) -> Result<(), StoreError>;
}

fn slot_key(prefs_key: &str, entity_ids: &[String]) -> String {
    let mut ids = entity_ids.to_vec();
    ids.sort();
    format!("{prefs_key}#{}", ids.join(","))
}

fn to_entry(data: &[DailySalesPoint]) -> Option<CachedSeries> {
    let cached_up_to = data.iter().map(|p| p.date).max()?;
    Some(CachedSeries { data: data.to_vec(), cached_up_to })
}

/// First date whose value can change once data past `cached_up_to` is known.
///
/// Per show, the interval ending on or after `cached_up_to` starts the day
/// after the show's last report before it. The earliest such day over all
/// shows (never before `window_start`, never after `cached_up_to`) is where
/// the fresh computation has to begin.
pub fn recompute_from(
    snapshots: &HashMap<String, Vec<TicketSnapshot>>,
    cached_up_to: NaiveDate,
    window_start: NaiveDate,
) -> NaiveDate {
    snapshots
        .values()
        .filter_map(|snaps| {
            snaps
                .iter()
                .map(|s| s.effective_date())
                .filter(|d| *d < cached_up_to)
                .max()
        })
        .min()
        .map(|last| last + Duration::days(1))
        .unwrap_or(cached_up_to)
        .clamp(window_start, cached_up_to)
}

/// Cached values for dates before `from`, fresh values for the rest.
/// `from` never lies past `cached_up_to`, so the boundary day is always fresh.
pub fn merge_cached(
    cached: &CachedSeries,
    fresh: Vec<DailySalesPoint>,
    from: NaiveDate,
) -> Vec<DailySalesPoint> {
    let from = from.min(cached.cached_up_to);
    let mut merged: BTreeMap<(String, NaiveDate), DailySalesPoint> = cached
        .data
        .iter()
        .filter(|p| p.date < from)
        .map(|p| ((p.entity_id.clone(), p.date), p.clone()))
        .collect();
    for p in fresh.into_iter().filter(|p| p.date >= from) {
        merged.insert((p.entity_id.clone(), p.date), p);
    }
    merged.into_values().collect()
}

// ===== In-memory =====

#[derive(Debug, Default)]
pub struct MemoryCache {
    slots: Mutex<BTreeMap<String, CachedSeries>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesCache for MemoryCache {
    fn get(&self, prefs_key: &str, entity_ids: &[String]) -> Option<CachedSeries> {
        let slots = self.slots.lock().ok()?;
        slots.get(&slot_key(prefs_key, entity_ids)).cloned()
    }

    fn put(&self, prefs_key: &str, entity_ids: &[String], data: &[DailySalesPoint]) -> Result<(), StoreError> {
        let Some(entry) = to_entry(data) else {
            return Ok(());
        };
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| StoreError::Unavailable("cache lock poisoned".into()))?;
        slots.insert(slot_key(prefs_key, entity_ids), entry);
        Ok(())
    }
}

// ===== JSON file =====

/// Whole cache kept in one JSON file; read on `get`, rewritten on `put`.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn read_all(&self) -> Result<BTreeMap<String, CachedSeries>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| StoreError::Decode(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Unavailable(e.to_string())),
        }
    }
}

impl SeriesCache for FileCache {
    fn get(&self, prefs_key: &str, entity_ids: &[String]) -> Option<CachedSeries> {
        let _guard = self.lock.lock().ok()?;
        match self.read_all() {
            Ok(mut all) => all.remove(&slot_key(prefs_key, entity_ids)),
            Err(e) => {
                warn!(path = %self.path.display(), %e, "series cache unreadable; ignoring");
                None
            }
        }
    }

    fn put(&self, prefs_key: &str, entity_ids: &[String], data: &[DailySalesPoint]) -> Result<(), StoreError> {
        let Some(entry) = to_entry(data) else {
            return Ok(());
        };
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Unavailable("cache lock poisoned".into()))?;
        // a corrupt file is replaced; an unreadable one is left alone
        let mut all = match self.read_all() {
            Ok(all) => all,
            Err(StoreError::Decode(e)) => {
                warn!(path = %self.path.display(), %e, "series cache corrupt; starting over");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        all.insert(slot_key(prefs_key, entity_ids), entry);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        let raw = serde_json::to_string(&all).map_err(|e| StoreError::Decode(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n - 1)
    }

    fn point(n: i64, tickets: i64) -> DailySalesPoint {
        let mut p = DailySalesPoint::empty(day(n), "stop-1");
        p.tickets = tickets;
        p
    }

    #[test]
    fn boundary_day_is_always_fresh() {
        // cached D1..D10 (tickets = 1), fresh D5..D15 (tickets = 2)
        let cached = to_entry(&(1..=10).map(|n| point(n, 1)).collect::<Vec<_>>()).unwrap();
        assert_eq!(cached.cached_up_to, day(10));
        let fresh: Vec<_> = (5..=15).map(|n| point(n, 2)).collect();

        let merged = merge_cached(&cached, fresh, day(10));
        assert_eq!(merged.len(), 15);
        assert!(merged[..4].iter().all(|p| p.tickets == 1));
        assert!(merged[4..].iter().all(|p| p.tickets == 2));
        assert_eq!(merged[9].date, day(10));
        assert_eq!(merged[9].tickets, 2);
    }

    #[test]
    fn cached_boundary_is_dropped_when_fresh_is_missing() {
        let cached = to_entry(&(1..=10).map(|n| point(n, 1)).collect::<Vec<_>>()).unwrap();
        let merged = merge_cached(&cached, vec![point(11, 3)], day(10));
        assert_eq!(merged.len(), 10);
        assert!(merged.iter().all(|p| p.date != day(10)));
    }

    #[test]
    fn earlier_cutoff_drops_cached_days_and_stale_fresh_days() {
        let cached = to_entry(&(1..=10).map(|n| point(n, 1)).collect::<Vec<_>>()).unwrap();
        // fresh covers D3.. but only D6 onwards may replace the cache
        let fresh: Vec<_> = (3..=12).map(|n| point(n, 2)).collect();
        let merged = merge_cached(&cached, fresh, day(6));
        assert_eq!(merged.len(), 12);
        assert!(merged[..5].iter().all(|p| p.tickets == 1));
        assert!(merged[5..].iter().all(|p| p.tickets == 2));
    }

    fn snap(show: &str, n: i64) -> TicketSnapshot {
        TicketSnapshot {
            show_id: show.into(),
            quantity_sold: n,
            revenue: rust_decimal::Decimal::ZERO,
            reported_at: Utc.from_utc_datetime(&day(n).and_hms_opt(12, 0, 0).unwrap()),
            sale_date: None,
        }
    }

    #[test]
    fn recompute_starts_after_last_report_before_boundary() {
        let mut snaps: HashMap<String, Vec<TicketSnapshot>> = HashMap::new();
        snaps.insert("a".into(), vec![snap("a", 1), snap("a", 4), snap("a", 12)]);
        snaps.insert("b".into(), vec![snap("b", 8), snap("b", 10)]);
        // a: last before D10 is D4, b: D8 -> earliest is D5
        assert_eq!(recompute_from(&snaps, day(10), day(1)), day(5));
        // never before the window start
        assert_eq!(recompute_from(&snaps, day(10), day(7)), day(7));
        // nothing before the boundary: only the boundary day is fresh
        snaps.clear();
        snaps.insert("c".into(), vec![snap("c", 11)]);
        assert_eq!(recompute_from(&snaps, day(10), day(1)), day(10));
    }

    #[test]
    fn memory_cache_keys_ignore_entity_order() {
        let cache = MemoryCache::new();
        let data = vec![point(1, 1), point(2, 1)];
        cache.put("k", &["b".into(), "a".into()], &data).unwrap();
        let got = cache.get("k", &["a".into(), "b".into()]).unwrap();
        assert_eq!(got.cached_up_to, day(2));
        assert!(cache.get("other", &["a".into(), "b".into()]).is_none());
    }

    #[test]
    fn empty_series_is_not_stored() {
        let cache = MemoryCache::new();
        cache.put("k", &[], &[]).unwrap();
        assert!(cache.get("k", &[]).is_none());
    }

    #[test]
    fn file_cache_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("series.json");
        let cache = FileCache::new(&path);
        assert!(cache.get("k", &["a".into()]).is_none());

        cache.put("k", &["a".into()], &[point(3, 9)]).unwrap();
        let reopened = FileCache::new(&path);
        let got = reopened.get("k", &["a".into()]).unwrap();
        assert_eq!(got.data[0].tickets, 9);
        assert_eq!(got.cached_up_to, day(3));
    }

    #[test]
    fn file_cache_replaces_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cache = FileCache::new(&path);
        assert!(cache.get("k", &["a".into()]).is_none());

        cache.put("k", &["a".into()], &[point(2, 4)]).unwrap();
        assert_eq!(cache.get("k", &["a".into()]).unwrap().data[0].tickets, 4);
    }

    #[test]
    fn file_cache_write_fails_when_file_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be cannot be read as text
        let path = dir.path().join("series.json");
        std::fs::create_dir(&path).unwrap();
        let cache = FileCache::new(&path);
        let err = cache.put("k", &["a".into()], &[point(1, 1)]).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(path.is_dir());
    }
}
