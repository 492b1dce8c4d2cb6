// ===============================
// src/intervals.rs (cumulative snapshots -> delta intervals)
// ===============================
//
// Snapshots carry "sold so far". For one show and a window [start, end]:
// - baseline  = latest snapshot strictly before start (if any)
// - inside    = snapshots dated within the window, one per date (latest wins)
// - intervals = (prev.date, next.date], the first one clipped to start
//
// Negative deltas (later report shows fewer tickets) are clamped to zero.
// Without any snapshot up to `end` nothing can be estimated; the result is
// empty rather than an error.
//
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::{DateRange, Interval, TicketSnapshot};
use crate::metrics::CLAMPED_DELTAS;

/// One point per date; when several reports share a date the latest
/// `reported_at` wins. Input order does not matter.
pub fn dedupe_by_date(snapshots: &[TicketSnapshot]) -> Vec<&TicketSnapshot> {
    let mut sorted: Vec<&TicketSnapshot> = snapshots.iter().collect();
    sorted.sort_by(|a, b| {
        a.effective_date()
            .cmp(&b.effective_date())
            .then(a.reported_at.cmp(&b.reported_at))
    });

    let mut out: Vec<&TicketSnapshot> = Vec::with_capacity(sorted.len());
    for snap in sorted {
        let same_day = out
            .last()
            .map(|last| last.effective_date() == snap.effective_date())
            .unwrap_or(false);
        if same_day {
            out.pop();
        }
        out.push(snap);
    }
    out
}

/// Clamped `(tickets, revenue)` delta between two cumulative reports.
pub fn clamped_delta(prev: &TicketSnapshot, next: &TicketSnapshot) -> (i64, Decimal) {
    let tickets = next.quantity_sold - prev.quantity_sold;
    let revenue = next.revenue - prev.revenue;
    if tickets < 0 || revenue < Decimal::ZERO {
        CLAMPED_DELTAS.inc();
        debug!(
            show = %next.show_id,
            from = %prev.effective_date(),
            to = %next.effective_date(),
            tickets,
            %revenue,
            "negative cumulative delta clamped to zero"
        );
    }
    (tickets.max(0), revenue.max(Decimal::ZERO))
}

pub fn build_intervals(snapshots: &[TicketSnapshot], window: DateRange) -> Vec<Interval> {
    let points = dedupe_by_date(snapshots);

    let baseline = points
        .iter()
        .filter(|s| s.effective_date() < window.start)
        .last()
        .copied();
    let inside: Vec<&TicketSnapshot> = points
        .iter()
        .filter(|s| window.contains(s.effective_date()))
        .copied()
        .collect();

    if inside.is_empty() {
        return Vec::new();
    }

    let mut intervals = Vec::with_capacity(inside.len());
    let (mut prev, rest) = match baseline {
        Some(base) => (base, &inside[..]),
        // first observation becomes the baseline
        None => (inside[0], &inside[1..]),
    };

    for &next in rest {
        let next_date = next.effective_date();
        let start_date = (prev.effective_date() + Duration::days(1)).max(window.start);
        let (tickets_delta, revenue_delta) = clamped_delta(prev, next);
        intervals.push(Interval {
            start_date,
            end_date: next_date,
            tickets_delta,
            revenue_delta,
            is_estimated: span_days(start_date, next_date) > 1,
        });
        prev = next;
    }
    intervals
}

fn span_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn snap(m: u32, day: u32, hour: u32, qty: i64, rev: Decimal) -> TicketSnapshot {
        TicketSnapshot {
            show_id: "show-1".into(),
            quantity_sold: qty,
            revenue: rev,
            reported_at: Utc.with_ymd_and_hms(2024, m, day, hour, 0, 0).unwrap(),
            sale_date: None,
        }
    }

    fn window(a: NaiveDate, b: NaiveDate) -> DateRange {
        DateRange::new(a, b).unwrap()
    }

    #[test]
    fn empty_without_observations() {
        assert!(build_intervals(&[], window(d(3, 1), d(3, 31))).is_empty());
        // only data after the window
        let snaps = vec![snap(4, 2, 9, 10, dec!(100))];
        assert!(build_intervals(&snaps, window(d(3, 1), d(3, 31))).is_empty());
    }

    #[test]
    fn baseline_only_gives_nothing_to_spread() {
        let snaps = vec![snap(2, 20, 9, 10, dec!(100))];
        assert!(build_intervals(&snaps, window(d(3, 1), d(3, 31))).is_empty());
    }

    #[test]
    fn first_inside_interval_starts_at_window_start() {
        let snaps = vec![snap(2, 20, 9, 100, dec!(1000)), snap(3, 5, 9, 150, dec!(1500))];
        let iv = build_intervals(&snaps, window(d(3, 1), d(3, 31)));
        assert_eq!(iv.len(), 1);
        assert_eq!(iv[0].start_date, d(3, 1));
        assert_eq!(iv[0].end_date, d(3, 5));
        assert_eq!(iv[0].tickets_delta, 50);
        assert_eq!(iv[0].revenue_delta, dec!(500));
        assert!(iv[0].is_estimated);
        assert_eq!(iv[0].days(), 5);
    }

    #[test]
    fn report_on_window_start_is_exact() {
        let snaps = vec![snap(2, 20, 9, 100, dec!(1000)), snap(3, 1, 9, 120, dec!(1200))];
        let iv = build_intervals(&snaps, window(d(3, 1), d(3, 31)));
        assert_eq!(iv.len(), 1);
        assert!(!iv[0].is_estimated);
        assert_eq!(iv[0].days(), 1);
    }

    #[test]
    fn consecutive_days_are_exact_gaps_are_estimated() {
        let snaps = vec![
            snap(3, 1, 9, 100, dec!(1000)),
            snap(3, 2, 9, 110, dec!(1100)),
            snap(3, 12, 9, 310, dec!(3100)),
        ];
        let iv = build_intervals(&snaps, window(d(3, 1), d(3, 31)));
        assert_eq!(iv.len(), 2);
        assert_eq!((iv[0].start_date, iv[0].end_date, iv[0].is_estimated), (d(3, 2), d(3, 2), false));
        assert_eq!((iv[1].start_date, iv[1].end_date, iv[1].is_estimated), (d(3, 3), d(3, 12), true));
        assert_eq!(iv[1].tickets_delta, 200);
        assert_eq!(iv[1].days(), 10);
    }

    #[test]
    fn decreasing_cumulative_is_clamped() {
        let snaps = vec![snap(3, 1, 9, 300, dec!(3000)), snap(3, 4, 9, 250, dec!(2500))];
        let iv = build_intervals(&snaps, window(d(3, 1), d(3, 31)));
        assert_eq!(iv.len(), 1);
        assert_eq!(iv[0].tickets_delta, 0);
        assert_eq!(iv[0].revenue_delta, Decimal::ZERO);
    }

    #[test]
    fn same_day_reports_keep_latest() {
        let snaps = vec![
            snap(3, 1, 9, 100, dec!(1000)),
            snap(3, 3, 18, 140, dec!(1400)),
            snap(3, 3, 8, 120, dec!(1200)),
        ];
        let iv = build_intervals(&snaps, window(d(3, 1), d(3, 31)));
        assert_eq!(iv.len(), 1);
        assert_eq!(iv[0].tickets_delta, 40);
    }

    #[test]
    fn intervals_partition_observed_range() {
        let snaps = vec![
            snap(2, 27, 9, 10, dec!(100)),
            snap(3, 2, 9, 20, dec!(200)),
            snap(3, 3, 9, 25, dec!(250)),
            snap(3, 9, 9, 60, dec!(600)),
        ];
        let iv = build_intervals(&snaps, window(d(3, 1), d(3, 31)));
        assert_eq!(iv.first().unwrap().start_date, d(3, 1));
        for pair in iv.windows(2) {
            assert_eq!(pair[0].end_date + Duration::days(1), pair[1].start_date);
        }
        assert_eq!(iv.iter().map(|i| i.tickets_delta).sum::<i64>(), 50);
    }
}
