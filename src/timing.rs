// ===============================
// src/timing.rs (when do tickets sell, relative to the show)
// ===============================
//
// Works on raw snapshot-to-snapshot deltas ("sale events"), not on the
// reconstructed daily series:
// - days-out buckets      (show date - sale date, caller boundaries)
// - weekday averages      (per distinct active date of that weekday)
// - velocity curve        (grouped by days-out, most days out first)
// - holiday vs. regular   (Norwegian calendar, per distinct active date)
// - per-show comparison   (avg days out, fill rate)
//
// Events of a show without a show date still count for weekday/holiday
// views and totals; they are left out of everything days-out based.
// A first report that arrives after the show's sales start carries sales of
// unknown dates: it counts in totals and per-show figures only.
//
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use ahash::AHashMap as HashMap;
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{ShowMeta, TicketSnapshot, TimingRecord};
use crate::error::EngineError;
use crate::holidays::{holiday_name, Holiday};
use crate::intervals::{clamped_delta, dedupe_by_date};

pub const DEFAULT_BUCKETS: [i64; 6] = [0, 7, 14, 30, 60, 90];

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// One sale event: what a show sold between two consecutive reports,
/// attributed to the later report's date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleEvent {
    pub show_id: String,
    pub sale_date: NaiveDate,
    pub quantity: i64,
    pub revenue: Decimal,
    /// First report of a show whose sales started on an earlier date.
    #[serde(default)]
    pub carried_in: bool,
}

/// The first report of a show counts its full cumulative figure. With a
/// known `sales_start` before that report the event is marked `carried_in`.
pub fn sale_events(snapshots: &[TicketSnapshot], sales_start: Option<NaiveDate>) -> Vec<SaleEvent> {
    let points = dedupe_by_date(snapshots);
    let mut out = Vec::with_capacity(points.len());
    let mut prev: Option<&TicketSnapshot> = None;

    for snap in points {
        let (quantity, revenue) = match prev {
            Some(p) => clamped_delta(p, snap),
            None => (snap.quantity_sold.max(0), snap.revenue.max(Decimal::ZERO)),
        };
        let carried_in = prev.is_none() && sales_start.is_some_and(|start| start < snap.effective_date());
        prev = Some(snap);
        if quantity == 0 && revenue == Decimal::ZERO {
            continue;
        }
        out.push(SaleEvent {
            show_id: snap.show_id.clone(),
            sale_date: snap.effective_date(),
            quantity,
            revenue,
            carried_in,
        });
    }
    out
}

pub fn timing_record(ev: &SaleEvent, show_date: NaiveDate) -> TimingRecord {
    TimingRecord {
        show_id: ev.show_id.clone(),
        sale_date: ev.sale_date,
        days_out: (show_date - ev.sale_date).num_days(),
        day_of_week: ev.sale_date.weekday(),
        is_holiday: holiday_name(ev.sale_date).is_some(),
        quantity: ev.quantity,
        revenue: ev.revenue,
    }
}

fn per_unit(total: i64, count: usize) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(total as f64 / count as f64)
    }
}

fn per_unit_money(total: Decimal, count: usize) -> Option<Decimal> {
    if count == 0 {
        None
    } else {
        Some((total / Decimal::from(count as i64)).round_dp(2))
    }
}

// ===== Days-out buckets =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaysOutBucket {
    pub bucket_label: String,
    pub min_days: i64,
    pub max_days: Option<i64>,
    pub tickets: i64,
    pub revenue: Decimal,
    pub percent_of_total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesTotals {
    pub tickets: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaysOutReport {
    pub buckets: Vec<DaysOutBucket>,
    /// Sales dated before the first boundary (after the show for the default).
    pub post_show: SalesTotals,
    pub average_days_out: Option<f64>,
}

/// Sorted, deduplicated boundaries that always start at or below zero.
pub fn normalize_boundaries(boundaries: &[i64]) -> Vec<i64> {
    let mut b: Vec<i64> = if boundaries.is_empty() {
        DEFAULT_BUCKETS.to_vec()
    } else {
        boundaries.to_vec()
    };
    b.sort_unstable();
    b.dedup();
    if b[0] > 0 {
        b.insert(0, 0);
    }
    b
}

fn bucket_label(min: i64, max: Option<i64>) -> String {
    match max {
        None => format!("{min}+ days"),
        Some(max) if max == min => format!("{min} days"),
        Some(max) => format!("{min}-{max} days"),
    }
}

pub fn days_out_report(records: &[TimingRecord], boundaries: &[i64]) -> DaysOutReport {
    let bounds = normalize_boundaries(boundaries);
    let mut buckets: Vec<DaysOutBucket> = bounds
        .iter()
        .enumerate()
        .map(|(i, &min)| {
            let max = bounds.get(i + 1).map(|next| next - 1);
            DaysOutBucket {
                bucket_label: bucket_label(min, max),
                min_days: min,
                max_days: max,
                tickets: 0,
                revenue: Decimal::ZERO,
                percent_of_total: 0.0,
            }
        })
        .collect();

    let mut post_show = SalesTotals::default();
    let mut total = 0_i64;
    let mut weighted_days = 0_i128;

    for r in records {
        total += r.quantity;
        weighted_days += r.days_out as i128 * r.quantity as i128;
        // last boundary <= days_out
        match bounds.partition_point(|b| *b <= r.days_out) {
            0 => {
                post_show.tickets += r.quantity;
                post_show.revenue += r.revenue;
            }
            n => {
                let bucket = &mut buckets[n - 1];
                bucket.tickets += r.quantity;
                bucket.revenue += r.revenue;
            }
        }
    }

    if total > 0 {
        for b in buckets.iter_mut() {
            b.percent_of_total = b.tickets as f64 * 100.0 / total as f64;
        }
    }
    let average_days_out = if total > 0 {
        Some(weighted_days as f64 / total as f64)
    } else {
        None
    };
    DaysOutReport { buckets, post_show, average_days_out }
}

// ===== Weekday =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekdayStats {
    pub weekday: Weekday,
    pub tickets: i64,
    pub revenue: Decimal,
    /// Distinct calendar dates on this weekday with any sale.
    pub occurrences: usize,
    pub avg_tickets: Option<f64>,
    pub avg_revenue: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekdayReport {
    pub days: Vec<WeekdayStats>,
    pub best: Option<Weekday>,
    pub worst: Option<Weekday>,
}

pub fn weekday_report(events: &[SaleEvent]) -> WeekdayReport {
    let mut tickets = [0_i64; 7];
    let mut revenue = [Decimal::ZERO; 7];
    let mut dates: [BTreeSet<NaiveDate>; 7] = Default::default();

    for ev in events {
        let i = ev.sale_date.weekday().num_days_from_monday() as usize;
        tickets[i] += ev.quantity;
        revenue[i] += ev.revenue;
        dates[i].insert(ev.sale_date);
    }

    let days: Vec<WeekdayStats> = WEEKDAYS
        .iter()
        .enumerate()
        .map(|(i, wd)| WeekdayStats {
            weekday: *wd,
            tickets: tickets[i],
            revenue: revenue[i],
            occurrences: dates[i].len(),
            avg_tickets: per_unit(tickets[i], dates[i].len()),
            avg_revenue: per_unit_money(revenue[i], dates[i].len()),
        })
        .collect();

    let ranked: Vec<(Weekday, f64)> = days
        .iter()
        .filter_map(|d| d.avg_tickets.map(|avg| (d.weekday, avg)))
        .collect();
    // strict comparisons keep the earliest weekday on ties
    let best = ranked
        .iter()
        .fold(None::<(Weekday, f64)>, |acc, &(wd, avg)| match acc {
            Some((_, b)) if b >= avg => acc,
            _ => Some((wd, avg)),
        })
        .map(|(wd, _)| wd);
    let worst = ranked
        .iter()
        .fold(None::<(Weekday, f64)>, |acc, &(wd, avg)| match acc {
            Some((_, w)) if w <= avg => acc,
            _ => Some((wd, avg)),
        })
        .map(|(wd, _)| wd);

    WeekdayReport { days, best, worst }
}

// ===== Velocity =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityPoint {
    pub days_out: i64,
    pub tickets: i64,
    pub unique_days: usize,
    pub avg_velocity: Option<f64>,
}

pub fn velocity_curve(records: &[TimingRecord]) -> Vec<VelocityPoint> {
    let mut groups: BTreeMap<i64, (i64, BTreeSet<NaiveDate>)> = BTreeMap::new();
    for r in records {
        let g = groups.entry(r.days_out).or_default();
        g.0 += r.quantity;
        g.1.insert(r.sale_date);
    }
    groups
        .into_iter()
        .rev()
        .map(|(days_out, (tickets, dates))| VelocityPoint {
            days_out,
            tickets,
            unique_days: dates.len(),
            avg_velocity: per_unit(tickets, dates.len()),
        })
        .collect()
}

// ===== Holidays =====

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayClassTotals {
    pub tickets: i64,
    pub revenue: Decimal,
    pub active_days: usize,
    pub avg_tickets_per_day: Option<f64>,
    pub avg_revenue_per_day: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayReport {
    pub holiday: DayClassTotals,
    pub regular: DayClassTotals,
    /// Holiday average per active day over the regular one.
    pub lift: Option<f64>,
    pub holidays_hit: Vec<Holiday>,
}

pub fn holiday_report(events: &[SaleEvent]) -> HolidayReport {
    let mut holiday = DayClassTotals::default();
    let mut regular = DayClassTotals::default();
    let mut holiday_dates: BTreeMap<NaiveDate, &'static str> = BTreeMap::new();
    let mut regular_dates: BTreeSet<NaiveDate> = BTreeSet::new();

    for ev in events {
        match holiday_name(ev.sale_date) {
            Some(name) => {
                holiday.tickets += ev.quantity;
                holiday.revenue += ev.revenue;
                holiday_dates.insert(ev.sale_date, name);
            }
            None => {
                regular.tickets += ev.quantity;
                regular.revenue += ev.revenue;
                regular_dates.insert(ev.sale_date);
            }
        }
    }

    for (totals, days) in [(&mut holiday, holiday_dates.len()), (&mut regular, regular_dates.len())] {
        totals.active_days = days;
        totals.avg_tickets_per_day = per_unit(totals.tickets, days);
        totals.avg_revenue_per_day = per_unit_money(totals.revenue, days);
    }

    let lift = match (holiday.avg_tickets_per_day, regular.avg_tickets_per_day) {
        (Some(h), Some(r)) if r > 0.0 => Some(h / r),
        _ => None,
    };
    let holidays_hit = holiday_dates
        .into_iter()
        .map(|(date, name)| Holiday { date, name })
        .collect();
    HolidayReport { holiday, regular, lift, holidays_hit }
}

// ===== Per-show comparison =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowTiming {
    pub show_id: String,
    pub show_date: Option<NaiveDate>,
    pub tickets: i64,
    pub revenue: Decimal,
    pub average_days_out: Option<f64>,
    pub capacity: Option<i64>,
    pub fill_rate: Option<f64>,
}

pub fn fill_rate(tickets: i64, capacity: Option<i64>) -> Option<f64> {
    match capacity {
        Some(c) if c > 0 => Some(tickets as f64 / c as f64),
        _ => None,
    }
}

// ===== Report =====

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimingAnalysis {
    DaysOut,
    Weekday,
    Velocity,
    Holiday,
    #[default]
    Full,
}

impl TimingAnalysis {
    fn wants(&self, part: TimingAnalysis) -> bool {
        *self == TimingAnalysis::Full || *self == part
    }
}

impl FromStr for TimingAnalysis {
    type Err = EngineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "days_out" | "daysout" | "days-out" => Ok(Self::DaysOut),
            "weekday" | "day_of_week" => Ok(Self::Weekday),
            "velocity" => Ok(Self::Velocity),
            "holiday" | "holidays" => Ok(Self::Holiday),
            "full" | "all" => Ok(Self::Full),
            other => Err(EngineError::Config(format!("unknown timing analysis: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingReport {
    pub total: SalesTotals,
    /// Sales from shows without a show date; no days-out view possible.
    pub untimed: SalesTotals,
    /// Sales reported before any dated report existed; no dated view possible.
    pub carried_in: SalesTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_out: Option<DaysOutReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekday: Option<WeekdayReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Vec<VelocityPoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holiday: Option<HolidayReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_comparison: Option<Vec<ShowTiming>>,
}

#[derive(Debug, Clone, Default)]
pub struct TimingAnalyzer {
    pub boundaries: Vec<i64>,
}

impl TimingAnalyzer {
    pub fn new(boundaries: Vec<i64>) -> Self {
        Self { boundaries }
    }

    pub fn analyze(
        &self,
        shows: &[ShowMeta],
        snapshots: &HashMap<String, Vec<TicketSnapshot>>,
        kind: TimingAnalysis,
        compare_shows: bool,
    ) -> TimingReport {
        let mut events: Vec<SaleEvent> = Vec::new();
        let mut records: Vec<TimingRecord> = Vec::new();
        let mut total = SalesTotals::default();
        let mut untimed = SalesTotals::default();
        let mut carried_in = SalesTotals::default();
        let mut comparison: Vec<ShowTiming> = Vec::new();

        for show in shows {
            let show_events = snapshots
                .get(&show.show_id)
                .map(|s| sale_events(s, show.sales_start_date))
                .unwrap_or_default();

            let tickets: i64 = show_events.iter().map(|e| e.quantity).sum();
            let revenue: Decimal = show_events.iter().map(|e| e.revenue).sum();
            total.tickets += tickets;
            total.revenue += revenue;

            let (carried, dated): (Vec<SaleEvent>, Vec<SaleEvent>) =
                show_events.into_iter().partition(|e| e.carried_in);
            for e in &carried {
                carried_in.tickets += e.quantity;
                carried_in.revenue += e.revenue;
            }

            let show_records: Vec<TimingRecord> = match show.show_date {
                Some(date) => dated.iter().map(|e| timing_record(e, date)).collect(),
                None => {
                    if !dated.is_empty() {
                        warn!(show = %show.show_id, events = dated.len(), "show has no date; excluded from days-out view");
                    }
                    untimed.tickets += tickets;
                    untimed.revenue += revenue;
                    Vec::new()
                }
            };

            if compare_shows {
                let weighted: i128 = show_records
                    .iter()
                    .map(|r| r.days_out as i128 * r.quantity as i128)
                    .sum();
                let timed: i64 = show_records.iter().map(|r| r.quantity).sum();
                comparison.push(ShowTiming {
                    show_id: show.show_id.clone(),
                    show_date: show.show_date,
                    tickets,
                    revenue,
                    average_days_out: (timed > 0).then(|| weighted as f64 / timed as f64),
                    capacity: show.capacity,
                    fill_rate: fill_rate(tickets, show.capacity),
                });
            }

            events.extend(dated);
            records.extend(show_records);
        }
        comparison.sort_by(|a, b| a.show_date.cmp(&b.show_date).then(a.show_id.cmp(&b.show_id)));

        TimingReport {
            total,
            untimed,
            carried_in,
            days_out: kind
                .wants(TimingAnalysis::DaysOut)
                .then(|| days_out_report(&records, &self.boundaries)),
            weekday: kind.wants(TimingAnalysis::Weekday).then(|| weekday_report(&events)),
            velocity: kind.wants(TimingAnalysis::Velocity).then(|| velocity_curve(&records)),
            holiday: kind.wants(TimingAnalysis::Holiday).then(|| holiday_report(&events)),
            show_comparison: compare_shows.then_some(comparison),
        }
    }
}
