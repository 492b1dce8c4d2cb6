// ===============================
// src/series.rs (daily series assembler)
// ===============================
//
// Per show: snapshots -> intervals -> per-day values.
// - exact interval (single day / not estimated) -> whole delta on its end date
// - estimated interval -> distribute() across the span, tickets and revenue
//   separately (revenue in minor units so it stays remainder-safe)
// Shows roll up into a logical entity (show/stop/project) by summation and
// every (entity, date) in the window is present, zero-filled.
//
use std::collections::BTreeMap;

use ahash::AHashMap as HashMap;
use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::distribution::distribute;
use crate::domain::{DailySalesPoint, DateRange, DistributionWeight, Rollup, ShowMeta, TicketSnapshot};
use crate::intervals::build_intervals;
use crate::metrics::ESTIMATED_INTERVALS;

const MINOR_UNITS: u32 = 2;

pub fn to_minor(amount: Decimal) -> i64 {
    (amount * Decimal::from(10_i64.pow(MINOR_UNITS)))
        .round()
        .to_i64()
        .unwrap_or(0)
}

pub fn from_minor(units: i64) -> Decimal {
    Decimal::new(units, MINOR_UNITS)
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesAssembler {
    pub weight: DistributionWeight,
    pub rollup: Rollup,
}

impl SeriesAssembler {
    pub fn new(weight: DistributionWeight, rollup: Rollup) -> Self {
        Self { weight, rollup }
    }

    pub fn assemble(
        &self,
        shows: &[ShowMeta],
        snapshots: &HashMap<String, Vec<TicketSnapshot>>,
        window: DateRange,
    ) -> Vec<DailySalesPoint> {
        let mut acc: HashMap<String, BTreeMap<NaiveDate, DailySalesPoint>> = HashMap::new();

        for show in shows {
            let entity = show.rollup_key(self.rollup).to_string();
            let days = acc.entry(entity.clone()).or_insert_with(|| {
                window
                    .dates()
                    .map(|d| (d, DailySalesPoint::empty(d, &entity)))
                    .collect()
            });

            let Some(snaps) = snapshots.get(&show.show_id) else {
                continue;
            };

            for iv in build_intervals(snaps, window) {
                let span = iv.days();
                if !iv.is_estimated || span <= 1 {
                    add(days, iv.end_date, &show.show_id, iv.tickets_delta, to_minor(iv.revenue_delta), false);
                    continue;
                }

                ESTIMATED_INTERVALS.inc();
                let tickets = distribute(iv.tickets_delta, span, self.weight);
                let revenue = distribute(to_minor(iv.revenue_delta), span, self.weight);
                for (i, (t, r)) in tickets.into_iter().zip(revenue).enumerate() {
                    let date = iv.start_date + Duration::days(i as i64);
                    add(days, date, &show.show_id, t, r, true);
                }
            }
        }

        let mut out: Vec<DailySalesPoint> =
            acc.into_values().flat_map(|days| days.into_values()).collect();
        out.sort_by(|a, b| a.entity_id.cmp(&b.entity_id).then(a.date.cmp(&b.date)));
        out
    }
}

fn add(
    days: &mut BTreeMap<NaiveDate, DailySalesPoint>,
    date: NaiveDate,
    show_id: &str,
    tickets: i64,
    revenue_minor: i64,
    estimated: bool,
) {
    if tickets == 0 && revenue_minor == 0 {
        return;
    }
    // dates outside the window never reach here; skip instead of growing the axis
    let Some(p) = days.get_mut(&date) else {
        return;
    };
    let revenue = from_minor(revenue_minor);
    p.tickets += tickets;
    p.revenue += revenue;
    if estimated {
        p.estimated_tickets += tickets;
        p.estimated_revenue += revenue;
        p.is_estimated = true;
    } else {
        p.actual_tickets += tickets;
        p.actual_revenue += revenue;
    }
    p.contributing_show_ids.insert(show_id.to_string());
}

/// Sums all entities per date: `date -> (tickets, revenue)`.
pub fn totals_by_date(points: &[DailySalesPoint]) -> BTreeMap<NaiveDate, (i64, Decimal)> {
    let mut out: BTreeMap<NaiveDate, (i64, Decimal)> = BTreeMap::new();
    for p in points {
        let e = out.entry(p.date).or_insert((0, Decimal::ZERO));
        e.0 += p.tickets;
        e.1 += p.revenue;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn show(id: &str, stop: &str) -> ShowMeta {
        ShowMeta {
            show_id: id.into(),
            stop_id: stop.into(),
            project_id: "p1".into(),
            show_date: Some(d(6, 1)),
            capacity: Some(1000),
            sales_start_date: None,
        }
    }

    fn snap(show: &str, m: u32, day: u32, qty: i64, rev: Decimal) -> TicketSnapshot {
        TicketSnapshot {
            show_id: show.into(),
            quantity_sold: qty,
            revenue: rev,
            reported_at: Utc.with_ymd_and_hms(2024, m, day, 12, 0, 0).unwrap(),
            sale_date: None,
        }
    }

    fn by_show(snaps: Vec<TicketSnapshot>) -> HashMap<String, Vec<TicketSnapshot>> {
        let mut m: HashMap<String, Vec<TicketSnapshot>> = HashMap::new();
        for s in snaps {
            m.entry(s.show_id.clone()).or_default().push(s);
        }
        m
    }

    #[test]
    fn ten_day_gap_spreads_evenly() {
        let snaps = by_show(vec![snap("a", 3, 1, 100, dec!(1000)), snap("a", 3, 11, 300, dec!(3000))]);
        let window = DateRange::new(d(3, 1), d(3, 11)).unwrap();
        let out = SeriesAssembler::new(DistributionWeight::Even, Rollup::Show)
            .assemble(&[show("a", "s1")], &snaps, window);

        assert_eq!(out.len(), 11);
        assert_eq!(out[0].tickets, 0);
        assert!(out[1..].iter().all(|p| p.tickets == 20 && p.is_estimated));
        assert_eq!(out.iter().map(|p| p.tickets).sum::<i64>(), 200);
        assert_eq!(out.iter().map(|p| p.revenue).sum::<Decimal>(), dec!(2000));
    }

    #[test]
    fn shows_roll_up_into_stop() {
        let snaps = by_show(vec![
            snap("a", 3, 1, 10, dec!(100)),
            snap("a", 3, 2, 15, dec!(150)),
            snap("b", 3, 1, 40, dec!(400)),
            snap("b", 3, 2, 47, dec!(470)),
        ]);
        let window = DateRange::new(d(3, 1), d(3, 3)).unwrap();
        let out = SeriesAssembler::new(DistributionWeight::Even, Rollup::Stop)
            .assemble(&[show("a", "s1"), show("b", "s1")], &snaps, window);

        assert_eq!(out.len(), 3);
        let day2 = &out[1];
        assert_eq!(day2.entity_id, "s1");
        assert_eq!(day2.tickets, 12);
        assert_eq!(day2.actual_tickets, 12);
        assert!(!day2.is_estimated);
        assert_eq!(day2.contributing_show_ids.len(), 2);
        assert_eq!(out[2].tickets, 0);
    }

    #[test]
    fn entity_without_snapshots_is_zero_filled() {
        let window = DateRange::new(d(3, 1), d(3, 5)).unwrap();
        let out = SeriesAssembler::new(DistributionWeight::Late, Rollup::Stop)
            .assemble(&[show("a", "s1"), show("b", "s2")], &HashMap::new(), window);
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|p| p.tickets == 0 && p.revenue == Decimal::ZERO));
    }

    #[test]
    fn revenue_cents_are_not_lost() {
        let snaps = by_show(vec![snap("a", 3, 1, 0, dec!(0)), snap("a", 3, 4, 1, dec!(100.01))]);
        let window = DateRange::new(d(3, 1), d(3, 4)).unwrap();
        let out = SeriesAssembler::new(DistributionWeight::Even, Rollup::Show)
            .assemble(&[show("a", "s1")], &snaps, window);
        assert_eq!(out.iter().map(|p| p.revenue).sum::<Decimal>(), dec!(100.01));
        assert_eq!(out[3].tickets, 1);
    }

    #[test]
    fn minor_unit_conversion_rounds() {
        assert_eq!(to_minor(dec!(12.344)), 1234);
        assert_eq!(to_minor(dec!(12.346)), 1235);
        assert_eq!(from_minor(1234), dec!(12.34));
    }
}
