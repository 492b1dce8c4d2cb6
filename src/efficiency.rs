// ===============================
// src/efficiency.rs (ROAS / CPT / MER + decline detection)
// ===============================
//
// Ratios:
//   roas = revenue / spend          (null when spend == 0)
//   cpt  = spend / tickets          (null when tickets == 0)
//   mer  = spend / revenue * 100    (null when revenue == 0)
//
// Decline points: fixed window W (default 7). For every index i with W days
// on both sides compare ROAS over [i-W, i) with ROAS over [i, i+W). A drop to
// below `threshold * before` (default 0.7, i.e. >= 30%) is a decline point.
// Window sums come from prefix sums, so one pass per period.
//
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::distribution::distribute;
use crate::domain::DistributionWeight;
use crate::error::EngineError;
use crate::metrics::DECLINE_POINTS;
use crate::spend::JoinedDay;

const MAX_SPEND_TIERS: usize = 4;

fn ratio(num: Decimal, den: Decimal) -> Option<f64> {
    if den <= Decimal::ZERO {
        return None;
    }
    (num / den).to_f64().filter(|v| v.is_finite())
}

pub fn roas(spend: Decimal, revenue: Decimal) -> Option<f64> {
    ratio(revenue, spend)
}

pub fn cpt(spend: Decimal, tickets: i64) -> Option<f64> {
    ratio(spend, Decimal::from(tickets))
}

pub fn mer(spend: Decimal, revenue: Decimal) -> Option<f64> {
    ratio(spend, revenue).map(|v| v * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub ad_spend: Decimal,
    pub revenue: Decimal,
    pub tickets: i64,
    pub roas: Option<f64>,
    pub cpt: Option<f64>,
    pub mer: Option<f64>,
    /// ROAS over the trailing window ending on this date.
    pub rolling_roas: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMetrics {
    pub ad_spend: Decimal,
    pub revenue_delta: Decimal,
    pub tickets_delta: i64,
    pub roas: Option<f64>,
    pub cpt: Option<f64>,
    pub mer: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_breakdown: Option<Vec<DailyMetrics>>,
}

impl PeriodMetrics {
    pub fn from_totals(ad_spend: Decimal, revenue_delta: Decimal, tickets_delta: i64) -> Self {
        Self {
            ad_spend,
            revenue_delta,
            tickets_delta,
            roas: roas(ad_spend, revenue_delta),
            cpt: cpt(ad_spend, tickets_delta),
            mer: mer(ad_spend, revenue_delta),
            daily_breakdown: None,
        }
    }

    pub fn from_days(days: &[JoinedDay], window: usize, include_daily: bool) -> Self {
        let spend: Decimal = days.iter().map(|d| d.ad_spend).sum();
        let revenue: Decimal = days.iter().map(|d| d.revenue).sum();
        let tickets: i64 = days.iter().map(|d| d.tickets).sum();
        let mut out = Self::from_totals(spend, revenue, tickets);
        if include_daily {
            out.daily_breakdown = Some(daily_metrics(days, window));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclinePoint {
    pub date: NaiveDate,
    pub roas_before: f64,
    pub roas_after: f64,
    pub decline_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclineConfig {
    pub window: usize,
    pub threshold: f64,
}

impl Default for DeclineConfig {
    fn default() -> Self {
        Self { window: 7, threshold: 0.7 }
    }
}

/// Running sums: `prefix[i]` covers `days[..i]`.
struct Prefix {
    spend: Vec<Decimal>,
    revenue: Vec<Decimal>,
    tickets: Vec<i64>,
}

impl Prefix {
    fn new(days: &[JoinedDay]) -> Self {
        let mut p = Prefix {
            spend: Vec::with_capacity(days.len() + 1),
            revenue: Vec::with_capacity(days.len() + 1),
            tickets: Vec::with_capacity(days.len() + 1),
        };
        let (mut s, mut r, mut t) = (Decimal::ZERO, Decimal::ZERO, 0_i64);
        p.spend.push(s);
        p.revenue.push(r);
        p.tickets.push(t);
        for d in days {
            s += d.ad_spend;
            r += d.revenue;
            t += d.tickets;
            p.spend.push(s);
            p.revenue.push(r);
            p.tickets.push(t);
        }
        p
    }

    /// `(spend, revenue)` over `days[from..to]`.
    fn window(&self, from: usize, to: usize) -> (Decimal, Decimal) {
        (self.spend[to] - self.spend[from], self.revenue[to] - self.revenue[from])
    }
}

pub fn daily_metrics(days: &[JoinedDay], window: usize) -> Vec<DailyMetrics> {
    let prefix = Prefix::new(days);
    let w = window.max(1);
    days.iter()
        .enumerate()
        .map(|(i, d)| {
            let (s, r) = prefix.window((i + 1).saturating_sub(w), i + 1);
            DailyMetrics {
                date: d.date,
                ad_spend: d.ad_spend,
                revenue: d.revenue,
                tickets: d.tickets,
                roas: roas(d.ad_spend, d.revenue),
                cpt: cpt(d.ad_spend, d.tickets),
                mer: mer(d.ad_spend, d.revenue),
                rolling_roas: roas(s, r),
            }
        })
        .collect()
}

pub fn detect_decline_points(days: &[JoinedDay], cfg: DeclineConfig) -> Vec<DeclinePoint> {
    let w = cfg.window.max(1);
    if days.len() < 2 * w {
        return Vec::new();
    }
    let prefix = Prefix::new(days);
    let mut out = Vec::new();

    for i in w..=days.len() - w {
        let (sb, rb) = prefix.window(i - w, i);
        let (sa, ra) = prefix.window(i, i + w);
        let (Some(before), Some(after)) = (roas(sb, rb), roas(sa, ra)) else {
            continue;
        };
        if before > 0.0 && after < before * cfg.threshold {
            out.push(DeclinePoint {
                date: days[i].date,
                roas_before: before,
                roas_after: after,
                decline_percent: (before - after) / before * 100.0,
            });
        }
    }
    DECLINE_POINTS.inc_by(out.len() as u64);
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendTier {
    pub tier: usize,
    pub days: usize,
    pub min_spend: Decimal,
    pub max_spend: Decimal,
    pub avg_spend: Decimal,
    pub avg_revenue: Decimal,
    pub roas: Option<f64>,
    /// Extra revenue per extra unit of spend versus the previous tier.
    pub marginal_roas: Option<f64>,
}

/// Days with spend, ordered by spend and cut into up to four tiers of near
/// equal size.
pub fn marginal_returns(days: &[JoinedDay]) -> Vec<SpendTier> {
    let mut spent: Vec<&JoinedDay> = days.iter().filter(|d| d.ad_spend > Decimal::ZERO).collect();
    if spent.is_empty() {
        return Vec::new();
    }
    spent.sort_by(|a, b| a.ad_spend.cmp(&b.ad_spend).then(a.date.cmp(&b.date)));

    let tiers = spent.len().min(MAX_SPEND_TIERS);
    let sizes = distribute(spent.len() as i64, tiers, DistributionWeight::Even);

    let mut out: Vec<SpendTier> = Vec::with_capacity(tiers);
    let mut offset = 0;
    // unrounded (spend, revenue) averages of the previous tier
    let mut prev: Option<(Decimal, Decimal)> = None;
    for (tier, size) in sizes.into_iter().enumerate() {
        let chunk = &spent[offset..offset + size as usize];
        offset += size as usize;
        let n = Decimal::from(chunk.len() as i64);
        let avg_spend = chunk.iter().map(|d| d.ad_spend).sum::<Decimal>() / n;
        let avg_revenue = chunk.iter().map(|d| d.revenue).sum::<Decimal>() / n;

        let marginal_roas = prev.and_then(|(prev_spend, prev_revenue)| {
            ratio(avg_revenue - prev_revenue, avg_spend - prev_spend)
        });
        prev = Some((avg_spend, avg_revenue));
        out.push(SpendTier {
            tier: tier + 1,
            days: chunk.len(),
            min_spend: chunk[0].ad_spend,
            max_spend: chunk[chunk.len() - 1].ad_spend,
            avg_spend: avg_spend.round_dp(2),
            avg_revenue: avg_revenue.round_dp(2),
            roas: roas(avg_spend, avg_revenue),
            marginal_roas,
        });
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EfficiencyAnalysis {
    Daily,
    Decline,
    Marginal,
    #[default]
    Full,
}

impl FromStr for EfficiencyAnalysis {
    type Err = EngineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "daily_metrics" => Ok(Self::Daily),
            "decline" | "decline_points" | "inflection" => Ok(Self::Decline),
            "marginal" | "marginal_returns" => Ok(Self::Marginal),
            "full" | "all" => Ok(Self::Full),
            other => Err(EngineError::Config(format!("unknown efficiency analysis: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRoas {
    pub date: NaiveDate,
    pub roas: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencySummary {
    pub days: usize,
    pub days_with_spend: usize,
    pub totals: PeriodMetrics,
    pub average_daily_roas: Option<f64>,
    pub best_day: Option<DayRoas>,
    pub worst_day: Option<DayRoas>,
    pub decline_point_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyReport {
    pub daily_metrics: Vec<DailyMetrics>,
    pub decline_points: Vec<DeclinePoint>,
    pub marginal_returns: Vec<SpendTier>,
    pub summary: EfficiencySummary,
}

pub fn analyze(days: &[JoinedDay], kind: EfficiencyAnalysis, cfg: DeclineConfig) -> EfficiencyReport {
    let daily = daily_metrics(days, cfg.window);
    let declines = match kind {
        EfficiencyAnalysis::Decline | EfficiencyAnalysis::Full => detect_decline_points(days, cfg),
        _ => Vec::new(),
    };
    let marginal = match kind {
        EfficiencyAnalysis::Marginal | EfficiencyAnalysis::Full => marginal_returns(days),
        _ => Vec::new(),
    };

    let per_day: Vec<DayRoas> = daily
        .iter()
        .filter_map(|m| m.roas.map(|roas| DayRoas { date: m.date, roas }))
        .collect();
    let average_daily_roas = if per_day.is_empty() {
        None
    } else {
        Some(per_day.iter().map(|d| d.roas).sum::<f64>() / per_day.len() as f64)
    };
    // ties keep the earliest date
    let best_day = per_day
        .iter()
        .fold(None::<&DayRoas>, |acc, d| match acc {
            Some(b) if b.roas >= d.roas => Some(b),
            _ => Some(d),
        })
        .cloned();
    let worst_day = per_day
        .iter()
        .fold(None::<&DayRoas>, |acc, d| match acc {
            Some(w) if w.roas <= d.roas => Some(w),
            _ => Some(d),
        })
        .cloned();

    let summary = EfficiencySummary {
        days: days.len(),
        days_with_spend: days.iter().filter(|d| d.ad_spend > Decimal::ZERO).count(),
        totals: PeriodMetrics::from_days(days, cfg.window, false),
        average_daily_roas,
        best_day,
        worst_day,
        decline_point_count: declines.len(),
    };

    let daily_metrics = match kind {
        EfficiencyAnalysis::Daily | EfficiencyAnalysis::Full => daily,
        _ => Vec::new(),
    };
    EfficiencyReport { daily_metrics, decline_points: declines, marginal_returns: marginal, summary }
}
