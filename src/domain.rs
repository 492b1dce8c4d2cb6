// ===============================
// src/domain.rs
// ===============================
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Cumulative sales report for one show ("sold so far", never an increment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketSnapshot {
    pub show_id: String,
    pub quantity_sold: i64,
    pub revenue: Decimal,
    pub reported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_date: Option<NaiveDate>,
}

impl TicketSnapshot {
    /// Calendar date the cumulative figure applies to.
    pub fn effective_date(&self) -> NaiveDate {
        self.sale_date.unwrap_or_else(|| self.reported_at.date_naive())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowMeta {
    pub show_id: String,
    pub stop_id: String,
    pub project_id: String,
    #[serde(default)]
    pub show_date: Option<NaiveDate>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub sales_start_date: Option<NaiveDate>,
}

impl ShowMeta {
    pub fn rollup_key(&self, rollup: Rollup) -> &str {
        match rollup {
            Rollup::Show => &self.show_id,
            Rollup::Stop => &self.stop_id,
            Rollup::Project => &self.project_id,
        }
    }
}

/// Date span `[start_date, end_date]` carrying one delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tickets_delta: i64,
    pub revenue_delta: Decimal,
    pub is_estimated: bool,
}

impl Interval {
    pub fn days(&self) -> usize {
        ((self.end_date - self.start_date).num_days() + 1).max(0) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySalesPoint {
    pub date: NaiveDate,
    pub entity_id: String,
    pub tickets: i64,
    pub revenue: Decimal,
    pub actual_tickets: i64,
    pub estimated_tickets: i64,
    pub actual_revenue: Decimal,
    pub estimated_revenue: Decimal,
    pub is_estimated: bool,
    pub contributing_show_ids: BTreeSet<String>,
}

impl DailySalesPoint {
    pub fn empty(date: NaiveDate, entity_id: &str) -> Self {
        Self {
            date,
            entity_id: entity_id.to_string(),
            tickets: 0,
            revenue: Decimal::ZERO,
            actual_tickets: 0,
            estimated_tickets: 0,
            actual_revenue: Decimal::ZERO,
            estimated_revenue: Decimal::ZERO,
            is_estimated: false,
            contributing_show_ids: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdSpendRecord {
    pub date: NaiveDate,
    pub amount: Decimal,
}

/// Derived per sale event (one snapshot-to-snapshot delta).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingRecord {
    pub show_id: String,
    pub sale_date: NaiveDate,
    pub days_out: i64,
    pub day_of_week: chrono::Weekday,
    pub is_holiday: bool,
    pub quantity: i64,
    pub revenue: Decimal,
}

// ===== Policies =====

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionWeight {
    #[default]
    Even,
    Early,
    Late,
}

impl DistributionWeight {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionWeight::Even => "even",
            DistributionWeight::Early => "early",
            DistributionWeight::Late => "late",
        }
    }
}

impl FromStr for DistributionWeight {
    type Err = EngineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "even" => Ok(DistributionWeight::Even),
            "early" | "early_weighted" | "front" => Ok(DistributionWeight::Early),
            "late" | "late_weighted" | "back" => Ok(DistributionWeight::Late),
            other => Err(EngineError::Config(format!("unknown distribution weight: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rollup {
    Show,
    #[default]
    Stop,
    Project,
}

impl Rollup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rollup::Show => "show",
            Rollup::Stop => "stop",
            Rollup::Project => "project",
        }
    }
}

impl FromStr for Rollup {
    type Err = EngineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "show" => Ok(Rollup::Show),
            "stop" => Ok(Rollup::Stop),
            "project" => Ok(Rollup::Project),
            other => Err(EngineError::Config(format!("unknown rollup: {other}"))),
        }
    }
}

// ===== Scope & ranges =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeLevel {
    Organization,
    Project,
    Stop,
    Show,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub level: ScopeLevel,
    pub id: String,
}

impl Scope {
    pub fn new(level: ScopeLevel, id: impl Into<String>) -> Self {
        Self { level, id: id.into() }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            ScopeLevel::Organization => "organization",
            ScopeLevel::Project => "project",
            ScopeLevel::Stop => "stop",
            ScopeLevel::Show => "show",
        };
        write!(f, "{level}:{}", self.id)
    }
}

impl FromStr for Scope {
    type Err = EngineError;
    /// Parses `level:id`, e.g. `project:p-1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (level, id) = s
            .split_once(':')
            .ok_or_else(|| EngineError::Config(format!("scope must be level:id, got {s}")))?;
        let level = match level.trim().to_ascii_lowercase().as_str() {
            "organization" | "org" => ScopeLevel::Organization,
            "project" => ScopeLevel::Project,
            "stop" => ScopeLevel::Stop,
            "show" => ScopeLevel::Show,
            other => return Err(EngineError::Config(format!("unknown scope level: {other}"))),
        };
        Ok(Scope::new(level, id.trim()))
    }
}

/// Inclusive calendar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, d: NaiveDate) -> bool {
        d >= self.start && d <= self.end
    }

    pub fn num_days(&self) -> usize {
        ((self.end - self.start).num_days() + 1).max(0) as usize
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        assert!(matches!(
            DateRange::new(d(2024, 5, 2), d(2024, 5, 1)),
            Err(EngineError::InvalidRange { .. })
        ));
    }

    #[test]
    fn range_iterates_every_date_inclusive() {
        let r = DateRange::new(d(2024, 2, 27), d(2024, 3, 1)).unwrap();
        let all: Vec<_> = r.dates().collect();
        assert_eq!(all.len(), 4);
        assert_eq!(r.num_days(), 4);
        assert_eq!(all[2], d(2024, 2, 29));
    }

    #[test]
    fn scope_parses_level_and_id() {
        let s: Scope = "project:p-42".parse().unwrap();
        assert_eq!(s, Scope::new(ScopeLevel::Project, "p-42"));
        assert_eq!(s.to_string(), "project:p-42");
        assert!("p-42".parse::<Scope>().is_err());
    }

    #[test]
    fn snapshot_prefers_sale_date() {
        let snap = TicketSnapshot {
            show_id: "s1".into(),
            quantity_sold: 10,
            revenue: Decimal::new(1000, 0),
            reported_at: "2024-03-02T08:00:00Z".parse().unwrap(),
            sale_date: Some(d(2024, 3, 1)),
        };
        assert_eq!(snap.effective_date(), d(2024, 3, 1));
        let snap = TicketSnapshot { sale_date: None, ..snap };
        assert_eq!(snap.effective_date(), d(2024, 3, 2));
    }

    #[test]
    fn weight_parses_aliases() {
        assert_eq!("Late".parse::<DistributionWeight>().unwrap(), DistributionWeight::Late);
        assert_eq!("early".parse::<DistributionWeight>().unwrap(), DistributionWeight::Early);
        assert!("random".parse::<DistributionWeight>().is_err());
    }
}
