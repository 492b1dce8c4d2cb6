// ===============================
// src/store.rs (external collaborators + in-memory fixture store)
// ===============================
//
// The engine never talks to storage directly; it awaits these traits.
// Scope resolution (organization -> projects -> stops -> shows) belongs to
// the catalog implementation. Retries/backoff belong to the implementation too.
//
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{DateRange, Scope, ScopeLevel, ShowMeta, TicketSnapshot};
use crate::error::{EngineError, StoreError};

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Snapshots of the given shows dated up to `until` (inclusive), any order.
    async fn snapshots(
        &self,
        show_ids: &[String],
        until: Option<NaiveDate>,
    ) -> Result<Vec<TicketSnapshot>, StoreError>;
}

#[async_trait]
pub trait SpendStore: Send + Sync {
    /// Raw (ex. VAT) daily ad spend for a scope, `date -> amount`.
    async fn daily_spend(
        &self,
        scope: &Scope,
        range: DateRange,
    ) -> Result<BTreeMap<NaiveDate, Decimal>, StoreError>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Every show under the scope.
    async fn shows(&self, scope: &Scope) -> Result<Vec<ShowMeta>, StoreError>;
}

// ===== In-memory store =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedSpend {
    pub scope: Scope,
    pub date: NaiveDate,
    pub amount: Decimal,
}

/// Everything a store needs, as loaded from a fixture file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// organization id -> project ids
    #[serde(default)]
    pub organizations: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub shows: Vec<ShowMeta>,
    #[serde(default)]
    pub snapshots: Vec<TicketSnapshot>,
    #[serde(default)]
    pub spend: Vec<ScopedSpend>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Dataset,
}

impl MemoryStore {
    pub fn new(data: Dataset) -> Self {
        Self { data }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let data: Dataset = serde_json::from_str(&raw)?;
        Ok(Self::new(data))
    }

    fn show_in_scope(&self, show: &ShowMeta, scope: &Scope) -> bool {
        match scope.level {
            ScopeLevel::Show => show.show_id == scope.id,
            ScopeLevel::Stop => show.stop_id == scope.id,
            ScopeLevel::Project => show.project_id == scope.id,
            ScopeLevel::Organization => self
                .data
                .organizations
                .get(&scope.id)
                .map(|projects| projects.contains(&show.project_id))
                .unwrap_or(false),
        }
    }

    /// A spend record counts for `query` when its own scope sits at or below it.
    fn spend_in_scope(&self, record: &Scope, query: &Scope) -> bool {
        if record == query {
            return true;
        }
        let shows: Vec<&ShowMeta> = self
            .data
            .shows
            .iter()
            .filter(|s| self.show_in_scope(s, record))
            .collect();
        let narrower = level_rank(record.level) > level_rank(query.level);
        narrower && !shows.is_empty() && shows.iter().all(|s| self.show_in_scope(s, query))
    }
}

fn level_rank(level: ScopeLevel) -> u8 {
    match level {
        ScopeLevel::Organization => 0,
        ScopeLevel::Project => 1,
        ScopeLevel::Stop => 2,
        ScopeLevel::Show => 3,
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn snapshots(
        &self,
        show_ids: &[String],
        until: Option<NaiveDate>,
    ) -> Result<Vec<TicketSnapshot>, StoreError> {
        let wanted: BTreeSet<&str> = show_ids.iter().map(String::as_str).collect();
        let mut out: Vec<TicketSnapshot> = self
            .data
            .snapshots
            .iter()
            .filter(|s| wanted.contains(s.show_id.as_str()))
            .filter(|s| until.map(|u| s.effective_date() <= u).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.reported_at.cmp(&b.reported_at));
        Ok(out)
    }
}

#[async_trait]
impl SpendStore for MemoryStore {
    async fn daily_spend(
        &self,
        scope: &Scope,
        range: DateRange,
    ) -> Result<BTreeMap<NaiveDate, Decimal>, StoreError> {
        let mut out = BTreeMap::new();
        for r in &self.data.spend {
            if range.contains(r.date) && self.spend_in_scope(&r.scope, scope) {
                *out.entry(r.date).or_insert(Decimal::ZERO) += r.amount;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn shows(&self, scope: &Scope) -> Result<Vec<ShowMeta>, StoreError> {
        Ok(self
            .data
            .shows
            .iter()
            .filter(|s| self.show_in_scope(s, scope))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn show(id: &str, stop: &str, project: &str) -> ShowMeta {
        ShowMeta {
            show_id: id.into(),
            stop_id: stop.into(),
            project_id: project.into(),
            show_date: None,
            capacity: None,
            sales_start_date: None,
        }
    }

    fn store() -> MemoryStore {
        let mut organizations = BTreeMap::new();
        organizations.insert("org".to_string(), BTreeSet::from(["p1".to_string()]));
        MemoryStore::new(Dataset {
            organizations,
            shows: vec![show("a", "s1", "p1"), show("b", "s2", "p1"), show("c", "s3", "p2")],
            snapshots: Vec::new(),
            spend: vec![
                ScopedSpend { scope: Scope::new(ScopeLevel::Project, "p1"), date: d(1), amount: dec!(100) },
                ScopedSpend { scope: Scope::new(ScopeLevel::Stop, "s1"), date: d(1), amount: dec!(10) },
                ScopedSpend { scope: Scope::new(ScopeLevel::Stop, "s3"), date: d(2), amount: dec!(7) },
            ],
        })
    }

    #[tokio::test]
    async fn shows_resolve_through_organization() {
        let s = store();
        let shows = s.shows(&Scope::new(ScopeLevel::Organization, "org")).await.unwrap();
        assert_eq!(shows.len(), 2);
        assert!(s.shows(&Scope::new(ScopeLevel::Organization, "nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn spend_includes_narrower_scopes() {
        let s = store();
        let range = DateRange::new(d(1), d(5)).unwrap();
        let p1 = s.daily_spend(&Scope::new(ScopeLevel::Project, "p1"), range).await.unwrap();
        assert_eq!(p1.get(&d(1)), Some(&dec!(110)));
        assert_eq!(p1.get(&d(2)), None);

        let s1 = s.daily_spend(&Scope::new(ScopeLevel::Stop, "s1"), range).await.unwrap();
        assert_eq!(s1.get(&d(1)), Some(&dec!(10)));

        let org = s.daily_spend(&Scope::new(ScopeLevel::Organization, "org"), range).await.unwrap();
        assert_eq!(org.values().copied().sum::<Decimal>(), dec!(110));
    }
}
