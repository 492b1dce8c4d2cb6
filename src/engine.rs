// ===============================
// src/engine.rs (entry points)
// ===============================
//
// snapshots -> intervals -> daily points -> (+ spend) -> efficiency
// snapshots -> sale events -> timing
//
// Only the store calls suspend. Everything else is a pure transform, so
// concurrent requests share nothing but the cache collaborator.
//
use std::sync::Arc;

use ahash::AHashMap as HashMap;
use chrono::NaiveDate;
use futures_util::future::try_join_all;
use tracing::{info, warn};

use crate::cache::{merge_cached, recompute_from, SeriesCache};
use crate::config::EngineConfig;
use crate::domain::{DailySalesPoint, DateRange, DistributionWeight, Scope, ShowMeta, TicketSnapshot};
use crate::efficiency::{self, EfficiencyAnalysis, EfficiencyReport, PeriodMetrics};
use crate::error::{EngineError, EngineResult};
use crate::metrics::{self, CACHE_LOOKUPS};
use crate::series::{totals_by_date, SeriesAssembler};
use crate::spend::{self, JoinedDay, MvaConfig};
use crate::store::{CatalogStore, SnapshotStore, SpendStore};
use crate::timing::{TimingAnalysis, TimingAnalyzer, TimingReport};

pub struct Engine {
    snapshots: Arc<dyn SnapshotStore>,
    spend: Arc<dyn SpendStore>,
    catalog: Arc<dyn CatalogStore>,
    cache: Option<Arc<dyn SeriesCache>>,
    cfg: EngineConfig,
}

impl Engine {
    /// One backing store serving all three roles.
    pub fn new<S>(store: Arc<S>, cfg: EngineConfig) -> Self
    where
        S: SnapshotStore + SpendStore + CatalogStore + 'static,
    {
        Self {
            snapshots: store.clone(),
            spend: store.clone(),
            catalog: store,
            cache: None,
            cfg,
        }
    }

    pub fn from_parts(
        snapshots: Arc<dyn SnapshotStore>,
        spend: Arc<dyn SpendStore>,
        catalog: Arc<dyn CatalogStore>,
        cfg: EngineConfig,
    ) -> Self {
        Self { snapshots, spend, catalog, cache: None, cfg }
    }

    pub fn with_cache(mut self, cache: Arc<dyn SeriesCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    // ---- fetch helpers ----

    async fn resolve_shows(&self, scope: &Scope) -> EngineResult<Vec<ShowMeta>> {
        let mut shows = self.catalog.shows(scope).await?;
        shows.sort_by(|a, b| a.show_id.cmp(&b.show_id));
        shows.dedup_by(|a, b| a.show_id == b.show_id);
        Ok(shows)
    }

    /// Snapshots grouped by show; one store call per batch, batches awaited
    /// concurrently.
    async fn fetch_snapshots(
        &self,
        shows: &[ShowMeta],
        until: Option<NaiveDate>,
    ) -> EngineResult<HashMap<String, Vec<TicketSnapshot>>> {
        let ids: Vec<String> = shows.iter().map(|s| s.show_id.clone()).collect();
        let batch = self.cfg.snapshot_batch.max(1);
        let pages = try_join_all(
            ids.chunks(batch)
                .map(|chunk| self.snapshots.snapshots(chunk, until)),
        )
        .await?;

        let mut by_show: HashMap<String, Vec<TicketSnapshot>> = HashMap::new();
        for snap in pages.into_iter().flatten() {
            by_show.entry(snap.show_id.clone()).or_default().push(snap);
        }
        for snaps in by_show.values_mut() {
            snaps.sort_by(|a, b| a.reported_at.cmp(&b.reported_at));
        }
        Ok(by_show)
    }

    fn prefs_key(&self, scope: &Scope, weight: DistributionWeight, range: DateRange) -> String {
        format!("{scope}|{}|{}|{}", self.cfg.rollup.as_str(), weight.as_str(), range.start)
    }

    // ---- entry points ----

    pub async fn get_daily_series(
        &self,
        scope: &Scope,
        range: DateRange,
        weight: DistributionWeight,
    ) -> EngineResult<Vec<DailySalesPoint>> {
        let _t = metrics::track("daily_series");
        let shows = self.resolve_shows(scope).await?;
        if shows.is_empty() {
            return Ok(Vec::new());
        }

        let entity_ids: Vec<String> = shows.iter().map(|s| s.show_id.clone()).collect();
        let key = self.prefs_key(scope, weight, range);
        // a prefix cached past `range.end` already holds spreads of later reports
        let cached = self
            .cache
            .as_ref()
            .and_then(|c| c.get(&key, &entity_ids))
            .filter(|c| c.cached_up_to > range.start && c.cached_up_to <= range.end);
        CACHE_LOOKUPS
            .with_label_values(&[if cached.is_some() { "hit" } else { "miss" }])
            .inc();

        let snapshots = self.fetch_snapshots(&shows, Some(range.end)).await?;
        let fresh_start = cached
            .as_ref()
            .map(|c| recompute_from(&snapshots, c.cached_up_to, range.start))
            .unwrap_or(range.start);
        // intervals ending on/after `fresh_start` must be assembled unclipped
        let assemble_from = recompute_from(&snapshots, fresh_start, range.start);
        let fresh_window = DateRange::new(assemble_from, range.end)?;
        let fresh = SeriesAssembler::new(weight, self.cfg.rollup).assemble(&shows, &snapshots, fresh_window);

        let series: Vec<DailySalesPoint> = match &cached {
            Some(c) => merge_cached(c, fresh, fresh_start)
                .into_iter()
                .filter(|p| range.contains(p.date))
                .collect(),
            None => fresh,
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&key, &entity_ids, &series) {
                warn!(%scope, %e, "series cache write failed");
            }
        }

        info!(
            %scope,
            shows = shows.len(),
            days = range.num_days(),
            points = series.len(),
            recomputed_from = %fresh_start,
            "daily series assembled"
        );
        Ok(series)
    }

    async fn joined_days(&self, scope: &Scope, range: DateRange, mva: MvaConfig) -> EngineResult<Vec<JoinedDay>> {
        let (series, spend) = tokio::try_join!(
            self.get_daily_series(scope, range, self.cfg.weight),
            async { self.spend.daily_spend(scope, range).await.map_err(EngineError::from) },
        )?;
        Ok(spend::join(range, &spend, &totals_by_date(&series), mva))
    }

    pub async fn get_period_metrics(
        &self,
        scope: &Scope,
        range: DateRange,
        include_mva: bool,
        include_daily: bool,
    ) -> EngineResult<PeriodMetrics> {
        let _t = metrics::track("period_metrics");
        let mva = MvaConfig { include: include_mva, rate: self.cfg.mva.rate };
        let days = self.joined_days(scope, range, mva).await?;
        let out = PeriodMetrics::from_days(&days, self.cfg.decline.window, include_daily);
        info!(%scope, spend = %out.ad_spend, revenue = %out.revenue_delta, tickets = out.tickets_delta, "period metrics");
        Ok(out)
    }

    pub async fn analyze_efficiency(
        &self,
        scope: &Scope,
        range: DateRange,
        kind: EfficiencyAnalysis,
    ) -> EngineResult<EfficiencyReport> {
        let _t = metrics::track("efficiency");
        let days = self.joined_days(scope, range, self.cfg.mva).await?;
        let report = efficiency::analyze(&days, kind, self.cfg.decline);
        info!(
            %scope,
            days = days.len(),
            decline_points = report.decline_points.len(),
            "efficiency analysed"
        );
        Ok(report)
    }

    pub async fn analyze_sales_timing(
        &self,
        scope: &Scope,
        kind: TimingAnalysis,
        days_out_buckets: Option<Vec<i64>>,
        compare_shows: bool,
    ) -> EngineResult<TimingReport> {
        let _t = metrics::track("sales_timing");
        let shows = self.resolve_shows(scope).await?;
        let snapshots = self.fetch_snapshots(&shows, None).await?;
        let analyzer = TimingAnalyzer::new(days_out_buckets.unwrap_or_else(|| self.cfg.days_out_buckets.clone()));
        let report = analyzer.analyze(&shows, &snapshots, kind, compare_shows);
        info!(%scope, shows = shows.len(), tickets = report.total.tickets, "sales timing analysed");
        Ok(report)
    }
}
