// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : ticket_pulse — ticket sales reconstruction & marketing analytics
Module  : config.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Rebuilds daily ticket sales from cumulative snapshots, joins them
          with daily ad spend (optionally incl. MVA), computes ROAS/CPT/MER
          with decline detection, and analyses sales timing (days-out,
          weekday, velocity, Norwegian holidays).
=============================================================================
*/
use std::env;
use std::str::FromStr;

use dotenvy::dotenv;
use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::{DistributionWeight, Rollup};
use crate::efficiency::DeclineConfig;
use crate::spend::{MvaConfig, DEFAULT_MVA_RATE};
use crate::timing::DEFAULT_BUCKETS;

/// Knobs the engine itself reads.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub weight: DistributionWeight,
    pub rollup: Rollup,
    pub mva: MvaConfig,
    pub decline: DeclineConfig,
    pub days_out_buckets: Vec<i64>,
    /// Show ids per snapshot store call.
    pub snapshot_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weight: DistributionWeight::Even,
            rollup: Rollup::Stop,
            mva: MvaConfig::default(),
            decline: DeclineConfig::default(),
            days_out_buckets: DEFAULT_BUCKETS.to_vec(),
            snapshot_batch: 25,
        }
    }
}

/// Runner-side settings (files, ports).
#[derive(Clone, Debug)]
pub struct Settings {
    pub data_file: String,
    pub cache_file: Option<String>,
    pub record_file: Option<String>,
    pub metrics_port: Option<u16>,
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable env value");
            None
        }
    }
}

/// Comma separated integers, e.g. `0,7,14,30`.
pub fn parse_buckets(raw: &str) -> Option<Vec<i64>> {
    let out: Vec<i64> = raw
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter_map(|t| t.parse().ok())
        .collect();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

pub fn load() -> (Settings, EngineConfig) {
    // .env is optional
    let _ = dotenv();

    // ===== Runner =====
    let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let data_file = env::var("DATA_FILE").unwrap_or_else(|_| format!("{data_dir}/dataset.json"));
    let cache_file = env::var("CACHE_FILE").ok().filter(|s| !s.trim().is_empty());
    let record_file = env::var("RECORD_FILE").ok().filter(|s| !s.trim().is_empty());
    let metrics_port = parse_env::<u16>("METRICS_PORT");

    let settings = Settings { data_file, cache_file, record_file, metrics_port };

    // ===== Engine =====
    let defaults = EngineConfig::default();
    let weight = parse_env::<DistributionWeight>("DISTRIBUTION_WEIGHT").unwrap_or(defaults.weight);
    let rollup = parse_env::<Rollup>("ROLLUP").unwrap_or(defaults.rollup);
    let mva_rate = parse_env::<Decimal>("MVA_RATE").unwrap_or(DEFAULT_MVA_RATE);
    let include_mva = parse_env::<bool>("INCLUDE_MVA").unwrap_or(false);
    let days_out_buckets = env::var("DAYS_OUT_BUCKETS")
        .ok()
        .and_then(|s| parse_buckets(&s))
        .unwrap_or(defaults.days_out_buckets);
    let decline = DeclineConfig {
        window: parse_env("DECLINE_WINDOW").unwrap_or(defaults.decline.window),
        threshold: parse_env("DECLINE_THRESHOLD").unwrap_or(defaults.decline.threshold),
    };
    let snapshot_batch = parse_env("SNAPSHOT_BATCH").unwrap_or(defaults.snapshot_batch);

    let cfg = EngineConfig {
        weight,
        rollup,
        mva: MvaConfig { include: include_mva, rate: mva_rate },
        decline,
        days_out_buckets,
        snapshot_batch,
    };
    (settings, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_skip_garbage() {
        assert_eq!(parse_buckets("0, 7,x,30"), Some(vec![0, 7, 30]));
        assert_eq!(parse_buckets(" , "), None);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.days_out_buckets, vec![0, 7, 14, 30, 60, 90]);
        assert_eq!(cfg.decline.window, 7);
        assert_eq!(cfg.mva.rate, DEFAULT_MVA_RATE);
        assert!(!cfg.mva.include);
    }
}
