// ===============================
// src/lib.rs
// ===============================
pub mod cache;
pub mod config;
pub mod distribution;
pub mod domain;
pub mod efficiency;
pub mod engine;
pub mod error;
pub mod holidays;
pub mod intervals;
pub mod metrics;
pub mod recorder;
pub mod series;
pub mod spend;
pub mod store;
pub mod timing;

pub use distribution::distribute;
pub use domain::{DailySalesPoint, DateRange, DistributionWeight, Rollup, Scope, ScopeLevel, ShowMeta, TicketSnapshot};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, StoreError};
