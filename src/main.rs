// ===============================
// src/main.rs
// ===============================
/*
 # daily series for a project, late-weighted spreading
 DATA_FILE=./data/dataset.json cargo run -- series --scope project:p1 \
     --start 2024-03-01 --end 2024-03-31 --weight late

 # efficiency incl. MVA + Prometheus text on :9898
 METRICS_PORT=9898 INCLUDE_MVA=true cargo run -- efficiency --scope stop:s1 \
     --start 2024-03-01 --end 2024-04-30
*/
/*
=============================================================================
Project : ticket_pulse — ticket sales reconstruction & marketing analytics
Module  : main.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Rebuilds daily ticket sales from cumulative snapshots, joins them
          with daily ad spend (optionally incl. MVA), computes ROAS/CPT/MER
          with decline detection, and analyses sales timing (days-out,
          weekday, velocity, Norwegian holidays).
=============================================================================
*/
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ticket_pulse::cache::FileCache;
use ticket_pulse::config;
use ticket_pulse::efficiency::EfficiencyAnalysis;
use ticket_pulse::holidays;
use ticket_pulse::metrics;
use ticket_pulse::recorder::{self, Record, Report};
use ticket_pulse::store::MemoryStore;
use ticket_pulse::timing::TimingAnalysis;
use ticket_pulse::{DateRange, DistributionWeight, Engine, EngineError, Scope};

#[derive(Parser)]
#[command(name = "ticket_pulse", about = "Ticket sales reconstruction & marketing analytics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs)]
struct Window {
    /// level:id, e.g. project:p1
    #[arg(long)]
    scope: Scope,
    #[arg(long)]
    start: NaiveDate,
    #[arg(long)]
    end: NaiveDate,
}

#[derive(Subcommand)]
enum Command {
    /// Reconstructed daily sales
    Series {
        #[command(flatten)]
        window: Window,
        #[arg(long)]
        weight: Option<DistributionWeight>,
    },
    /// Spend / revenue / tickets with ROAS, CPT, MER
    Period {
        #[command(flatten)]
        window: Window,
        #[arg(long)]
        mva: bool,
        #[arg(long)]
        daily: bool,
    },
    /// Daily metrics, decline points, marginal returns
    Efficiency {
        #[command(flatten)]
        window: Window,
        #[arg(long, default_value = "full")]
        analysis: EfficiencyAnalysis,
    },
    /// Days-out, weekday, velocity and holiday views
    Timing {
        #[arg(long)]
        scope: Scope,
        #[arg(long, default_value = "full")]
        analysis: TimingAnalysis,
        /// comma separated, e.g. 0,7,14,30
        #[arg(long)]
        buckets: Option<String>,
        #[arg(long)]
        compare_shows: bool,
    },
    /// Norwegian public holidays for a year range
    Holidays {
        #[arg(long)]
        from: i32,
        #[arg(long)]
        to: Option<i32>,
    },
}

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(%e, "ticket_pulse failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), EngineError> {
    // ---- Load config ----
    let (settings, cfg) = config::load();

    // ---- Metrics ----
    metrics::init();
    metrics::CONFIG_WEIGHT.with_label_values(&[cfg.weight.as_str()]).set(1);
    metrics::CONFIG_ROLLUP.with_label_values(&[cfg.rollup.as_str()]).set(1);
    if let Some(port) = settings.metrics_port {
        metrics::serve_metrics(port);
    }

    info!(
        data = %settings.data_file,
        cache = ?settings.cache_file,
        weight = cfg.weight.as_str(),
        rollup = cfg.rollup.as_str(),
        mva = cfg.mva.include,
        buckets = ?cfg.days_out_buckets,
        "startup config"
    );

    // ---- Recorder (optional) ----
    let (rec_tx, rec_rx) = mpsc::channel::<Record>(64);
    let recorder_task = settings
        .record_file
        .clone()
        .map(|path| tokio::spawn(recorder::run(rec_rx, path)));

    if let Command::Holidays { from, to } = cli.command {
        let days = (from..=to.unwrap_or(from)).flat_map(holidays::holidays_for_year).collect();
        return finish(format!("years:{from}"), Report::Holidays(days), rec_tx, recorder_task).await;
    }

    // ---- Engine ----
    let default_weight = cfg.weight;
    let store = Arc::new(MemoryStore::load(&settings.data_file).await?);
    let mut engine = Engine::new(store, cfg);
    if let Some(path) = &settings.cache_file {
        engine = engine.with_cache(Arc::new(FileCache::new(path)));
    }

    let (scope, report) = match cli.command {
        Command::Series { window, weight } => {
            let range = DateRange::new(window.start, window.end)?;
            let series = engine
                .get_daily_series(&window.scope, range, weight.unwrap_or(default_weight))
                .await?;
            (window.scope, Report::DailySeries(series))
        }
        Command::Period { window, mva, daily } => {
            let range = DateRange::new(window.start, window.end)?;
            let m = engine.get_period_metrics(&window.scope, range, mva, daily).await?;
            (window.scope, Report::PeriodMetrics(m))
        }
        Command::Efficiency { window, analysis } => {
            let range = DateRange::new(window.start, window.end)?;
            let r = engine.analyze_efficiency(&window.scope, range, analysis).await?;
            (window.scope, Report::Efficiency(r))
        }
        Command::Timing { scope, analysis, buckets, compare_shows } => {
            let buckets = buckets.as_deref().and_then(config::parse_buckets);
            let r = engine.analyze_sales_timing(&scope, analysis, buckets, compare_shows).await?;
            (scope, Report::Timing(r))
        }
        Command::Holidays { .. } => return Ok(()),
    };

    finish(scope.to_string(), report, rec_tx, recorder_task).await
}

/// Prints the report and hands it to the recorder (if running).
async fn finish(
    scope: String,
    report: Report,
    rec_tx: mpsc::Sender<Record>,
    recorder_task: Option<tokio::task::JoinHandle<std::io::Result<()>>>,
) -> Result<(), EngineError> {
    print_json(&report)?;

    if let Some(task) = recorder_task {
        let _ = rec_tx.send(Record::new(scope, report)).await;
        drop(rec_tx);
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(?e, "recorder failed"),
            Err(e) => error!(?e, "recorder task panicked"),
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), EngineError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
