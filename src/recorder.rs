// ===============================
// src/recorder.rs
// ===============================
//
// Light JSONL report log:
// - every computed report is appended as one JSON line
// - BufWriter, flushed every second and/or every 100 records
// - parent directory created when missing
// - on write failure reopen the file once and carry on
//
// ENV: `RECORD_FILE=/path/to/reports.jsonl` enables it (see main.rs).
//
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::DailySalesPoint;
use crate::efficiency::{EfficiencyReport, PeriodMetrics};
use crate::holidays::Holiday;
use crate::timing::TimingReport;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "report", rename_all = "camelCase")]
pub enum Report {
    DailySeries(Vec<DailySalesPoint>),
    PeriodMetrics(PeriodMetrics),
    Efficiency(EfficiencyReport),
    Timing(TimingReport),
    Holidays(Vec<Holiday>),
    Note(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub at: DateTime<Utc>,
    pub scope: String,
    #[serde(flatten)]
    pub report: Report,
}

impl Record {
    pub fn new(scope: impl Into<String>, report: Report) -> Self {
        Self { at: Utc::now(), scope: scope.into(), report }
    }
}

async fn open_writer(path: &str) -> std::io::Result<BufWriter<tokio::fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(?e, %path, "recorder: create_dir_all failed");
            }
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

pub async fn run(mut rx: mpsc::Receiver<Record>, path: String) -> std::io::Result<()> {
    info!(%path, "recorder: started");
    let mut writer = open_writer(&path).await?;

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut since_last_flush: u32 = 0;
    const FLUSH_EVERY_N_RECORDS: u32 = 100;

    loop {
        tokio::select! {
            maybe_rec = rx.recv() => {
                let Some(rec) = maybe_rec else {
                    writer.flush().await?;
                    info!("recorder: channel closed, stopped");
                    return Ok(());
                };
                let mut line = match serde_json::to_vec(&rec) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip record");
                        continue;
                    }
                };
                line.push(b'\n');

                if let Err(e) = writer.write_all(&line).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    writer = open_writer(&path).await?;
                    if let Err(e2) = writer.write_all(&line).await {
                        error!(?e2, "recorder: write failed again after reopen, drop record");
                        continue;
                    }
                }

                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_RECORDS {
                    writer.flush().await?;
                    since_last_flush = 0;
                }
            }

            _ = tick.tick() => {
                if since_last_flush > 0 {
                    writer.flush().await?;
                    since_last_flush = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("reports.jsonl");
        let path_str = path.to_string_lossy().to_string();

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run(rx, path_str));
        tx.send(Record::new("project:p1", Report::Note("hello".into()))).await.unwrap();
        tx.send(Record::new("project:p1", Report::Holidays(Vec::new()))).await.unwrap();
        drop(tx);
        task.await.unwrap().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "note");
        assert_eq!(first["report"], "hello");
        assert_eq!(first["scope"], "project:p1");
    }
}
