//! Relational mirror of the gold metrics in SQLite.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::app::ports::{MetricsMirrorPort, MirrorReport};
use crate::constants::{
    COL_COLUNA, COL_METRICA, COL_PERCENTUAL_FALTANTE, COL_QUANTIDADE, DETAILS_TABLE, SUMMARY_TABLE,
};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::aggregate::{DetailTable, MetricsSnapshot};
use crate::pipeline::storage::RunToken;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS metrics_summary (
        id          TEXT PRIMARY KEY,
        run_ts      TEXT NOT NULL,
        metrica     TEXT NOT NULL,
        valor       TEXT,
        details     TEXT,
        created_at  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS metrics_details (
        id          TEXT PRIMARY KEY,
        run_ts      TEXT NOT NULL,
        tabela      TEXT NOT NULL,
        row_json    TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );
"#;

pub struct SqliteMetricsMirror {
    conn: Mutex<Connection>,
}

impl SqliteMetricsMirror {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::Config("mirror connection lock poisoned".to_string()))
    }

    /// Number of rows stored for `token` in `table`
    pub fn count_rows(&self, table: &str, token: &RunToken) -> Result<usize> {
        let conn = self.lock()?;
        let sql = match table {
            SUMMARY_TABLE => "SELECT COUNT(*) FROM metrics_summary WHERE run_ts = ?1",
            DETAILS_TABLE => "SELECT COUNT(*) FROM metrics_details WHERE run_ts = ?1",
            other => return Err(PipelineError::InvalidIdentifier(other.to_string())),
        };
        let count: i64 = conn.query_row(sql, params![token.as_str()], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// JSON body of one detail row; NaN becomes an explicit null
fn detail_rows_json(snapshot: &MetricsSnapshot) -> Vec<(&'static str, Value)> {
    let mut rows = Vec::with_capacity(snapshot.detail_row_count());
    for dist in &snapshot.distributions {
        for row in &dist.rows {
            let mut body = Map::new();
            body.insert(dist.table.label_column().to_string(), json!(row.category));
            body.insert(COL_QUANTIDADE.to_string(), json!(row.count));
            if let Some(tag) = dist.table.metric_tag() {
                body.insert(COL_METRICA.to_string(), json!(tag));
            }
            rows.push((dist.table.name(), Value::Object(body)));
        }
    }
    for missing in &snapshot.missing {
        let percent = Some(missing.percent_missing).filter(|p| p.is_finite());
        let mut body = Map::new();
        body.insert(COL_COLUNA.to_string(), json!(missing.column));
        body.insert(COL_PERCENTUAL_FALTANTE.to_string(), json!(percent));
        rows.push((DetailTable::Faltantes.name(), Value::Object(body)));
    }
    rows
}

#[async_trait]
impl MetricsMirrorPort for SqliteMetricsMirror {
    #[instrument(skip(self, snapshot), fields(run = %token))]
    async fn persist(&self, token: &RunToken, snapshot: &MetricsSnapshot) -> Result<MirrorReport> {
        let conn = self.lock()?;
        let created_at = Utc::now().to_rfc3339();
        let mut report = MirrorReport::default();

        for (metrica, value) in snapshot.summary.rows() {
            let inserted = conn.execute(
                "INSERT INTO metrics_summary (id, run_ts, metrica, valor, details, created_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    token.as_str(),
                    metrica,
                    value.to_text(),
                    created_at
                ],
            );
            match inserted {
                Ok(_) => report.summary_rows += 1,
                Err(e) => {
                    warn!("Failed to mirror summary metric {}: {}", metrica, e);
                    metrics::mirror::row_failed(SUMMARY_TABLE);
                    report.failed_rows += 1;
                }
            }
        }

        for (tabela, body) in detail_rows_json(snapshot) {
            let inserted = conn.execute(
                "INSERT INTO metrics_details (id, run_ts, tabela, row_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    token.as_str(),
                    tabela,
                    body.to_string(),
                    created_at
                ],
            );
            match inserted {
                Ok(_) => report.detail_rows += 1,
                Err(e) => {
                    warn!("Failed to mirror {} row: {}", tabela, e);
                    metrics::mirror::row_failed(DETAILS_TABLE);
                    report.failed_rows += 1;
                }
            }
        }

        metrics::mirror::rows_written(SUMMARY_TABLE, report.summary_rows);
        metrics::mirror::rows_written(DETAILS_TABLE, report.detail_rows);
        info!(
            "Persisted {} summary and {} detail rows for run {}",
            report.summary_rows, report.detail_rows, token
        );
        Ok(report)
    }
}
