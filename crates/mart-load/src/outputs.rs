//! Per-run outputs: quality scores, customer segments and run history.

use chrono::{DateTime, Utc};
use mart_model::{CustomerSegment, QualityScoreRecord, RunReport, TIMESTAMP_FORMAT};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tracing::info;

use crate::error::{LoadError, Result};
use crate::warehouse::{Warehouse, begin};

/// A quality score as stored in `quality_scores`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredQualityScore {
    pub table: String,
    pub run_id: String,
    pub row_count: u64,
    pub completeness: f64,
    pub uniqueness: f64,
    pub validity: f64,
    pub score: f64,
}

/// One row of `etl_runs` without its report body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub as_of: String,
    pub status: String,
    pub total_ms: u64,
}

impl Warehouse {
    /// Replaces every stored quality score with this run's scores.
    pub fn replace_quality_scores(
        &self,
        run_id: &str,
        as_of: DateTime<Utc>,
        scores: &[QualityScoreRecord],
    ) -> Result<()> {
        let computed_at = as_of.format(TIMESTAMP_FORMAT).to_string();
        let mut conn = self.connection();
        let tx = begin(&mut conn, "quality scores")?;
        tx.execute("DELETE FROM quality_scores", [])
            .map_err(LoadError::sqlite("failed to clear quality scores"))?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO quality_scores (
                        table_name, run_id, row_count, completeness, uniqueness,
                        validity, score, columns_json, computed_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .map_err(LoadError::sqlite("failed to prepare quality insert"))?;
            for score in scores {
                let columns = serde_json::to_string(&score.columns)?;
                insert
                    .execute(params![
                        score.table.as_str(),
                        run_id,
                        score.row_count as i64,
                        score.completeness,
                        score.uniqueness,
                        score.validity,
                        score.score,
                        columns,
                        computed_at,
                    ])
                    .map_err(LoadError::sqlite(format!("{}: failed to store quality score", score.table)))?;
            }
        }
        tx.commit()
            .map_err(LoadError::sqlite("failed to commit quality scores"))?;
        info!(tables = scores.len(), "stored quality scores");
        Ok(())
    }

    /// Replaces every stored customer segment with this run's segments.
    pub fn replace_customer_segments(
        &self,
        run_id: &str,
        as_of: DateTime<Utc>,
        segments: &[CustomerSegment],
    ) -> Result<()> {
        let computed_at = as_of.format(TIMESTAMP_FORMAT).to_string();
        let mut conn = self.connection();
        let tx = begin(&mut conn, "customer segments")?;
        tx.execute("DELETE FROM customer_segments", [])
            .map_err(LoadError::sqlite("failed to clear customer segments"))?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO customer_segments (
                        customer_id, run_id, recency_days, frequency, monetary,
                        value_tier, activity_status, r_score, f_score, m_score,
                        rfm_segment, computed_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                )
                .map_err(LoadError::sqlite("failed to prepare segment insert"))?;
            for segment in segments {
                insert
                    .execute(params![
                        segment.customer_id,
                        run_id,
                        segment.recency_days,
                        segment.frequency as i64,
                        segment.monetary,
                        segment.value_tier.to_string(),
                        segment.activity_status.to_string(),
                        segment.r_score,
                        segment.f_score,
                        segment.m_score,
                        segment.rfm_segment.to_string(),
                        computed_at,
                    ])
                    .map_err(LoadError::sqlite(format!(
                        "customer {}: failed to store segment",
                        segment.customer_id
                    )))?;
            }
        }
        tx.commit()
            .map_err(LoadError::sqlite("failed to commit customer segments"))?;
        info!(customers = segments.len(), "stored customer segments");
        Ok(())
    }

    /// Appends the run to `etl_runs` with its full JSON report.
    pub fn record_run(&self, report: &RunReport) -> Result<()> {
        let body = serde_json::to_string(report)?;
        let conn = self.connection();
        conn.execute(
            "INSERT INTO etl_runs (run_id, as_of, status, total_ms, report_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (run_id) DO UPDATE SET
                 status = excluded.status,
                 total_ms = excluded.total_ms,
                 report_json = excluded.report_json",
            params![
                report.run_id,
                report.as_of.format(TIMESTAMP_FORMAT).to_string(),
                report.status.as_str(),
                report.total_ms as i64,
                body,
            ],
        )
        .map_err(LoadError::sqlite("failed to record run"))?;
        Ok(())
    }

    pub fn quality_scores(&self) -> Result<Vec<StoredQualityScore>> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare(
                "SELECT table_name, run_id, row_count, completeness, uniqueness, validity, score
                 FROM quality_scores ORDER BY table_name",
            )
            .map_err(LoadError::sqlite("failed to read quality scores"))?;
        stmt.query_map([], |row| {
            Ok(StoredQualityScore {
                table: row.get(0)?,
                run_id: row.get(1)?,
                row_count: row.get::<_, i64>(2)?.max(0) as u64,
                completeness: row.get(3)?,
                uniqueness: row.get(4)?,
                validity: row.get(5)?,
                score: row.get(6)?,
            })
        })
        .and_then(|rows| rows.collect())
        .map_err(LoadError::sqlite("failed to read quality scores"))
    }

    /// Recorded runs, most recent first.
    pub fn runs(&self) -> Result<Vec<RunSummary>> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare("SELECT run_id, as_of, status, total_ms FROM etl_runs ORDER BY rowid DESC")
            .map_err(LoadError::sqlite("failed to read run history"))?;
        stmt.query_map([], |row| {
            Ok(RunSummary {
                run_id: row.get(0)?,
                as_of: row.get(1)?,
                status: row.get(2)?,
                total_ms: row.get::<_, i64>(3)?.max(0) as u64,
            })
        })
        .and_then(|rows| rows.collect())
        .map_err(LoadError::sqlite("failed to read run history"))
    }

    /// Stored JSON report of one run.
    pub fn run_report(&self, run_id: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.connection();
        let body: Option<String> = conn
            .query_row(
                "SELECT report_json FROM etl_runs WHERE run_id = ?1",
                [run_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(LoadError::sqlite("failed to read run report"))?;
        body.map(|body| serde_json::from_str(&body).map_err(LoadError::from))
            .transpose()
    }
}
