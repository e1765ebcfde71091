// ==========================================
// 需求聚合对账引擎 - 对账运行日志仓储
// ==========================================
// 表: aggregate_run_log
// 成功记录与对账写入同一事务; 失败记录在回滚后单独写入
// ==========================================

use crate::domain::bucket::format_timestamp;
use crate::domain::run::{AggregateRunLogEntry, ReconcileCounters, RunStatus};
use crate::repository::error::RepositoryResult;
use crate::repository::timestamp_column;
use rusqlite::{params, Connection, Result as SqliteResult, Row};

pub struct RunLogRepository<'c> {
    conn: &'c Connection,
}

impl<'c> RunLogRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// 写入一条运行记录
    pub fn insert(&self, entry: &AggregateRunLogEntry) -> RepositoryResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO aggregate_run_log (
                run_id,
                bucket_calendar,
                horizon_start,
                horizon_end,
                inserted,
                updated,
                deleted,
                unchanged,
                status,
                error_message,
                started_at,
                completed_at,
                duration_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                entry.run_id,
                entry.bucket_calendar,
                format_timestamp(&entry.horizon_start),
                format_timestamp(&entry.horizon_end),
                entry.counters.inserted as i64,
                entry.counters.updated as i64,
                entry.counters.deleted as i64,
                entry.counters.unchanged as i64,
                entry.status.as_str(),
                entry.error_message,
                entry.started_at,
                entry.completed_at,
                entry.duration_ms,
            ],
        )?;
        Ok(())
    }

    /// 最近的运行记录（按开始时间倒序）
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<AggregateRunLogEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
              run_id,
              bucket_calendar,
              horizon_start,
              horizon_end,
              inserted,
              updated,
              deleted,
              unchanged,
              status,
              error_message,
              started_at,
              completed_at,
              duration_ms
            FROM aggregate_run_log
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;

        let entries = stmt
            .query_map(params![limit as i64], map_log_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }
}

fn map_log_row(row: &Row<'_>) -> SqliteResult<AggregateRunLogEntry> {
    let status: String = row.get(8)?;
    Ok(AggregateRunLogEntry {
        run_id: row.get(0)?,
        bucket_calendar: row.get(1)?,
        horizon_start: timestamp_column(row, 2)?,
        horizon_end: timestamp_column(row, 3)?,
        counters: ReconcileCounters {
            inserted: row.get::<_, i64>(4)? as usize,
            updated: row.get::<_, i64>(5)? as usize,
            deleted: row.get::<_, i64>(6)? as usize,
            unchanged: row.get::<_, i64>(7)? as usize,
        },
        status: RunStatus::from_str(&status),
        error_message: row.get(9)?,
        started_at: row.get(10)?,
        completed_at: row.get(11)?,
        duration_ms: row.get(12)?,
    })
}
