// ==========================================
// 需求聚合对账引擎 - 时间桶仓储 (只读)
// ==========================================
// 数据来源: common_bucketdetail (外部维护的日历)
// ==========================================

use crate::domain::bucket::{Bucket, Horizon};
use crate::repository::error::RepositoryResult;
use crate::repository::timestamp_column;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};

pub struct BucketRepository<'c> {
    conn: &'c Connection,
}

fn map_bucket_row(row: &Row<'_>) -> SqliteResult<Bucket> {
    Ok(Bucket {
        calendar: row.get(0)?,
        startdate: timestamp_column(row, 1)?,
        enddate: timestamp_column(row, 2)?,
    })
}

impl<'c> BucketRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// 日历是否存在（至少有一个桶）
    pub fn calendar_exists(&self, bucket_calendar: &str) -> RepositoryResult<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM common_bucketdetail WHERE bucket_id = ?1 LIMIT 1",
                params![bucket_calendar],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    /// 查询起始时间落在对账区间内的全部桶（按起始时间排序）
    pub fn list_in_horizon(
        &self,
        bucket_calendar: &str,
        horizon: &Horizon,
    ) -> RepositoryResult<Vec<Bucket>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT bucket_id, startdate, enddate
            FROM common_bucketdetail
            WHERE bucket_id = ?1
              AND datetime(startdate) >= ?2
              AND datetime(startdate) < ?3
            ORDER BY datetime(startdate)
            "#,
        )?;

        let buckets = stmt
            .query_map(
                params![bucket_calendar, horizon.start_str(), horizon.end_str()],
                map_bucket_row,
            )?
            .collect::<SqliteResult<Vec<Bucket>>>()?;

        Ok(buckets)
    }
}
