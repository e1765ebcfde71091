// ==========================================
// 需求聚合对账引擎 - 需求源仓储 (只读)
// ==========================================
// 数据来源: demand + item(cost) + common_bucketdetail
// 排序: item, location, customer, 桶起始, 交期, 需求编号
// 说明: 末尾的交期/编号只用于固定浮点累加顺序, 保证重复对账结果一致
// 说明: 时间列一律经 datetime() 归一后再比较/排序, 纯日期与 ISO 'T' 写法按同一时刻处理
// ==========================================

use crate::domain::bucket::{Bucket, Horizon};
use crate::domain::demand::{BucketedDemand, DemandLine};
use crate::domain::types::DemandStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{conversion_error, optional_timestamp_column, timestamp_column};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row, Statement};

const DEMAND_FEED_SQL: &str = r#"
    SELECT
        d.name, d.item_id, d.location_id, d.customer_id,
        d.due, d.quantity, d.status, i.cost,
        b.bucket_id, datetime(b.startdate), datetime(b.enddate)
    FROM demand d
    INNER JOIN item i
        ON d.item_id = i.name
    INNER JOIN common_bucketdetail b
        ON b.bucket_id = ?1
        AND datetime(d.due) >= datetime(b.startdate)
        AND datetime(d.due) < datetime(b.enddate)
    WHERE d.status IS NOT 'canceled'
      AND datetime(b.startdate) >= ?2
      AND datetime(b.startdate) < ?3
    ORDER BY d.item_id, d.location_id, d.customer_id, datetime(b.startdate), datetime(d.due), d.name
"#;

// ==========================================
// DemandFeedRepository - 需求源仓储
// ==========================================
pub struct DemandFeedRepository<'c> {
    conn: &'c Connection,
}

impl<'c> DemandFeedRepository<'c> {
    /// 借用连接（或事务）创建仓储
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// 准备排序后的需求扫描
    pub fn prepare_scan(&self) -> RepositoryResult<DemandFeedScan<'c>> {
        let stmt = self.conn.prepare(DEMAND_FEED_SQL)?;
        Ok(DemandFeedScan { stmt })
    }

    /// 最早的需求交期（无需求时返回 None）
    pub fn earliest_due(&self) -> RepositoryResult<Option<NaiveDateTime>> {
        let due = self
            .conn
            .query_row("SELECT MIN(datetime(due)) FROM demand", [], |row| {
                optional_timestamp_column(row, 0)
            })?;
        Ok(due)
    }
}

/// 需求源行转换
fn map_demand_row(row: &Row<'_>) -> rusqlite::Result<BucketedDemand> {
    let status = row
        .get::<_, Option<String>>(6)?
        .map(|s| s.parse::<DemandStatus>())
        .transpose()
        .map_err(|message| conversion_error(6, message))?;

    let line = DemandLine {
        name: row.get(0)?,
        item_id: row.get(1)?,
        location_id: row.get(2)?,
        customer_id: row.get(3)?,
        due: timestamp_column(row, 4)?,
        quantity: row.get(5)?,
        status,
        unit_cost: row.get(7)?,
    };

    let bucket = Bucket {
        calendar: row.get(8)?,
        startdate: timestamp_column(row, 9)?,
        enddate: timestamp_column(row, 10)?,
    };

    Ok(BucketedDemand { bucket, line })
}

// ==========================================
// DemandFeedScan - 前向只读游标
// ==========================================
pub struct DemandFeedScan<'c> {
    stmt: Statement<'c>,
}

impl<'c> DemandFeedScan<'c> {
    /// 打开游标: 指定日历在对账区间内的全部非取消需求
    ///
    /// 惰性读取, 每次 next() 从 SQLite 取一行
    pub fn iter<'s>(
        &'s mut self,
        bucket_calendar: &str,
        horizon: &Horizon,
    ) -> RepositoryResult<impl Iterator<Item = RepositoryResult<BucketedDemand>> + 's> {
        let rows = self.stmt.query_map(
            params![bucket_calendar, horizon.start_str(), horizon.end_str()],
            map_demand_row,
        )?;
        Ok(rows.map(|r| r.map_err(RepositoryError::from)))
    }
}
