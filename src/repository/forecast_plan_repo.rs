// ==========================================
// 需求聚合对账引擎 - 预测计划仓储
// ==========================================
// 表: forecastplan (item_id, location_id, customer_id, startdate, enddate, value)
// value 为开放式 JSON 文档, 本仓储只做"按键覆盖/按键删除", 不整体替换
// 按键查找一律使用 IS (NULL 安全相等)
// startdate/enddate 经 datetime() 归一后比较, 兼容外部写入的纯日期或 ISO 'T' 写法
// ==========================================

use crate::domain::aggregate::{AggregateKey, RecordHandle, StoredAggregate};
use crate::domain::bucket::{format_timestamp, Horizon};
use crate::domain::document::PlanDocument;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::timestamp_column;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row, Statement};

/// 叶子候选扫描: 文档带 leaf 标记且起始时间在区间内, 与聚合键同序
///
/// json_type 只在合法 JSON 上求值（CASE 保证短路）
const LEAF_SCAN_SQL: &str = r#"
    SELECT id, item_id, location_id, customer_id, startdate, enddate, value
    FROM forecastplan
    WHERE CASE WHEN json_valid(value) THEN json_type(value, '$.leaf') IS NOT NULL ELSE 0 END
      AND datetime(startdate) >= ?1
      AND datetime(startdate) < ?2
    ORDER BY item_id, location_id, customer_id, datetime(startdate)
"#;

const RECORD_COLUMNS: &str =
    "id, item_id, location_id, customer_id, startdate, enddate, value";

// ==========================================
// ForecastPlanRecord - 预测计划记录
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPlanRecord {
    pub handle: RecordHandle,
    pub key: AggregateKey,
    pub document: PlanDocument,
}

/// 按键 upsert 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// 新建记录
    Inserted,
    /// 已有记录（例如只有人工覆写），叶子字段合并进原文档
    Merged,
}

fn map_key(row: &Row<'_>) -> SqliteResult<AggregateKey> {
    Ok(AggregateKey::new(
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        timestamp_column(row, 4)?,
        timestamp_column(row, 5)?,
    ))
}

fn map_record_row(row: &Row<'_>) -> SqliteResult<ForecastPlanRecord> {
    let raw: Option<String> = row.get(6)?;
    let (document, _) = PlanDocument::parse(raw.as_deref());
    Ok(ForecastPlanRecord {
        handle: RecordHandle::from_row_id(row.get(0)?),
        key: map_key(row)?,
        document,
    })
}

fn map_candidate_row(row: &Row<'_>) -> SqliteResult<StoredAggregate> {
    let raw: Option<String> = row.get(6)?;
    let (document, parsed) = PlanDocument::parse(raw.as_deref());
    let (value, complete) = document.leaf_value();
    Ok(StoredAggregate {
        key: map_key(row)?,
        value,
        handle: RecordHandle::from_row_id(row.get(0)?),
        incomplete: !parsed || !complete,
    })
}

// ==========================================
// ForecastPlanRepository - 预测计划仓储
// ==========================================
pub struct ForecastPlanRepository<'c> {
    conn: &'c Connection,
}

impl<'c> ForecastPlanRepository<'c> {
    /// 借用连接（或事务）创建仓储
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// 准备叶子候选扫描
    pub fn prepare_leaf_scan(&self) -> RepositoryResult<LeafCandidateScan<'c>> {
        let stmt = self.conn.prepare(LEAF_SCAN_SQL)?;
        Ok(LeafCandidateScan { stmt })
    }

    /// 按聚合键查询（NULL 安全）
    pub fn find_by_key(&self, key: &AggregateKey) -> RepositoryResult<Option<ForecastPlanRecord>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM forecastplan
            WHERE item_id IS ?1
              AND location_id IS ?2
              AND customer_id IS ?3
              AND datetime(startdate) = ?4
            "#,
            RECORD_COLUMNS
        );
        let record = self
            .conn
            .query_row(
                &sql,
                params![
                    key.item,
                    key.location,
                    key.customer,
                    format_timestamp(&key.startdate)
                ],
                map_record_row,
            )
            .optional()?;
        Ok(record)
    }

    /// 按句柄查询
    pub fn find_by_handle(&self, handle: RecordHandle) -> RepositoryResult<Option<ForecastPlanRecord>> {
        let sql = format!("SELECT {} FROM forecastplan WHERE id = ?1", RECORD_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, params![handle.row_id()], map_record_row)
            .optional()?;
        Ok(record)
    }

    /// 查询全部记录（按聚合键排序）
    pub fn list_all(&self) -> RepositoryResult<Vec<ForecastPlanRecord>> {
        let sql = format!(
            "SELECT {} FROM forecastplan ORDER BY item_id, location_id, customer_id, datetime(startdate)",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], map_record_row)?
            .collect::<SqliteResult<Vec<ForecastPlanRecord>>>()?;
        Ok(records)
    }

    /// 统计区间内的叶子记录数
    pub fn count_leaf_records(&self, horizon: &Horizon) -> RepositoryResult<i64> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM forecastplan
            WHERE CASE WHEN json_valid(value) THEN json_type(value, '$.leaf') IS NOT NULL ELSE 0 END
              AND datetime(startdate) >= ?1
              AND datetime(startdate) < ?2
            "#,
            params![horizon.start_str(), horizon.end_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 按键插入或合并
    ///
    /// - 记录不存在: 以覆盖层为文档新建
    /// - 记录已存在: 覆盖层合并进原文档, 其他字段保留
    pub fn upsert_merge(
        &self,
        key: &AggregateKey,
        overlay: &PlanDocument,
    ) -> RepositoryResult<UpsertOutcome> {
        match self.find_by_key(key)? {
            Some(record) => {
                let mut document = record.document;
                document.merge(overlay);
                self.write_document(record.handle, &document)?;
                Ok(UpsertOutcome::Merged)
            }
            None => {
                self.conn.execute(
                    r#"
                    INSERT INTO forecastplan
                        (item_id, location_id, customer_id, startdate, enddate, value)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        key.item,
                        key.location,
                        key.customer,
                        format_timestamp(&key.startdate),
                        format_timestamp(&key.enddate),
                        overlay.to_json(),
                    ],
                )?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// 按句柄合并覆盖层
    pub fn merge_by_handle(
        &self,
        handle: RecordHandle,
        overlay: &PlanDocument,
    ) -> RepositoryResult<()> {
        let mut document = self.load_document(handle)?;
        document.merge(overlay);
        self.write_document(handle, &document)
    }

    /// 按句柄删除指定文档键
    ///
    /// # 返回
    /// - 实际删除的键数量
    pub fn remove_keys_by_handle(
        &self,
        handle: RecordHandle,
        keys: &[&str],
    ) -> RepositoryResult<usize> {
        let mut document = self.load_document(handle)?;
        let removed = document.remove_keys(keys);
        if removed > 0 {
            self.write_document(handle, &document)?;
        }
        Ok(removed)
    }

    /// 清理失效时间桶的记录
    ///
    /// 保留条件: (startdate, enddate) 是日历在区间内的某个桶, 且桶结束时间晚于 enddate_floor
    ///
    /// # 返回
    /// - 删除的记录数
    pub fn delete_obsolete_buckets(
        &self,
        bucket_calendar: &str,
        horizon: &Horizon,
        enddate_floor: &NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let deleted = self.conn.execute(
            r#"
            DELETE FROM forecastplan
            WHERE NOT EXISTS (
                SELECT 1
                FROM common_bucketdetail b
                WHERE b.bucket_id = ?1
                  AND datetime(b.startdate) >= ?2
                  AND datetime(b.startdate) < ?3
                  AND datetime(b.enddate) > ?4
                  AND datetime(b.startdate) = datetime(forecastplan.startdate)
                  AND datetime(b.enddate) = datetime(forecastplan.enddate)
            )
            "#,
            params![
                bucket_calendar,
                horizon.start_str(),
                horizon.end_str(),
                format_timestamp(enddate_floor),
            ],
        )?;
        Ok(deleted)
    }

    /// 删除文档为空的记录
    ///
    /// # 返回
    /// - 删除的记录数
    pub fn delete_empty(&self) -> RepositoryResult<usize> {
        let deleted = self.conn.execute(
            r#"
            DELETE FROM forecastplan
            WHERE value IS NULL
               OR CASE WHEN json_valid(value) THEN json(value) = '{}' ELSE 0 END
            "#,
            [],
        )?;
        Ok(deleted)
    }

    fn load_document(&self, handle: RecordHandle) -> RepositoryResult<PlanDocument> {
        let raw: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT value FROM forecastplan WHERE id = ?1",
                params![handle.row_id()],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(PlanDocument::parse(raw.as_deref()).0),
            None => Err(RepositoryError::NotFound {
                entity: "forecastplan".to_string(),
                id: handle.row_id().to_string(),
            }),
        }
    }

    fn write_document(&self, handle: RecordHandle, document: &PlanDocument) -> RepositoryResult<()> {
        let updated = self.conn.execute(
            "UPDATE forecastplan SET value = ?2 WHERE id = ?1",
            params![handle.row_id(), document.to_json()],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "forecastplan".to_string(),
                id: handle.row_id().to_string(),
            });
        }
        Ok(())
    }
}

// ==========================================
// LeafCandidateScan - 叶子候选前向游标
// ==========================================
// 行锁语义由调用方的 IMMEDIATE 事务提供: 从第一行读取到提交期间持有写锁
pub struct LeafCandidateScan<'c> {
    stmt: Statement<'c>,
}

impl<'c> LeafCandidateScan<'c> {
    /// 打开游标（惰性逐行读取）
    pub fn iter<'s>(
        &'s mut self,
        horizon: &Horizon,
    ) -> RepositoryResult<impl Iterator<Item = RepositoryResult<StoredAggregate>> + 's> {
        let rows = self.stmt.query_map(
            params![horizon.start_str(), horizon.end_str()],
            map_candidate_row,
        )?;
        Ok(rows.map(|r| r.map_err(RepositoryError::from)))
    }
}
