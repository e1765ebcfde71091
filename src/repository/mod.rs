// ==========================================
// 需求聚合对账引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 仓储借用调用方的连接/事务, 保证一次对账只在一个事务内完成
// ==========================================

pub mod bucket_repo;
pub mod demand_repo;
pub mod error;
pub mod forecast_plan_repo;
pub mod run_log_repo;

// 重导出核心仓储
pub use bucket_repo::BucketRepository;
pub use demand_repo::{DemandFeedRepository, DemandFeedScan};
pub use error::{RepositoryError, RepositoryResult};
pub use forecast_plan_repo::{
    ForecastPlanRecord, ForecastPlanRepository, LeafCandidateScan, UpsertOutcome,
};
pub use run_log_repo::RunLogRepository;

use crate::domain::bucket::parse_timestamp;
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Row;

/// 读取时间戳列（TEXT）
pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|message| conversion_error(idx, message))
}

/// 读取可空时间戳列
pub(crate) fn optional_timestamp_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_timestamp(&s).map_err(|message| conversion_error(idx, message)))
        .transpose()
}

/// 构造列转换错误
pub(crate) fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(RepositoryError::FieldValueError {
            field: format!("column#{}", idx),
            message,
        }),
    )
}
