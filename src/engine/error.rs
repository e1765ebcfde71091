// ==========================================
// 需求聚合对账引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类:
// - 前置条件违反 (输入未排序): 致命, 整个对账回滚
// - 参数错误 (区间/日历/配置)
// - 存储错误: 透传仓储层错误, 整个对账回滚
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum AggregationError {
    // ===== 前置条件 =====
    #[error("输入流未按聚合键排序 (stream={stream}): {previous} 之后出现 {current}")]
    UnsortedInput {
        stream: &'static str,
        previous: String,
        current: String,
    },

    // ===== 参数错误 =====
    #[error("对账区间无效: [{start}, {end})")]
    InvalidHorizon { start: String, end: String },

    #[error("时间桶日历不存在: {0}")]
    UnknownCalendar(String),

    #[error("缺少配置项: {0}")]
    MissingConfig(&'static str),

    #[error("配置读取失败 (key: {key}): {message}")]
    InvalidConfig { key: &'static str, message: String },

    // ===== 并发 =====
    #[error("锁获取失败: {0}")]
    LockPoisoned(String),

    // ===== 存储错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<rusqlite::Error> for AggregationError {
    fn from(err: rusqlite::Error) -> Self {
        AggregationError::Repository(RepositoryError::from(err))
    }
}

impl AggregationError {
    /// 是否为输入排序前置条件违反
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, AggregationError::UnsortedInput { .. })
    }
}
