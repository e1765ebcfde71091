// ==========================================
// 需求聚合对账引擎 - 聚合参数读取 Trait
// ==========================================
// 职责: 定义定时聚合命令所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::error::Error;

/// 未来区间默认天数
pub const DEFAULT_HORIZON_FUTURE_DAYS: i64 = 365;

/// 历史区间默认天数
pub const DEFAULT_HORIZON_HISTORY_DAYS: i64 = 10_000;

// ==========================================
// AggregationConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait AggregationConfigReader: Send + Sync {
    /// 获取聚合使用的时间桶日历
    ///
    /// # 返回
    /// - Some(String): 日历名称
    /// - None: 未配置（定时命令无法运行）
    async fn get_bucket_calendar(&self) -> Result<Option<String>, Box<dyn Error>>;

    /// 获取未来区间天数
    ///
    /// # 默认值
    /// - 365
    async fn get_horizon_future_days(&self) -> Result<i64, Box<dyn Error>>;

    /// 获取历史区间天数
    ///
    /// # 默认值
    /// - 10000
    async fn get_horizon_history_days(&self) -> Result<i64, Box<dyn Error>>;

    /// 获取当前业务日期
    ///
    /// # 默认值
    /// - 系统当前时间（本地时区）
    async fn get_current_date(&self) -> Result<NaiveDateTime, Box<dyn Error>>;
}
