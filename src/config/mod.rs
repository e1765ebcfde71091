// ==========================================
// 需求聚合对账引擎 - 配置层
// ==========================================
// 职责: 系统参数读取 (日历/对账区间/当前日期)
// 存储: config_kv 表
// ==========================================

pub mod aggregation_config_trait;
pub mod config_manager;

// 重导出核心配置管理器
pub use aggregation_config_trait::{
    AggregationConfigReader, DEFAULT_HORIZON_FUTURE_DAYS, DEFAULT_HORIZON_HISTORY_DAYS,
};
pub use config_manager::{config_keys, ConfigManager};
