// ==========================================
// 需求聚合对账引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 增量维护 forecastplan 叶子聚合 (不做全量重算)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 聚合键/聚合值/计划文档
pub mod domain;

// 数据仓储层 - 需求源/时间桶/预测计划/运行日志
pub mod repository;

// 引擎层 - 聚合、对账、写回
pub mod engine;

// 配置层 - 系统参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    AggregateKey, AggregateValue, Bucket, BucketedDemand, DemandLine, DemandStatus, Horizon,
    PlanDocument, RecordHandle, StoredAggregate,
};

pub use engine::{
    AggregateDemandEngine, AggregationError, AggregationRunReport, DemandAggregator, Mutator,
    ReconcileCounters, ReconcilePlan,
};

pub use config::{AggregationConfigReader, ConfigManager};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "需求聚合对账引擎";
