// ==========================================
// 需求聚合对账引擎 - 领域模型层
// ==========================================
// 职责: 定义聚合键、聚合值、计划文档、需求行与时间桶
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod aggregate;
pub mod bucket;
pub mod demand;
pub mod document;
pub mod run;
pub mod types;

// 重导出核心类型
pub use aggregate::{
    compare_keys, AggregateKey, AggregateValue, DemandAggregate, RecordHandle, StoredAggregate,
};
pub use bucket::{format_timestamp, parse_timestamp, Bucket, Horizon, TIMESTAMP_FORMAT};
pub use demand::{BucketedDemand, DemandLine};
pub use document::{PlanDocument, LEAF_FIELDS, LEAF_MARKER, LEAF_VALUE_FIELDS};
pub use run::{AggregateRunLogEntry, ReconcileCounters, RunStatus};
pub use types::DemandStatus;
