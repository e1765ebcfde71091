// ==========================================
// 需求聚合对账引擎 - 引擎层
// ==========================================
// 职责: 需求聚合、有序归并对账、决策写回
// 红线: 分类阶段不写库; 写回只触碰叶子字段
// ==========================================

pub mod aggregate_demand;
pub mod aggregator;
pub mod error;
pub mod horizon_lock;
pub mod mutator;
pub mod reconciler;
pub mod store_cursor;

// 重导出核心引擎
pub use aggregate_demand::{AggregateDemandEngine, AggregationRunReport};
pub use aggregator::DemandAggregator;
pub use error::AggregationError;
pub use horizon_lock::{HorizonGuard, HorizonLockRegistry};
pub use mutator::{AggregateRecordWriter, MutationStats, Mutator};
pub use reconciler::{reconcile_streams, Decision, ReconcilePlan};
pub use store_cursor::AggregateStoreCursor;

pub use crate::domain::run::ReconcileCounters;
