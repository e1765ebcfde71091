// ==========================================
// 需求聚合对账引擎 - 写回器
// ==========================================
// 把对账决策写入预测计划存储, 只触碰文档中的叶子字段:
// - INSERT: 按键 upsert, 已有记录(如人工覆写)则合并
// - UPDATE: 按句柄合并叶子字段
// - DELETE: 按句柄删除叶子字段, 记录本身保留
// ==========================================

use crate::domain::aggregate::{AggregateKey, RecordHandle};
use crate::domain::document::{PlanDocument, LEAF_FIELDS};
use crate::engine::error::AggregationError;
use crate::engine::reconciler::Decision;
use crate::repository::error::RepositoryResult;
use crate::repository::forecast_plan_repo::{ForecastPlanRepository, UpsertOutcome};

// ==========================================
// AggregateRecordWriter - 叶子记录写接口
// ==========================================
pub trait AggregateRecordWriter {
    /// 按键插入叶子字段, 已存在则合并
    fn upsert_leaf(&self, key: &AggregateKey, overlay: &PlanDocument)
        -> RepositoryResult<UpsertOutcome>;

    /// 按句柄合并叶子字段
    fn merge_leaf(&self, handle: RecordHandle, overlay: &PlanDocument) -> RepositoryResult<()>;

    /// 按句柄清除叶子字段, 返回删除的键数量
    fn clear_leaf(&self, handle: RecordHandle) -> RepositoryResult<usize>;
}

impl AggregateRecordWriter for ForecastPlanRepository<'_> {
    fn upsert_leaf(
        &self,
        key: &AggregateKey,
        overlay: &PlanDocument,
    ) -> RepositoryResult<UpsertOutcome> {
        self.upsert_merge(key, overlay)
    }

    fn merge_leaf(&self, handle: RecordHandle, overlay: &PlanDocument) -> RepositoryResult<()> {
        self.merge_by_handle(handle, overlay)
    }

    fn clear_leaf(&self, handle: RecordHandle) -> RepositoryResult<usize> {
        self.remove_keys_by_handle(handle, &LEAF_FIELDS)
    }
}

/// 写回统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationStats {
    /// 新建的记录
    pub created: usize,
    /// 合并进已有记录 (INSERT 命中非叶子记录 + UPDATE)
    pub merged: usize,
    /// 清除叶子字段的记录
    pub cleared: usize,
}

// ==========================================
// Mutator - 决策写回
// ==========================================
pub struct Mutator<'w, W: AggregateRecordWriter + ?Sized> {
    writer: &'w W,
}

impl<'w, W: AggregateRecordWriter + ?Sized> Mutator<'w, W> {
    pub fn new(writer: &'w W) -> Self {
        Self { writer }
    }

    /// 按顺序执行决策; 任一写入失败立即返回 (由调用方回滚)
    pub fn apply(&self, decisions: &[Decision]) -> Result<MutationStats, AggregationError> {
        let mut stats = MutationStats::default();

        for decision in decisions {
            match decision {
                Decision::Insert { key, value } => {
                    let overlay = PlanDocument::leaf_overlay(value);
                    match self.writer.upsert_leaf(key, &overlay)? {
                        UpsertOutcome::Inserted => stats.created += 1,
                        UpsertOutcome::Merged => {
                            tracing::debug!(key = %key, "叶子字段合并进已有记录");
                            stats.merged += 1;
                        }
                    }
                }
                Decision::Update { handle, value, .. } => {
                    let overlay = PlanDocument::leaf_overlay(value);
                    self.writer.merge_leaf(*handle, &overlay)?;
                    stats.merged += 1;
                }
                Decision::Delete { handle, .. } => {
                    self.writer.clear_leaf(*handle)?;
                    stats.cleared += 1;
                }
            }

            tracing::debug!(
                decision = decision.kind(),
                key = %decision.key(),
                "决策已写回"
            );
        }

        Ok(stats)
    }
}
