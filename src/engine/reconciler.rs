// ==========================================
// 需求聚合对账引擎 - 对账器 (有序归并)
// ==========================================
// 两路输入按同一键序前进, 已耗尽的一路视为 +∞:
//
//   D 与 F 键相等          → 值不同则 UPDATE, 否则不变; 两路都前进
//   F 存在且 (D 耗尽或 F<D) → DELETE (清除叶子字段); F 前进
//   D 存在且 (F 耗尽或 D<F) → INSERT; D 前进
//
// 本模块只做分类, 不写库; 决策按键升序排列
// ==========================================

use crate::domain::aggregate::{
    compare_keys, AggregateKey, AggregateValue, DemandAggregate, RecordHandle, StoredAggregate,
};
use crate::domain::run::ReconcileCounters;
use crate::engine::error::AggregationError;
use std::cmp::Ordering;

/// 单个聚合键的处理决策
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// 需求侧有、存储侧无叶子记录
    Insert {
        key: AggregateKey,
        value: AggregateValue,
    },
    /// 两侧都有但值不同
    Update {
        handle: RecordHandle,
        key: AggregateKey,
        value: AggregateValue,
    },
    /// 存储侧有叶子记录、需求侧无
    Delete {
        handle: RecordHandle,
        key: AggregateKey,
    },
}

impl Decision {
    pub fn key(&self) -> &AggregateKey {
        match self {
            Decision::Insert { key, .. }
            | Decision::Update { key, .. }
            | Decision::Delete { key, .. } => key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Decision::Insert { .. } => "INSERT",
            Decision::Update { .. } => "UPDATE",
            Decision::Delete { .. } => "DELETE",
        }
    }
}

/// 对账结果: 有序决策 + 分类计数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub decisions: Vec<Decision>,
    pub counters: ReconcileCounters,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.decisions.is_empty()
    }

    fn insert(&mut self, demand: DemandAggregate) {
        self.counters.inserted += 1;
        self.decisions.push(Decision::Insert {
            key: demand.key,
            value: demand.value,
        });
    }

    fn delete(&mut self, stored: StoredAggregate) {
        self.counters.deleted += 1;
        self.decisions.push(Decision::Delete {
            handle: stored.handle,
            key: stored.key,
        });
    }

    fn matched(&mut self, demand: DemandAggregate, stored: StoredAggregate) {
        // 叶子字段残缺的记录无论数值如何都要重写
        if stored.incomplete || demand.value.is_distinct_from(&stored.value) {
            self.counters.updated += 1;
            self.decisions.push(Decision::Update {
                handle: stored.handle,
                key: demand.key,
                value: demand.value,
            });
        } else {
            self.counters.unchanged += 1;
        }
    }
}

fn advance<T, I>(stream: &mut I) -> Result<Option<T>, AggregationError>
where
    I: Iterator<Item = Result<T, AggregationError>>,
{
    stream.next().transpose()
}

/// 归并需求聚合流与叶子记录流
///
/// 任一输入报错即终止, 已分类的决策全部丢弃
pub fn reconcile_streams<D, S>(mut demand: D, mut stored: S) -> Result<ReconcilePlan, AggregationError>
where
    D: Iterator<Item = Result<DemandAggregate, AggregationError>>,
    S: Iterator<Item = Result<StoredAggregate, AggregationError>>,
{
    let mut plan = ReconcilePlan::default();
    let mut d = advance(&mut demand)?;
    let mut f = advance(&mut stored)?;

    loop {
        match (d.take(), f.take()) {
            (None, None) => break,
            (Some(dv), None) => {
                plan.insert(dv);
                d = advance(&mut demand)?;
            }
            (None, Some(fv)) => {
                plan.delete(fv);
                f = advance(&mut stored)?;
            }
            (Some(dv), Some(fv)) => match compare_keys(&dv.key, &fv.key) {
                Ordering::Equal => {
                    plan.matched(dv, fv);
                    d = advance(&mut demand)?;
                    f = advance(&mut stored)?;
                }
                Ordering::Greater => {
                    plan.delete(fv);
                    d = Some(dv);
                    f = advance(&mut stored)?;
                }
                Ordering::Less => {
                    plan.insert(dv);
                    f = Some(fv);
                    d = advance(&mut demand)?;
                }
            },
        }
    }

    Ok(plan)
}
