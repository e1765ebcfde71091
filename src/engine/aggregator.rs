// ==========================================
// 需求聚合对账引擎 - 需求聚合器
// ==========================================
// 输入: 已归桶的需求行, 按 (item, location, customer, 桶起始) 排序
// 输出: 每个聚合键一条 DemandAggregate, 顺序与输入一致
// 规则:
// - 取消单在累加前跳过
// - 相邻同键累加, 键变化时吐出已完成的累加器
// - 键倒退 = 输入未排序, 致命错误, 之后迭代器不再产出
// ==========================================

use crate::domain::aggregate::{compare_keys, DemandAggregate};
use crate::domain::demand::BucketedDemand;
use crate::engine::error::AggregationError;
use std::cmp::Ordering;
use std::iter::FusedIterator;

// ==========================================
// DemandAggregator - 惰性分组累加
// ==========================================
pub struct DemandAggregator<I> {
    lines: I,
    pending: Option<DemandAggregate>,
    finished: bool,
}

impl<I> DemandAggregator<I> {
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            pending: None,
            finished: false,
        }
    }
}

impl<I, E> Iterator for DemandAggregator<I>
where
    I: Iterator<Item = Result<BucketedDemand, E>>,
    E: Into<AggregationError>,
{
    type Item = Result<DemandAggregate, AggregationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let row = match self.lines.next() {
                None => {
                    self.finished = true;
                    return self.pending.take().map(Ok);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    self.pending = None;
                    return Some(Err(e.into()));
                }
                Some(Ok(row)) => row,
            };

            if row.line.is_canceled() {
                continue;
            }

            let key = row.aggregate_key();
            let contribution = row.line.contribution();
            let ordering = self
                .pending
                .as_ref()
                .map(|acc| compare_keys(&key, &acc.key));

            match ordering {
                Some(Ordering::Equal) => {
                    if let Some(acc) = self.pending.as_mut() {
                        acc.value.accumulate(&contribution);
                    }
                }
                Some(Ordering::Less) => {
                    self.finished = true;
                    let previous = self
                        .pending
                        .take()
                        .map(|acc| acc.key.to_string())
                        .unwrap_or_default();
                    return Some(Err(AggregationError::UnsortedInput {
                        stream: "demand",
                        previous,
                        current: key.to_string(),
                    }));
                }
                Some(Ordering::Greater) | None => {
                    let next = DemandAggregate {
                        key,
                        value: contribution,
                    };
                    if let Some(done) = self.pending.replace(next) {
                        return Some(Ok(done));
                    }
                }
            }
        }
    }
}

impl<I, E> FusedIterator for DemandAggregator<I>
where
    I: Iterator<Item = Result<BucketedDemand, E>>,
    E: Into<AggregationError>,
{
}
