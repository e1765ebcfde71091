// ==========================================
// 需求聚合对账引擎 - 叶子记录游标
// ==========================================
// 包装 LeafCandidateScan:
// - 键必须严格递增 (重复键同样视为未排序)
// - 叶子字段缺失/文档无法解析: 记 warn, 不中断
// ==========================================

use crate::domain::aggregate::{compare_keys, AggregateKey, StoredAggregate};
use crate::engine::error::AggregationError;
use std::cmp::Ordering;
use std::iter::FusedIterator;

pub struct AggregateStoreCursor<I> {
    rows: I,
    last_key: Option<AggregateKey>,
    finished: bool,
}

impl<I> AggregateStoreCursor<I> {
    pub fn new(rows: I) -> Self {
        Self {
            rows,
            last_key: None,
            finished: false,
        }
    }
}

impl<I, E> Iterator for AggregateStoreCursor<I>
where
    I: Iterator<Item = Result<StoredAggregate, E>>,
    E: Into<AggregationError>,
{
    type Item = Result<StoredAggregate, AggregationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let record = match self.rows.next() {
            None => {
                self.finished = true;
                return None;
            }
            Some(Err(e)) => {
                self.finished = true;
                return Some(Err(e.into()));
            }
            Some(Ok(record)) => record,
        };

        if let Some(last) = &self.last_key {
            if compare_keys(&record.key, last) != Ordering::Greater {
                self.finished = true;
                return Some(Err(AggregationError::UnsortedInput {
                    stream: "forecastplan",
                    previous: last.to_string(),
                    current: record.key.to_string(),
                }));
            }
        }

        if record.incomplete {
            tracing::warn!(
                record = %record.handle,
                key = %record.key,
                "叶子记录缺少聚合字段或文档无法解析, 按无旧值处理"
            );
        }

        self.last_key = Some(record.key.clone());
        Some(Ok(record))
    }
}

impl<I, E> FusedIterator for AggregateStoreCursor<I>
where
    I: Iterator<Item = Result<StoredAggregate, E>>,
    E: Into<AggregationError>,
{
}
