// ==========================================
// 需求聚合对账引擎 - 聚合键与聚合值
// ==========================================
// 聚合键: (item, location, customer, startdate[, enddate])
// 比较规则: 逐字段字典序, NULL = NULL (IS NOT DISTINCT FROM), NULL 排在最前
// ==========================================

use crate::domain::bucket::format_timestamp;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ==========================================
// AggregateKey - 聚合键
// ==========================================
// enddate 随 startdate 确定 (同一日历内), 不参与比较
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateKey {
    pub item: Option<String>,
    pub location: Option<String>,
    pub customer: Option<String>,
    pub startdate: NaiveDateTime,
    pub enddate: NaiveDateTime,
}

impl AggregateKey {
    pub fn new(
        item: Option<String>,
        location: Option<String>,
        customer: Option<String>,
        startdate: NaiveDateTime,
        enddate: NaiveDateTime,
    ) -> Self {
        Self {
            item,
            location,
            customer,
            startdate,
            enddate,
        }
    }
}

/// 按 (item, location, customer, startdate) 比较两个聚合键
///
/// Option 的 Ord 恰好满足要求: None == None, None < Some(_),
/// 与 SQLite `ORDER BY ... ASC` 的 NULL 排序一致。
pub fn compare_keys(a: &AggregateKey, b: &AggregateKey) -> Ordering {
    a.item
        .cmp(&b.item)
        .then_with(|| a.location.cmp(&b.location))
        .then_with(|| a.customer.cmp(&b.customer))
        .then_with(|| a.startdate.cmp(&b.startdate))
}

impl PartialEq for AggregateKey {
    fn eq(&self, other: &Self) -> bool {
        compare_keys(self, other) == Ordering::Equal
    }
}

impl Eq for AggregateKey {}

impl PartialOrd for AggregateKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AggregateKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(self, other)
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "NULL".to_string());
        write!(
            f,
            "({}, {}, {}, {})",
            show(&self.item),
            show(&self.location),
            show(&self.customer),
            format_timestamp(&self.startdate)
        )
    }
}

// ==========================================
// AggregateValue - 聚合值
// ==========================================
// None 表示 "未计算" (SQL NULL)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateValue {
    pub orders_total: Option<f64>,
    pub orders_open: Option<f64>,
    pub orders_total_value: Option<f64>,
    pub orders_open_value: Option<f64>,
}

/// SQL SUM 语义的累加: 缺失贡献跳过, 全部缺失才为 None
fn add_opt(acc: Option<f64>, contribution: Option<f64>) -> Option<f64> {
    match (acc, contribution) {
        (Some(a), Some(b)) => Some(a + b),
        (None, b) => b,
        (a, None) => a,
    }
}

impl AggregateValue {
    /// 累加另一份贡献
    pub fn accumulate(&mut self, other: &AggregateValue) {
        self.orders_total = add_opt(self.orders_total, other.orders_total);
        self.orders_open = add_opt(self.orders_open, other.orders_open);
        self.orders_total_value = add_opt(self.orders_total_value, other.orders_total_value);
        self.orders_open_value = add_opt(self.orders_open_value, other.orders_open_value);
    }

    /// 逐字段 IS DISTINCT FROM: NULL 与实值不同, NULL 与 NULL 相同
    pub fn is_distinct_from(&self, other: &AggregateValue) -> bool {
        self.orders_total != other.orders_total
            || self.orders_open != other.orders_open
            || self.orders_total_value != other.orders_total_value
            || self.orders_open_value != other.orders_open_value
    }
}

// ==========================================
// RecordHandle - 记录句柄
// ==========================================
// 指向 forecastplan 中确定的一行, 写回时无需按键重查
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordHandle(i64);

impl RecordHandle {
    pub(crate) fn from_row_id(id: i64) -> Self {
        Self(id)
    }

    pub(crate) fn row_id(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "forecastplan#{}", self.0)
    }
}

/// 需求侧一条聚合结果
#[derive(Debug, Clone, PartialEq)]
pub struct DemandAggregate {
    pub key: AggregateKey,
    pub value: AggregateValue,
}

/// 存储侧一条叶子候选记录
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAggregate {
    pub key: AggregateKey,
    pub value: AggregateValue,
    pub handle: RecordHandle,
    /// 文档缺少叶子字段或无法解析 (逻辑异常, 按"无旧值"处理)
    pub incomplete: bool,
}
