// ==========================================
// 需求聚合对账引擎 - 计划文档
// ==========================================
// forecastplan.value 是开放式 JSON 文档:
// - 本引擎只拥有叶子字段 (LEAF_FIELDS)
// - 其余字段属于其他子系统 (例如人工预测覆写), 必须原样保留
// 合并 = 只覆盖指定键; 清除 = 只删除指定键
// ==========================================

use crate::domain::aggregate::AggregateValue;
use serde_json::{Map, Number, Value};

/// 叶子标记键
pub const LEAF_MARKER: &str = "leaf";

/// 聚合值字段
pub const LEAF_VALUE_FIELDS: [&str; 4] =
    ["orderstotal", "ordersopen", "orderstotalvalue", "ordersopenvalue"];

/// 本引擎拥有的全部字段 (聚合值 + 叶子标记)
pub const LEAF_FIELDS: [&str; 5] = [
    "orderstotal",
    "ordersopen",
    "orderstotalvalue",
    "ordersopenvalue",
    LEAF_MARKER,
];

// ==========================================
// PlanDocument - 有序字符串键映射
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanDocument {
    fields: Map<String, Value>,
}

impl PlanDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析数据库中的文档
    ///
    /// # 返回
    /// - (文档, 是否完好)
    /// - 非法 JSON 或非对象: 返回空文档, 完好标志为 false
    pub fn parse(raw: Option<&str>) -> (Self, bool) {
        let Some(raw) = raw else {
            return (Self::new(), false);
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(fields)) => (Self { fields }, true),
            _ => (Self::new(), false),
        }
    }

    /// 由聚合值构造叶子字段覆盖层 (含 leaf = 1)
    ///
    /// 缺失值写为 JSON null
    pub fn leaf_overlay(value: &AggregateValue) -> Self {
        let mut fields = Map::new();
        let numbers = [
            value.orders_total,
            value.orders_open,
            value.orders_total_value,
            value.orders_open_value,
        ];
        for (name, number) in LEAF_VALUE_FIELDS.iter().zip(numbers) {
            let json = number
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null);
            fields.insert((*name).to_string(), json);
        }
        fields.insert(LEAF_MARKER.to_string(), Value::from(1));
        Self { fields }
    }

    /// 合并: 覆盖层中的键写入本文档, 其余键保持不变
    pub fn merge(&mut self, overlay: &PlanDocument) {
        for (k, v) in &overlay.fields {
            self.fields.insert(k.clone(), v.clone());
        }
    }

    /// 清除: 只删除指定键
    ///
    /// # 返回
    /// - 实际删除的键数量
    pub fn remove_keys(&mut self, keys: &[&str]) -> usize {
        keys.iter()
            .filter(|k| self.fields.remove(**k).is_some())
            .count()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// 读取数值字段 (缺失/null/非数值 → None)
    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_leaf(&self) -> bool {
        self.contains(LEAF_MARKER)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 读取叶子聚合值
    ///
    /// # 返回
    /// - (聚合值, 是否所有聚合字段都存在)
    pub fn leaf_value(&self) -> (AggregateValue, bool) {
        let complete = LEAF_VALUE_FIELDS.iter().all(|k| self.contains(k));
        let value = AggregateValue {
            orders_total: self.number(LEAF_VALUE_FIELDS[0]),
            orders_open: self.number(LEAF_VALUE_FIELDS[1]),
            orders_total_value: self.number(LEAF_VALUE_FIELDS[2]),
            orders_open_value: self.number(LEAF_VALUE_FIELDS[3]),
        };
        (value, complete)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}
