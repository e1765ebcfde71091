// ==========================================
// 需求聚合对账引擎 - 需求行
// ==========================================
// 来源: 外部订单管理子系统 (只读)
// ==========================================

use crate::domain::aggregate::{AggregateKey, AggregateValue};
use crate::domain::bucket::Bucket;
use crate::domain::types::DemandStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// DemandLine - 订单行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandLine {
    pub name: String,                  // 需求编号
    pub item_id: Option<String>,       // 物料
    pub location_id: Option<String>,   // 库存地点
    pub customer_id: Option<String>,   // 客户
    pub due: NaiveDateTime,            // 交期
    pub quantity: f64,                 // 数量
    pub status: Option<DemandStatus>,  // 状态 (None = 未设置)
    pub unit_cost: Option<f64>,        // 物料单位成本 (item.cost)
}

impl DemandLine {
    /// 本行对聚合值的贡献
    ///
    /// - orders_total / orders_total_value: 全部计入
    /// - orders_open / orders_open_value: 仅未设置、open、quote 计入
    /// - 成本缺失时金额类字段无贡献
    pub fn contribution(&self) -> AggregateValue {
        let total_value = self.unit_cost.map(|cost| self.quantity * cost);
        let is_open = DemandStatus::counts_as_open(self.status);

        AggregateValue {
            orders_total: Some(self.quantity),
            orders_open: is_open.then_some(self.quantity),
            orders_total_value: total_value,
            orders_open_value: if is_open { total_value } else { None },
        }
    }

    pub fn is_canceled(&self) -> bool {
        DemandStatus::is_excluded(self.status)
    }
}

// ==========================================
// BucketedDemand - 已归桶的需求行
// ==========================================
// 需求源查询按交期关联时间桶后的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketedDemand {
    pub bucket: Bucket,
    pub line: DemandLine,
}

impl BucketedDemand {
    pub fn aggregate_key(&self) -> AggregateKey {
        AggregateKey::new(
            self.line.item_id.clone(),
            self.line.location_id.clone(),
            self.line.customer_id.clone(),
            self.bucket.startdate,
            self.bucket.enddate,
        )
    }
}
