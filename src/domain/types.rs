// ==========================================
// 需求聚合对账引擎 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 需求状态 (Demand Status)
// ==========================================
// 数据库存储: 小写字符串, 按原样区分大小写匹配 (与 SQL 过滤 IS NOT 'canceled' 一致)
// NULL 表示未设置 (Option::None)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandStatus {
    Inquiry,  // 询价
    Quote,    // 报价
    Open,     // 未结
    Closed,   // 已结
    Canceled, // 已取消
}

impl DemandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemandStatus::Inquiry => "inquiry",
            DemandStatus::Quote => "quote",
            DemandStatus::Open => "open",
            DemandStatus::Closed => "closed",
            DemandStatus::Canceled => "canceled",
        }
    }

    /// 是否计入 ordersopen / ordersopenvalue
    ///
    /// 规则: 状态未设置、open、quote 计入; 其余不计入
    pub fn counts_as_open(status: Option<DemandStatus>) -> bool {
        matches!(
            status,
            None | Some(DemandStatus::Open) | Some(DemandStatus::Quote)
        )
    }

    /// 是否整体排除在聚合之外
    pub fn is_excluded(status: Option<DemandStatus>) -> bool {
        matches!(status, Some(DemandStatus::Canceled))
    }
}

impl fmt::Display for DemandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DemandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inquiry" => Ok(DemandStatus::Inquiry),
            "quote" => Ok(DemandStatus::Quote),
            "open" => Ok(DemandStatus::Open),
            "closed" => Ok(DemandStatus::Closed),
            "canceled" => Ok(DemandStatus::Canceled),
            other => Err(format!("未知的需求状态: {}", other)),
        }
    }
}
