// ==========================================
// 需求聚合对账引擎 - 时间桶与对账区间
// ==========================================
// Bucket: 日历分区 [startdate, enddate)
// Horizon: 单次对账的时间窗口 [start, end)
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 数据库时间戳存储格式（字典序 = 时间序）
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 格式化为数据库存储格式
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// 解析数据库时间戳
///
/// 兼容: `2024-01-01 00:00:00` / `2024-01-01T00:00:00` / 带小数秒 / 纯日期(视为零点)
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    let s = raw.trim();
    for fmt in [
        TIMESTAMP_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("无法解析时间戳: {}", raw))
}

// ==========================================
// Bucket - 时间桶
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub calendar: String,         // 所属日历 (common_bucketdetail.bucket_id)
    pub startdate: NaiveDateTime, // 起始(含)
    pub enddate: NaiveDateTime,   // 结束(不含)
}

impl Bucket {
    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.startdate && *ts < self.enddate
    }
}

// ==========================================
// Horizon - 对账区间
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Horizon {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Horizon {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// 区间非空
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// 时间点是否落在 [start, end)
    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.start && *ts < self.end
    }

    /// 两个半开区间是否相交
    pub fn overlaps(&self, other: &Horizon) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn start_str(&self) -> String {
        format_timestamp(&self.start)
    }

    pub fn end_str(&self) -> String {
        format_timestamp(&self.end)
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_str(), self.end_str())
    }
}
