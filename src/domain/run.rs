// ==========================================
// 需求聚合对账引擎 - 对账运行记录
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 单次对账的分类计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileCounters {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ReconcileCounters {
    /// 需要写库的决策数
    pub fn writes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    /// 参与对账的键总数
    pub fn total(&self) -> usize {
        self.writes() + self.unchanged
    }
}

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "SUCCESS" => RunStatus::Success,
            _ => RunStatus::Failed,
        }
    }
}

/// aggregate_run_log 一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRunLogEntry {
    pub run_id: String,
    pub bucket_calendar: String,
    pub horizon_start: NaiveDateTime,
    pub horizon_end: NaiveDateTime,
    pub counters: ReconcileCounters,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_ms: Option<i64>,
}
