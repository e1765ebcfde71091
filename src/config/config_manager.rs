// ==========================================
// 需求聚合对账引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::aggregation_config_trait::{
    AggregationConfigReader, DEFAULT_HORIZON_FUTURE_DAYS, DEFAULT_HORIZON_HISTORY_DAYS,
};
use crate::db::open_sqlite_connection;
use crate::domain::bucket::parse_timestamp;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取非负天数配置，缺失或格式错误时回退默认值
    fn get_days_or_default(&self, key: &str, default: i64) -> Result<i64, Box<dyn Error>> {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(default);
        };

        match raw.trim().parse::<i64>() {
            Ok(days) if days >= 0 => Ok(days),
            _ => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default,
                    "天数配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }
}

// ==========================================
// AggregationConfigReader Trait 实现
// ==========================================
#[async_trait]
impl AggregationConfigReader for ConfigManager {
    async fn get_bucket_calendar(&self) -> Result<Option<String>, Box<dyn Error>> {
        let value = self.get_config_value(config_keys::CALENDAR)?;
        Ok(value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    async fn get_horizon_future_days(&self) -> Result<i64, Box<dyn Error>> {
        self.get_days_or_default(config_keys::HORIZON_FUTURE, DEFAULT_HORIZON_FUTURE_DAYS)
    }

    async fn get_horizon_history_days(&self) -> Result<i64, Box<dyn Error>> {
        self.get_days_or_default(config_keys::HORIZON_HISTORY, DEFAULT_HORIZON_HISTORY_DAYS)
    }

    async fn get_current_date(&self) -> Result<NaiveDateTime, Box<dyn Error>> {
        let now = chrono::Local::now().naive_local();
        let Some(raw) = self.get_config_value(config_keys::CURRENT_DATE)? else {
            return Ok(now);
        };

        match parse_timestamp(&raw) {
            Ok(current) => Ok(current),
            Err(message) => {
                tracing::warn!(
                    config_key = config_keys::CURRENT_DATE,
                    raw_value = %raw,
                    error = %message,
                    "当前日期配置格式错误，使用系统时间"
                );
                Ok(now)
            }
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 时间桶日历
    pub const CALENDAR: &str = "forecast.calendar";

    // 对账区间
    pub const HORIZON_FUTURE: &str = "forecast.Horizon_future";
    pub const HORIZON_HISTORY: &str = "forecast.Horizon_history";

    // 业务当前日期（缺省为系统时间）
    pub const CURRENT_DATE: &str = "currentdate";
}
