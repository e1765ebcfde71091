// Small ops utility: run one demand aggregation pass against a database.
//
// Usage:
//   cargo run --bin manual_aggregate_demand -- [db_path]
//   cargo run --bin manual_aggregate_demand -- [db_path] <calendar> <horizon_start> <horizon_end>
//
// Without explicit horizon arguments the scheduled command runs with the
// parameters stored in config_kv (forecast.calendar, forecast.Horizon_future, ...).

use anyhow::{anyhow, Context};
use demand_aggregation::config::ConfigManager;
use demand_aggregation::db::{default_db_path, ensure_engine_schema, open_sqlite_connection};
use demand_aggregation::domain::parse_timestamp;
use demand_aggregation::engine::AggregateDemandEngine;
use demand_aggregation::logging;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = args
        .first()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default_db_path);

    let conn = open_sqlite_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    ensure_engine_schema(&conn).context("初始化 forecastplan / aggregate_run_log 失败")?;
    let conn = Arc::new(Mutex::new(conn));

    let engine = AggregateDemandEngine::new(conn.clone());

    match args.len() {
        0 | 1 => {
            let config = ConfigManager::from_connection(conn.clone())
                .map_err(|e| anyhow!("配置管理器初始化失败: {}", e))?;
            let report = engine
                .run_scheduled(&config)
                .await
                .context("定时聚合失败")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        4 => {
            let calendar = args[1].trim();
            let start = parse_timestamp(&args[2])
                .map_err(|e| anyhow!("horizon_start 格式错误: {}", e))?;
            let end = parse_timestamp(&args[3])
                .map_err(|e| anyhow!("horizon_end 格式错误: {}", e))?;

            let counters = engine
                .reconcile(calendar, start, end)
                .with_context(|| format!("对账失败: calendar={}", calendar))?;
            println!("{}", serde_json::to_string_pretty(&counters)?);
        }
        _ => {
            return Err(anyhow!(
                "用法: manual_aggregate_demand [db_path] [calendar horizon_start horizon_end]"
            ));
        }
    }

    Ok(())
}
