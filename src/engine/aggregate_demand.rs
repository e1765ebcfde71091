// ==========================================
// 需求聚合对账引擎 - 对账编排
// ==========================================
// 一次对账 = 一个 IMMEDIATE 事务:
// 1. 校验日历
// 2. 打开需求游标与叶子记录游标, 归并分类
// 3. 游标关闭后按决策写回
// 4. 写运行日志 (SUCCESS), 提交
// 任一步骤失败: 回滚, 事务外补写 FAILED 日志
// ==========================================

use crate::config::aggregation_config_trait::AggregationConfigReader;
use crate::config::config_manager::config_keys;
use crate::domain::bucket::{format_timestamp, Horizon};
use crate::domain::run::{AggregateRunLogEntry, ReconcileCounters, RunStatus};
use crate::engine::aggregator::DemandAggregator;
use crate::engine::error::AggregationError;
use crate::engine::horizon_lock::HorizonLockRegistry;
use crate::engine::mutator::Mutator;
use crate::engine::reconciler::reconcile_streams;
use crate::engine::store_cursor::AggregateStoreCursor;
use crate::repository::{
    BucketRepository, DemandFeedRepository, ForecastPlanRepository, RunLogRepository,
};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// 定时聚合命令的执行报告
#[derive(Debug, Clone, Serialize)]
pub struct AggregationRunReport {
    pub bucket_calendar: String,
    pub horizon: Horizon,
    /// 区间内的时间桶数
    pub buckets_in_horizon: usize,
    /// 失效时间桶清理的记录数
    pub purged: usize,
    pub counters: ReconcileCounters,
    /// 对账后文档为空而删除的记录数
    pub pruned: usize,
}

// ==========================================
// AggregateDemandEngine - 需求聚合对账引擎
// ==========================================
pub struct AggregateDemandEngine {
    conn: Arc<Mutex<Connection>>,
    horizon_locks: Arc<HorizonLockRegistry>,
}

impl AggregateDemandEngine {
    /// 创建引擎（独立的区间锁登记表）
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self::with_registry(conn, Arc::new(HorizonLockRegistry::new()))
    }

    /// 创建引擎, 与其他引擎共享区间锁登记表
    pub fn with_registry(
        conn: Arc<Mutex<Connection>>,
        horizon_locks: Arc<HorizonLockRegistry>,
    ) -> Self {
        Self {
            conn,
            horizon_locks,
        }
    }

    /// 执行一次对账
    ///
    /// # 参数
    /// - bucket_calendar: 时间桶日历
    /// - horizon_start / horizon_end: 对账区间 [start, end), 按桶起始时间过滤
    ///
    /// # 返回
    /// - Ok(counters): 分类计数
    /// - Err: 已回滚, 存储无任何可见变化
    #[instrument(skip(self))]
    pub fn reconcile(
        &self,
        bucket_calendar: &str,
        horizon_start: NaiveDateTime,
        horizon_end: NaiveDateTime,
    ) -> Result<ReconcileCounters, AggregationError> {
        let horizon = validate_horizon(horizon_start, horizon_end)?;
        let _guard = self.horizon_locks.acquire(horizon)?;
        self.reconcile_locked(bucket_calendar, &horizon)
    }

    /// 定时聚合命令: 读取配置 → 清理失效桶 → 对账 → 删除空记录
    ///
    /// 区间锁在阻塞线程池中等待; 之后的 SQLite 读写仍在调用方线程同步执行
    #[instrument(skip(self, config))]
    pub async fn run_scheduled<C>(&self, config: &C) -> Result<AggregationRunReport, AggregationError>
    where
        C: AggregationConfigReader + ?Sized,
    {
        let bucket_calendar = config
            .get_bucket_calendar()
            .await
            .map_err(|e| config_error(config_keys::CALENDAR, e))?
            .ok_or(AggregationError::MissingConfig(config_keys::CALENDAR))?;
        let future_days = config
            .get_horizon_future_days()
            .await
            .map_err(|e| config_error(config_keys::HORIZON_FUTURE, e))?;
        let history_days = config
            .get_horizon_history_days()
            .await
            .map_err(|e| config_error(config_keys::HORIZON_HISTORY, e))?;
        let current_date = config
            .get_current_date()
            .await
            .map_err(|e| config_error(config_keys::CURRENT_DATE, e))?;

        let horizon = Horizon::new(
            shift_days(current_date, -history_days, config_keys::HORIZON_HISTORY)?,
            shift_days(current_date, future_days, config_keys::HORIZON_FUTURE)?,
        );
        let horizon = validate_horizon(horizon.start, horizon.end)?;

        tracing::info!(
            bucket_calendar = %bucket_calendar,
            horizon = %horizon,
            current_date = %format_timestamp(&current_date),
            "定时聚合开始"
        );

        // 区间锁等待是阻塞的, 放到阻塞线程池, 不占用运行时工作线程
        let registry = Arc::clone(&self.horizon_locks);
        let _guard = tokio::task::spawn_blocking(move || registry.acquire(horizon))
            .await
            .map_err(|e| AggregationError::LockPoisoned(format!("区间锁等待任务失败: {}", e)))??;

        let (buckets_in_horizon, purged) =
            self.purge_obsolete_buckets(&bucket_calendar, &horizon, &current_date)?;
        let counters = self.reconcile_locked(&bucket_calendar, &horizon)?;
        let pruned = self.prune_empty_records()?;

        let report = AggregationRunReport {
            bucket_calendar,
            horizon,
            buckets_in_horizon,
            purged,
            counters,
            pruned,
        };

        tracing::info!(
            purged = report.purged,
            pruned = report.pruned,
            inserted = report.counters.inserted,
            updated = report.counters.updated,
            deleted = report.counters.deleted,
            "定时聚合完成"
        );

        Ok(report)
    }

    // ==========================================
    // 内部实现
    // ==========================================

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, AggregationError> {
        self.conn
            .lock()
            .map_err(|e| AggregationError::LockPoisoned(e.to_string()))
    }

    /// 已持有区间锁时执行对账
    fn reconcile_locked(
        &self,
        bucket_calendar: &str,
        horizon: &Horizon,
    ) -> Result<ReconcileCounters, AggregationError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = format_timestamp(&Local::now().naive_local());
        let timer = Instant::now();

        tracing::info!(run_id = %run_id, horizon = %horizon, "对账开始");

        let mut conn = self.lock_conn()?;
        let result = run_pass(&mut conn, &run_id, bucket_calendar, horizon, &started_at, timer);

        match result {
            Ok(counters) => {
                tracing::info!(
                    run_id = %run_id,
                    inserted = counters.inserted,
                    updated = counters.updated,
                    deleted = counters.deleted,
                    unchanged = counters.unchanged,
                    duration_ms = timer.elapsed().as_millis() as u64,
                    "对账已提交"
                );
                Ok(counters)
            }
            Err(err) => {
                tracing::error!(run_id = %run_id, error = %err, "对账失败, 已回滚");
                let entry = AggregateRunLogEntry {
                    run_id,
                    bucket_calendar: bucket_calendar.to_string(),
                    horizon_start: horizon.start,
                    horizon_end: horizon.end,
                    counters: ReconcileCounters::default(),
                    status: RunStatus::Failed,
                    error_message: Some(err.to_string()),
                    started_at,
                    completed_at: Some(format_timestamp(&Local::now().naive_local())),
                    duration_ms: Some(timer.elapsed().as_millis() as i64),
                };
                if let Err(log_err) = RunLogRepository::new(&conn).insert(&entry) {
                    tracing::warn!(error = %log_err, "失败日志写入失败");
                }
                Err(err)
            }
        }
    }

    /// 清理失效时间桶的记录（独立事务）
    ///
    /// # 返回
    /// - (区间内桶数, 删除的记录数)
    fn purge_obsolete_buckets(
        &self,
        bucket_calendar: &str,
        horizon: &Horizon,
        current_date: &NaiveDateTime,
    ) -> Result<(usize, usize), AggregationError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let bucket_repo = BucketRepository::new(&tx);
        if !bucket_repo.calendar_exists(bucket_calendar)? {
            return Err(AggregationError::UnknownCalendar(bucket_calendar.to_string()));
        }
        let buckets = bucket_repo.list_in_horizon(bucket_calendar, horizon)?;

        let earliest_due = DemandFeedRepository::new(&tx)
            .earliest_due()?
            .unwrap_or_else(default_enddate_floor);
        let floor = earliest_due.min(*current_date);

        let purged = ForecastPlanRepository::new(&tx).delete_obsolete_buckets(
            bucket_calendar,
            horizon,
            &floor,
        )?;
        tx.commit()?;

        tracing::debug!(purged, floor = %format_timestamp(&floor), "失效时间桶记录已清理");
        Ok((buckets.len(), purged))
    }

    /// 删除文档为空的记录（独立事务）
    fn prune_empty_records(&self) -> Result<usize, AggregationError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let pruned = ForecastPlanRepository::new(&tx).delete_empty()?;
        tx.commit()?;
        Ok(pruned)
    }
}

/// 单次对账事务
fn run_pass(
    conn: &mut Connection,
    run_id: &str,
    bucket_calendar: &str,
    horizon: &Horizon,
    started_at: &str,
    timer: Instant,
) -> Result<ReconcileCounters, AggregationError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !BucketRepository::new(&tx).calendar_exists(bucket_calendar)? {
        return Err(AggregationError::UnknownCalendar(bucket_calendar.to_string()));
    }

    // 分类阶段: 两个游标同时打开, 只读
    let plan = {
        let mut demand_scan = DemandFeedRepository::new(&tx).prepare_scan()?;
        let mut leaf_scan = ForecastPlanRepository::new(&tx).prepare_leaf_scan()?;

        let demand = DemandAggregator::new(demand_scan.iter(bucket_calendar, horizon)?);
        let stored = AggregateStoreCursor::new(leaf_scan.iter(horizon)?);
        reconcile_streams(demand, stored)?
    };

    tracing::info!(
        run_id = %run_id,
        decisions = plan.decisions.len(),
        unchanged = plan.counters.unchanged,
        "对账分类完成"
    );

    // 写回阶段
    if plan.is_noop() {
        tracing::debug!(run_id = %run_id, "无变更, 跳过写回");
    } else {
        let writer = ForecastPlanRepository::new(&tx);
        let stats = Mutator::new(&writer).apply(&plan.decisions)?;
        tracing::debug!(
            created = stats.created,
            merged = stats.merged,
            cleared = stats.cleared,
            "决策写回完成"
        );
    }

    RunLogRepository::new(&tx).insert(&AggregateRunLogEntry {
        run_id: run_id.to_string(),
        bucket_calendar: bucket_calendar.to_string(),
        horizon_start: horizon.start,
        horizon_end: horizon.end,
        counters: plan.counters,
        status: RunStatus::Success,
        error_message: None,
        started_at: started_at.to_string(),
        completed_at: Some(format_timestamp(&Local::now().naive_local())),
        duration_ms: Some(timer.elapsed().as_millis() as i64),
    })?;

    tx.commit()?;
    Ok(plan.counters)
}

fn validate_horizon(
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Horizon, AggregationError> {
    let horizon = Horizon::new(start, end);
    if !horizon.is_valid() {
        return Err(AggregationError::InvalidHorizon {
            start: horizon.start_str(),
            end: horizon.end_str(),
        });
    }
    Ok(horizon)
}

fn shift_days(
    base: NaiveDateTime,
    days: i64,
    key: &'static str,
) -> Result<NaiveDateTime, AggregationError> {
    Duration::try_days(days)
        .and_then(|delta| base.checked_add_signed(delta))
        .ok_or_else(|| AggregationError::InvalidConfig {
            key,
            message: format!("天数超出范围: {}", days),
        })
}

fn config_error(key: &'static str, err: Box<dyn Error>) -> AggregationError {
    AggregationError::InvalidConfig {
        key,
        message: err.to_string(),
    }
}

/// 没有任何需求时的失效判定下限
fn default_enddate_floor() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}
