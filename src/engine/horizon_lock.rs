// ==========================================
// 需求聚合对账引擎 - 对账区间互斥
// ==========================================
// 同一进程内: 区间相交的对账串行执行, 不相交的可并行
// 跨进程的互斥由 SQLite IMMEDIATE 事务的写锁保证
// ==========================================

use crate::domain::bucket::Horizon;
use crate::engine::error::AggregationError;
use std::sync::{Arc, Condvar, Mutex};

#[derive(Default)]
struct ActiveHorizons {
    next_id: u64,
    entries: Vec<(u64, Horizon)>,
}

impl ActiveHorizons {
    fn conflicts(&self, horizon: &Horizon) -> bool {
        self.entries.iter().any(|(_, h)| h.overlaps(horizon))
    }

    fn register(&mut self, horizon: Horizon) -> u64 {
        self.next_id += 1;
        self.entries.push((self.next_id, horizon));
        self.next_id
    }
}

// ==========================================
// HorizonLockRegistry - 区间锁登记表
// ==========================================
#[derive(Default)]
pub struct HorizonLockRegistry {
    active: Mutex<ActiveHorizons>,
    released: Condvar,
}

impl HorizonLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取区间锁, 与已持有区间相交时阻塞等待
    pub fn acquire(self: &Arc<Self>, horizon: Horizon) -> Result<HorizonGuard, AggregationError> {
        let mut active = self
            .active
            .lock()
            .map_err(|e| AggregationError::LockPoisoned(e.to_string()))?;

        if active.conflicts(&horizon) {
            tracing::debug!(horizon = %horizon, "对账区间被占用, 等待释放");
        }
        while active.conflicts(&horizon) {
            active = self
                .released
                .wait(active)
                .map_err(|e| AggregationError::LockPoisoned(e.to_string()))?;
        }

        let id = active.register(horizon);
        Ok(HorizonGuard {
            registry: Arc::clone(self),
            id,
            horizon,
        })
    }

    /// 当前持有的区间数
    pub fn active_count(&self) -> usize {
        match self.active.lock() {
            Ok(active) => active.entries.len(),
            Err(poisoned) => poisoned.into_inner().entries.len(),
        }
    }

    fn release(&self, id: u64) {
        let mut active = match self.active.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.entries.retain(|(entry_id, _)| *entry_id != id);
        drop(active);
        self.released.notify_all();
    }
}

/// 区间锁守卫, drop 时释放
pub struct HorizonGuard {
    registry: Arc<HorizonLockRegistry>,
    id: u64,
    horizon: Horizon,
}

impl HorizonGuard {
    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }
}

impl Drop for HorizonGuard {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}
