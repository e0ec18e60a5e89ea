//! 后台任务队列
//!
//! 周期巡检，每个 tick 做四件事：
//!
//! 1. 超时清扫：卡在 running 超过上限的任务判为超时失败，按策略重试
//! 2. 清理过期的配额预留
//! 3. 批次恢复：执行权空闲且有批次还剩 pending 任务时，重新调度最早的批次
//! 4. 普通任务派发：到期的非批次任务逐个派发，同一租户同时只跑一个

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{ErrorKind, LogLevel};
use crate::orchestrator::BatchCoordinator;
use crate::services::{QuotaLedger, TaskStore};
use crate::workflow::PublishFlow;

/// 队列后台任务的句柄
pub struct QueueHandle {
    handle: JoinHandle<()>,
}

impl QueueHandle {
    pub fn stop(self) {
        self.handle.abort();
    }
}

pub struct TaskQueue {
    store: Arc<TaskStore>,
    flow: Arc<PublishFlow>,
    coordinator: Arc<BatchCoordinator>,
    ledger: Arc<QuotaLedger>,
    check_interval: Duration,
    /// 单个任务允许停留在 running 的最长时间
    task_timeout: chrono::Duration,
}

impl TaskQueue {
    pub fn new(
        store: Arc<TaskStore>,
        flow: Arc<PublishFlow>,
        coordinator: Arc<BatchCoordinator>,
        ledger: Arc<QuotaLedger>,
        check_interval_secs: u64,
        task_timeout_minutes: i64,
    ) -> Self {
        Self {
            store,
            flow,
            coordinator,
            ledger,
            check_interval: Duration::from_secs(check_interval_secs),
            task_timeout: chrono::Duration::minutes(task_timeout_minutes),
        }
    }

    /// 启动周期巡检
    pub fn start(self: Arc<Self>) -> QueueHandle {
        info!("🔁 任务队列启动，每 {:?} 巡检一次", self.check_interval);
        let handle = tokio::spawn(async move {
            loop {
                self.tick().await;
                tokio::time::sleep(self.check_interval).await;
            }
        });
        QueueHandle { handle }
    }

    /// 单次巡检
    pub async fn tick(&self) {
        self.sweep_timeouts().await;
        self.ledger.cleanup_expired().await;
        self.recover_batches().await;
        self.dispatch_due().await;
    }

    /// 把超时的 running 任务收敛为失败，按策略重试或释放预留
    async fn sweep_timeouts(&self) {
        let now = Utc::now();
        for task in self.store.running_tasks().await {
            let started_at = match task.started_at {
                Some(at) => at,
                None => continue,
            };
            if now - started_at < self.task_timeout {
                continue;
            }
            warn!(
                "⏰ 任务 {} 执行超过 {} 分钟，判为超时",
                task.id,
                self.task_timeout.num_minutes()
            );
            let message = format!("执行超时（超过 {} 分钟）", self.task_timeout.num_minutes());
            if self
                .store
                .fail(task.id, message.clone(), ErrorKind::Timeout)
                .await
                .is_err()
            {
                continue;
            }
            self.store
                .append_log(task.id, LogLevel::Error, message)
                .await;
            if task.retry_count < task.max_retries {
                let _ = self.store.increment_retry(task.id).await;
                if self.store.requeue(task.id).await.is_ok() {
                    info!("🔄 超时任务 {} 重新入队", task.id);
                    continue;
                }
            }
            if let Some(reservation_id) = task.reservation_id {
                if let Err(err) = self.ledger.release(reservation_id).await {
                    warn!("⚠️ 释放预留 {} 失败: {}", reservation_id, err);
                }
            }
        }
    }

    /// 执行权空闲时重新调度最早的未完成批次（进程重启/重试后的恢复路径）
    async fn recover_batches(&self) {
        if self.coordinator.executing_batch().await.is_some() {
            return;
        }
        if let Some(batch_id) = self.store.batches_with_pending().await.into_iter().next() {
            info!("🩹 恢复调度批次 {}", batch_id);
            self.coordinator.start_batch(&batch_id).await;
        }
    }

    /// 派发到期的普通任务；同一租户同时只允许一个在执行
    async fn dispatch_due(&self) {
        let now = Utc::now();
        let mut dispatched_tenants: HashSet<i64> = HashSet::new();
        for task in self.store.due_tasks(now).await {
            if dispatched_tenants.contains(&task.tenant_id) {
                continue;
            }
            if self.store.tenant_has_running(task.tenant_id).await {
                debug!("租户 {} 已有任务在执行，跳过任务 {}", task.tenant_id, task.id);
                continue;
            }
            dispatched_tenants.insert(task.tenant_id);
            info!("📤 派发任务 {} (租户 {})", task.id, task.tenant_id);
            let flow = Arc::clone(&self.flow);
            let task_id = task.id;
            tokio::spawn(async move {
                // 失败已在流程内收敛
                let _ = flow.execute(task_id).await;
            });
        }
    }
}
