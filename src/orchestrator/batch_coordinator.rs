//! 批次协调器
//!
//! 全局同一时刻至多一个批次在执行。执行权是一个 CAS 槽位：
//! 抢到的批次串行跑完自己的任务，抢不到的进 FIFO 等待队列，
//! 槽位释放与下一个批次出队在同一个临界区里完成，不存在
//! "槽位空着但队列有人等"的窗口。
//!
//! 批次内任务按 batch_order 串行执行，任务之间按配置的间隔
//! 分段等待；等待期间批次的 pending 任务清零（停止/全部取消）
//! 则提前结束等待。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::models::TaskStatus;
use crate::services::{QuotaLedger, TaskStore};
use crate::workflow::PublishFlow;

/// 停止批次的结果计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOutcome {
    pub cancelled: usize,
    pub terminated: usize,
}

pub struct BatchCoordinator {
    store: Arc<TaskStore>,
    flow: Arc<PublishFlow>,
    ledger: Arc<QuotaLedger>,
    /// 执行权槽位：当前正在执行的批次
    executing: Mutex<Option<String>>,
    /// 等待执行权的批次（FIFO）
    queue: Mutex<VecDeque<String>>,
    /// 批次声明的任务总数，全部创建完成后才开始执行
    expected_totals: Mutex<HashMap<String, usize>>,
    /// 任务间隔等待的分段长度
    wait_check_interval: Duration,
}

impl BatchCoordinator {
    pub fn new(
        store: Arc<TaskStore>,
        flow: Arc<PublishFlow>,
        ledger: Arc<QuotaLedger>,
        wait_check_interval: Duration,
    ) -> Self {
        Self {
            store,
            flow,
            ledger,
            executing: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            expected_totals: Mutex::new(HashMap::new()),
            wait_check_interval,
        }
    }

    /// 当前持有执行权的批次
    pub async fn executing_batch(&self) -> Option<String> {
        self.executing.lock().await.clone()
    }

    /// 等待队列快照
    pub async fn queued(&self) -> Vec<String> {
        self.queue.lock().await.iter().cloned().collect()
    }

    /// 声明批次的任务总数（逐个创建任务前调用）
    pub async fn register_batch(&self, batch_id: &str, total: usize) {
        let mut totals = self.expected_totals.lock().await;
        totals.insert(batch_id.to_string(), total);
    }

    /// 批次内又一个任务创建完成；凑齐总数后自动开始执行
    pub async fn notify_task_created(self: &Arc<Self>, batch_id: &str) {
        let complete = {
            let totals = self.expected_totals.lock().await;
            match totals.get(batch_id) {
                Some(&total) => self.store.batch_tasks(batch_id).await.len() >= total,
                None => false,
            }
        };
        if complete {
            self.expected_totals.lock().await.remove(batch_id);
            info!("📦 批次 {} 任务创建完毕", batch_id);
            self.start_batch(batch_id).await;
        }
    }

    /// 申请批次执行权：抢到返回 true 并后台开跑，否则入队等待
    pub async fn start_batch(self: &Arc<Self>, batch_id: &str) -> bool {
        let acquired = {
            let mut executing = self.executing.lock().await;
            match executing.as_ref() {
                None => {
                    *executing = Some(batch_id.to_string());
                    true
                }
                Some(current) if current == batch_id => return false,
                Some(_) => false,
            }
        };
        if acquired {
            info!("🚦 批次 {} 获得执行权", batch_id);
            let this = Arc::clone(self);
            let first = batch_id.to_string();
            tokio::spawn(async move { this.drive(first).await });
            true
        } else {
            let mut queue = self.queue.lock().await;
            if !queue.iter().any(|waiting| waiting == batch_id) {
                info!("⏸️ 批次 {} 进入等待队列", batch_id);
                queue.push_back(batch_id.to_string());
            }
            false
        }
    }

    /// 驱动循环：跑完当前批次后原子地让出槽位并接过下一个批次
    async fn drive(self: Arc<Self>, first: String) {
        let mut current = first;
        loop {
            self.run_batch(&current).await;
            let next = {
                let mut executing = self.executing.lock().await;
                let mut queue = self.queue.lock().await;
                match queue.pop_front() {
                    Some(next) => {
                        *executing = Some(next.clone());
                        Some(next)
                    }
                    None => {
                        *executing = None;
                        None
                    }
                }
            };
            match next {
                Some(next) => {
                    info!("🚦 批次 {} 接过执行权", next);
                    current = next;
                }
                None => break,
            }
        }
    }

    /// 串行执行批次内的任务（按 batch_order）
    ///
    /// 只负责本轮推进：执行失败被重新入队的任务留给恢复调度器，
    /// 不在本轮内回头。
    pub async fn run_batch(&self, batch_id: &str) {
        info!("▶️ 开始执行批次 {}", batch_id);
        let tasks = self.store.batch_tasks(batch_id).await;
        let total = tasks.len();
        for (index, task) in tasks.iter().enumerate() {
            let current = match self.store.get(task.id).await {
                Ok(current) => current,
                Err(_) => continue,
            };
            if current.status != TaskStatus::Pending {
                continue;
            }
            info!(
                "📋 批次 {} 任务 {}/{} (id {})",
                batch_id,
                index + 1,
                total,
                task.id
            );
            // 单任务的失败已在流程内收敛，这里不再处理
            let _ = self.flow.execute(task.id).await;

            let is_last = index + 1 == total;
            if !is_last {
                if let Some(minutes) = task.interval_minutes.filter(|m| *m > 0) {
                    if !self.wait_interval(batch_id, minutes).await {
                        warn!("⏹️ 批次 {} 在等待期间被停止", batch_id);
                        break;
                    }
                }
            }
        }
        info!("⏹️ 批次 {} 本轮执行结束", batch_id);
    }

    /// 分段等待任务间隔；批次 pending 清零返回 false（提前结束）
    async fn wait_interval(&self, batch_id: &str, minutes: i64) -> bool {
        let total = Duration::from_secs(minutes as u64 * 60);
        info!("⏳ 批次 {} 等待 {} 分钟后执行下一个任务", batch_id, minutes);
        let deadline = tokio::time::Instant::now() + total;
        loop {
            if self.store.pending_count(batch_id).await == 0 {
                return false;
            }
            if tokio::time::Instant::now() >= deadline {
                return true;
            }
            tokio::time::sleep(self.wait_check_interval).await;
        }
    }

    /// 停止批次：取消所有 pending、终止正在执行的任务，并结清它们的预留
    pub async fn stop_batch(&self, batch_id: &str) -> StopOutcome {
        info!("🛑 停止批次 {}", batch_id);
        // 先从等待队列摘掉，防止停完又被调度
        {
            let mut queue = self.queue.lock().await;
            queue.retain(|waiting| waiting != batch_id);
        }
        self.expected_totals.lock().await.remove(batch_id);

        let mut outcome = StopOutcome::default();
        for task in self.store.batch_tasks(batch_id).await {
            match task.status {
                TaskStatus::Pending => {
                    if self.store.cancel(task.id).await.is_ok() {
                        outcome.cancelled += 1;
                        self.release_reservation(task.reservation_id).await;
                    }
                }
                TaskStatus::Running => {
                    match self.store.terminate(task.id, "批次被手动停止").await {
                        Ok(true) => {
                            outcome.terminated += 1;
                            self.release_reservation(task.reservation_id).await;
                        }
                        Ok(false) => {}
                        Err(err) => warn!("终止任务 {} 失败: {}", task.id, err),
                    }
                }
                _ => {}
            }
        }
        info!(
            "🛑 批次 {} 已停止：取消 {} 个，终止 {} 个",
            batch_id, outcome.cancelled, outcome.terminated
        );
        outcome
    }

    /// 删除批次：先停止，再删除全部任务记录
    pub async fn delete_batch(&self, batch_id: &str) -> usize {
        self.stop_batch(batch_id).await;
        let ids: Vec<i64> = self
            .store
            .batch_tasks(batch_id)
            .await
            .iter()
            .map(|t| t.id)
            .collect();
        let deleted = self.store.batch_delete(&ids).await;
        info!("🗑️ 批次 {} 已删除 {} 个任务", batch_id, deleted);
        deleted
    }

    async fn release_reservation(&self, reservation_id: Option<uuid::Uuid>) {
        if let Some(id) = reservation_id {
            if let Err(err) = self.ledger.release(id).await {
                warn!("⚠️ 释放预留 {} 失败: {}", id, err);
            }
        }
    }
}
