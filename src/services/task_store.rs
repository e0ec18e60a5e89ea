//! 任务存储
//!
//! 单进程内存实现：所有读写都经过同一把锁，状态流转在锁内校验，
//! 因此"认领"天然是 CAS——两个执行器同时认领同一个 pending 任务，
//! 只有一个能成功。
//!
//! 删除约束：非终态任务不允许删除，必须先取消/终止。

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{
    BatchSummary, ErrorKind, LogLevel, NewTask, PlatformId, PublishingTask, TaskLog, TaskStatus,
};

/// 任务查询条件（全部可选，逐项叠加）
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub tenant_id: Option<i64>,
    pub status: Option<TaskStatus>,
    pub batch_id: Option<String>,
    pub platform_id: Option<PlatformId>,
}

struct StoreState {
    tasks: BTreeMap<i64, PublishingTask>,
    logs: HashMap<i64, Vec<TaskLog>>,
    next_id: i64,
}

pub struct TaskStore {
    state: Mutex<StoreState>,
}

fn invalid_transition(from: TaskStatus, to: TaskStatus) -> AppError {
    AppError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("任务 {}", id))
}

impl StoreState {
    fn task_mut(&mut self, id: i64) -> AppResult<&mut PublishingTask> {
        self.tasks.get_mut(&id).ok_or_else(|| not_found(id))
    }

    /// 锁内的状态流转，非法流转直接报错
    fn transition(&mut self, id: i64, to: TaskStatus) -> AppResult<&mut PublishingTask> {
        let task = self.task_mut(id)?;
        if !task.status.can_transition_to(to) {
            return Err(invalid_transition(task.status, to));
        }
        debug!("任务 {} 状态流转: {} -> {}", id, task.status, to);
        task.status = to;
        task.updated_at = Utc::now();
        Ok(task)
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                tasks: BTreeMap::new(),
                logs: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    pub async fn create(&self, new_task: NewTask) -> PublishingTask {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        let now = Utc::now();
        let task = PublishingTask {
            id,
            tenant_id: new_task.tenant_id,
            article_id: new_task.article_id,
            account_id: new_task.account_id,
            platform_id: new_task.platform_id,
            status: TaskStatus::Pending,
            scheduled_at: new_task.scheduled_at,
            started_at: None,
            completed_at: None,
            error_message: None,
            error_kind: None,
            retry_count: 0,
            max_retries: new_task.max_retries,
            batch_id: new_task.batch_id,
            batch_order: new_task.batch_order,
            interval_minutes: new_task.interval_minutes,
            reservation_id: new_task.reservation_id,
            created_at: now,
            updated_at: now,
        };
        state.tasks.insert(id, task.clone());
        task
    }

    pub async fn get(&self, id: i64) -> AppResult<PublishingTask> {
        let state = self.state.lock().await;
        state.tasks.get(&id).cloned().ok_or_else(|| not_found(id))
    }

    /// 带租户归属校验的查询：存在但不属于该租户时报无权访问
    pub async fn get_for_tenant(&self, id: i64, tenant_id: i64) -> AppResult<PublishingTask> {
        let task = self.get(id).await?;
        if task.tenant_id != tenant_id {
            return Err(AppError::Authorization(format!("任务 {}", id)));
        }
        Ok(task)
    }

    pub async fn list(&self, filter: &TaskFilter) -> Vec<PublishingTask> {
        let state = self.state.lock().await;
        let mut tasks: Vec<PublishingTask> = state
            .tasks
            .values()
            .filter(|t| filter.tenant_id.map_or(true, |id| t.tenant_id == id))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| {
                filter
                    .batch_id
                    .as_deref()
                    .map_or(true, |b| t.batch_id.as_deref() == Some(b))
            })
            .filter(|t| filter.platform_id.map_or(true, |p| t.platform_id == p))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        tasks
    }

    /// 独占认领：pending -> running，并记录开始时间。
    /// 已被认领/取消的任务在这里以非法流转失败。
    pub async fn claim(&self, id: i64) -> AppResult<PublishingTask> {
        let mut state = self.state.lock().await;
        let task = state.transition(id, TaskStatus::Running)?;
        task.started_at = Some(Utc::now());
        task.error_message = None;
        task.error_kind = None;
        Ok(task.clone())
    }

    pub async fn complete(&self, id: i64) -> AppResult<PublishingTask> {
        let mut state = self.state.lock().await;
        let task = state.transition(id, TaskStatus::Completed)?;
        task.completed_at = Some(Utc::now());
        Ok(task.clone())
    }

    pub async fn fail(
        &self,
        id: i64,
        message: impl Into<String>,
        kind: ErrorKind,
    ) -> AppResult<PublishingTask> {
        let mut state = self.state.lock().await;
        let task = state.transition(id, TaskStatus::Failed)?;
        task.completed_at = Some(Utc::now());
        task.error_message = Some(message.into());
        task.error_kind = Some(kind);
        Ok(task.clone())
    }

    /// 终止正在执行的任务。幂等：已经失败/取消的任务直接返回 false。
    pub async fn terminate(&self, id: i64, message: impl Into<String>) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let current = state.task_mut(id)?.status;
        match current {
            TaskStatus::Running => {
                let task = state.transition(id, TaskStatus::Failed)?;
                task.completed_at = Some(Utc::now());
                task.error_message = Some(message.into());
                task.error_kind = Some(ErrorKind::Terminated);
                Ok(true)
            }
            TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Completed => Ok(false),
            TaskStatus::Pending => Err(invalid_transition(current, TaskStatus::Failed)),
        }
    }

    pub async fn cancel(&self, id: i64) -> AppResult<PublishingTask> {
        let mut state = self.state.lock().await;
        let task = state.transition(id, TaskStatus::Cancelled)?;
        task.completed_at = Some(Utc::now());
        Ok(task.clone())
    }

    pub async fn increment_retry(&self, id: i64) -> AppResult<i32> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        task.retry_count += 1;
        task.updated_at = Utc::now();
        Ok(task.retry_count)
    }

    /// 重试入队：failed -> pending，清除上一次尝试的痕迹
    pub async fn requeue(&self, id: i64) -> AppResult<PublishingTask> {
        let mut state = self.state.lock().await;
        let task = state.transition(id, TaskStatus::Pending)?;
        task.started_at = None;
        task.completed_at = None;
        task.error_message = None;
        task.error_kind = None;
        Ok(task.clone())
    }

    /// 删除单个任务，非终态拒绝
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let status = state.task_mut(id)?.status;
        if !status.is_terminal() {
            return Err(AppError::Validation(format!(
                "任务 {} 处于 {} 状态，须先取消或终止再删除",
                id, status
            )));
        }
        state.tasks.remove(&id);
        state.logs.remove(&id);
        Ok(())
    }

    /// 批量删除，跳过非终态与不存在的任务，返回实际删除数
    pub async fn batch_delete(&self, ids: &[i64]) -> usize {
        let mut state = self.state.lock().await;
        let mut deleted = 0;
        for id in ids {
            let terminal = state
                .tasks
                .get(id)
                .map(|t| t.status.is_terminal())
                .unwrap_or(false);
            if terminal {
                state.tasks.remove(id);
                state.logs.remove(id);
                deleted += 1;
            }
        }
        deleted
    }

    /// 按状态清空某租户的终态任务，返回删除数
    pub async fn delete_all(&self, tenant_id: i64, status: Option<TaskStatus>) -> usize {
        let mut state = self.state.lock().await;
        let targets: Vec<i64> = state
            .tasks
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.status.is_terminal())
            .filter(|t| status.map_or(true, |s| t.status == s))
            .map(|t| t.id)
            .collect();
        for id in &targets {
            state.tasks.remove(id);
            state.logs.remove(id);
        }
        targets.len()
    }

    /// 批次内任务，按 batch_order 升序
    pub async fn batch_tasks(&self, batch_id: &str) -> Vec<PublishingTask> {
        let state = self.state.lock().await;
        let mut tasks: Vec<PublishingTask> = state
            .tasks
            .values()
            .filter(|t| t.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.batch_order, t.id));
        tasks
    }

    /// 批次内 pending 任务数（批次停止判定的依据）
    pub async fn pending_count(&self, batch_id: &str) -> usize {
        let state = self.state.lock().await;
        state
            .tasks
            .values()
            .filter(|t| {
                t.batch_id.as_deref() == Some(batch_id) && t.status == TaskStatus::Pending
            })
            .count()
    }

    pub async fn batch_summary(&self, batch_id: &str) -> AppResult<BatchSummary> {
        let tasks = self.batch_tasks(batch_id).await;
        if tasks.is_empty() {
            return Err(AppError::NotFound(format!("批次 {}", batch_id)));
        }
        let mut summary = BatchSummary {
            batch_id: batch_id.to_string(),
            total_tasks: tasks.len(),
            created_at: tasks.iter().map(|t| t.created_at).min(),
            interval_minutes: tasks.iter().find_map(|t| t.interval_minutes),
            ..Default::default()
        };
        for task in &tasks {
            match task.status {
                TaskStatus::Pending => summary.pending_tasks += 1,
                TaskStatus::Running => summary.running_tasks += 1,
                TaskStatus::Completed => summary.completed_tasks += 1,
                TaskStatus::Failed => summary.failed_tasks += 1,
                TaskStatus::Cancelled => summary.cancelled_tasks += 1,
            }
        }
        Ok(summary)
    }

    /// 尚有 pending 任务的批次，按批次最早创建时间排序（恢复调度用）
    pub async fn batches_with_pending(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut batches: HashMap<String, DateTime<Utc>> = HashMap::new();
        for task in state.tasks.values() {
            if task.status != TaskStatus::Pending {
                continue;
            }
            if let Some(batch_id) = &task.batch_id {
                let entry = batches
                    .entry(batch_id.clone())
                    .or_insert(task.created_at);
                if task.created_at < *entry {
                    *entry = task.created_at;
                }
            }
        }
        let mut ordered: Vec<(String, DateTime<Utc>)> = batches.into_iter().collect();
        ordered.sort_by_key(|(_, at)| *at);
        ordered.into_iter().map(|(id, _)| id).collect()
    }

    /// 某租户是否有正在执行的任务（普通任务的节流依据）
    pub async fn tenant_has_running(&self, tenant_id: i64) -> bool {
        let state = self.state.lock().await;
        state
            .tasks
            .values()
            .any(|t| t.tenant_id == tenant_id && t.status == TaskStatus::Running)
    }

    /// 到期的普通（非批次）pending 任务，按创建时间排序
    pub async fn due_tasks(&self, now: DateTime<Utc>) -> Vec<PublishingTask> {
        let state = self.state.lock().await;
        let mut tasks: Vec<PublishingTask> = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && !t.is_batch_task() && t.is_due(now))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        tasks
    }

    /// 正在执行的全部任务（超时巡检用）
    pub async fn running_tasks(&self) -> Vec<PublishingTask> {
        let state = self.state.lock().await;
        state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .cloned()
            .collect()
    }

    /// 追加一条任务日志
    pub async fn append_log(&self, task_id: i64, level: LogLevel, message: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.logs.entry(task_id).or_default().push(TaskLog {
            task_id,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub async fn logs(&self, task_id: i64) -> Vec<TaskLog> {
        let state = self.state.lock().await;
        state.logs.get(&task_id).cloned().unwrap_or_default()
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlatformId;

    fn new_task(tenant_id: i64) -> NewTask {
        NewTask {
            tenant_id,
            article_id: 1,
            account_id: 1,
            platform_id: PlatformId::Toutiao,
            scheduled_at: None,
            max_retries: 3,
            batch_id: None,
            batch_order: None,
            interval_minutes: None,
            reservation_id: None,
        }
    }

    fn new_batch_task(batch_id: &str, order: i32) -> NewTask {
        NewTask {
            batch_id: Some(batch_id.to_string()),
            batch_order: Some(order),
            interval_minutes: Some(5),
            ..new_task(1)
        }
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = TaskStore::new();
        let task = store.create(new_task(1)).await;
        let claimed = store.claim(task.id).await.unwrap();
        assert_eq!(claimed.status, TaskStatus::Running);
        assert!(claimed.started_at.is_some());
        // 第二次认领必须失败
        assert!(store.claim(task.id).await.is_err());
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let store = TaskStore::new();
        let task = store.create(new_task(1)).await;
        store.claim(task.id).await.unwrap();
        assert!(store.terminate(task.id, "手动终止").await.unwrap());
        // 第二次终止是无害的空操作
        assert!(!store.terminate(task.id, "再次终止").await.unwrap());
        let task = store.get(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("手动终止"));
        assert_eq!(task.error_kind, Some(ErrorKind::Terminated));
    }

    #[tokio::test]
    async fn test_delete_rejects_non_terminal() {
        let store = TaskStore::new();
        let task = store.create(new_task(1)).await;
        assert!(store.delete(task.id).await.is_err());
        store.cancel(task.id).await.unwrap();
        store.delete(task.id).await.unwrap();
        assert!(store.get(task.id).await.is_err());
    }

    #[tokio::test]
    async fn test_requeue_clears_previous_attempt() {
        let store = TaskStore::new();
        let task = store.create(new_task(1)).await;
        store.claim(task.id).await.unwrap();
        store
            .fail(task.id, "点击发布按钮超时", ErrorKind::Timeout)
            .await
            .unwrap();
        let requeued = store.requeue(task.id).await.unwrap();
        assert_eq!(requeued.status, TaskStatus::Pending);
        assert!(requeued.started_at.is_none());
        assert!(requeued.error_message.is_none());
    }

    #[tokio::test]
    async fn test_ownership_check() {
        let store = TaskStore::new();
        let task = store.create(new_task(7)).await;
        assert!(store.get_for_tenant(task.id, 7).await.is_ok());
        assert!(matches!(
            store.get_for_tenant(task.id, 8).await,
            Err(AppError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_tasks_ordered_by_batch_order() {
        let store = TaskStore::new();
        store.create(new_batch_task("b1", 2)).await;
        store.create(new_batch_task("b1", 0)).await;
        store.create(new_batch_task("b1", 1)).await;
        store.create(new_batch_task("b2", 0)).await;
        let tasks = store.batch_tasks("b1").await;
        let orders: Vec<i32> = tasks.iter().filter_map(|t| t.batch_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_batch_summary_counts() {
        let store = TaskStore::new();
        let t1 = store.create(new_batch_task("b1", 0)).await;
        let t2 = store.create(new_batch_task("b1", 1)).await;
        store.create(new_batch_task("b1", 2)).await;
        store.claim(t1.id).await.unwrap();
        store.complete(t1.id).await.unwrap();
        store.cancel(t2.id).await.unwrap();
        let summary = store.batch_summary("b1").await.unwrap();
        assert_eq!(summary.total_tasks, 3);
        assert_eq!(summary.completed_tasks, 1);
        assert_eq!(summary.cancelled_tasks, 1);
        assert_eq!(summary.pending_tasks, 1);
        assert_eq!(summary.interval_minutes, Some(5));
    }

    #[tokio::test]
    async fn test_due_tasks_excludes_batch_and_future() {
        let store = TaskStore::new();
        let now = Utc::now();
        store.create(new_task(1)).await;
        store.create(new_batch_task("b1", 0)).await;
        store
            .create(NewTask {
                scheduled_at: Some(now + chrono::Duration::hours(1)),
                ..new_task(1)
            })
            .await;
        let due = store.due_tasks(now).await;
        assert_eq!(due.len(), 1);
        assert!(!due[0].is_batch_task());
    }

    #[tokio::test]
    async fn test_delete_all_only_touches_terminal() {
        let store = TaskStore::new();
        let t1 = store.create(new_task(1)).await;
        let t2 = store.create(new_task(1)).await;
        store.create(new_task(2)).await;
        store.cancel(t1.id).await.unwrap();
        store.claim(t2.id).await.unwrap();
        let deleted = store.delete_all(1, None).await;
        assert_eq!(deleted, 1);
        assert!(store.get(t2.id).await.is_ok());
    }
}
