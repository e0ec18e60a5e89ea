//! 发布任务记录与状态机
//!
//! 状态机（初始 pending）：
//!
//! ```text
//! pending  -> running    执行器独占认领（CAS）
//! pending  -> cancelled  执行前显式取消
//! running  -> completed  发布 + 成功校验均通过
//! running  -> failed     任何一步出错，或收到终止请求
//! failed   -> pending    协调器重试策略重新入队（全新一次尝试）
//! ```
//!
//! completed / cancelled 是终态，永远不会再进入 pending / running。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::platform::PlatformId;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// 是否为终态（completed / failed / cancelled）
    ///
    /// failed 任务可以被重试策略重新入队，但对配额与批次推进而言
    /// 它已经到达了本次尝试的终点。
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// 校验状态流转是否合法
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        matches!(
            (self, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Failed, TaskStatus::Pending)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 终止失败的错误标签（用于前端展示具体的补救动作）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 配额不足
    Quota,
    /// 登录会话失效，需重新登录
    SessionExpired,
    /// 自动化脚本失败
    Automation,
    /// 有界等待超时
    Timeout,
    /// 被手动终止
    Terminated,
}

/// 发布任务：一次 "某账号在某平台发布某篇文章" 的尝试
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingTask {
    pub id: i64,
    pub tenant_id: i64,
    pub article_id: i64,
    pub account_id: i64,
    pub platform_id: PlatformId,
    pub status: TaskStatus,
    /// 计划执行时间（为空表示立即可执行）
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub retry_count: i32,
    pub max_retries: i32,
    /// 所属批次（为空表示普通任务）
    pub batch_id: Option<String>,
    /// 批次内的执行顺序（批次内唯一）
    pub batch_order: Option<i32>,
    /// 与同批次下一个任务之间的最小间隔（分钟）
    pub interval_minutes: Option<i64>,
    /// 创建任务前预留的配额（确认/释放二选一，恰好一次）
    pub reservation_id: Option<uuid::Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublishingTask {
    /// 是否属于某个批次
    pub fn is_batch_task(&self) -> bool {
        self.batch_id.is_some()
    }

    /// 是否已到计划执行时间
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.scheduled_at {
            Some(at) => at <= now,
            None => true,
        }
    }
}

/// 创建任务的输入（id 与时间戳由存储层分配）
#[derive(Debug, Clone)]
pub struct NewTask {
    pub tenant_id: i64,
    pub article_id: i64,
    pub account_id: i64,
    pub platform_id: PlatformId,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub max_retries: i32,
    pub batch_id: Option<String>,
    pub batch_order: Option<i32>,
    pub interval_minutes: Option<i64>,
    pub reservation_id: Option<uuid::Uuid>,
}

/// 任务执行日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// 追加式的任务执行日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    pub task_id: i64,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// 批次汇总信息（各状态的任务计数）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub interval_minutes: Option<i64>,
}
