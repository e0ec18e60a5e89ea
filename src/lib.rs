//! # Article Publisher
//!
//! 面向国内内容平台的文章自动发布引擎
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `CdpDom` - 唯一的 page owner，提供页面操作能力
//!
//! ### ② 业务能力层（Services / Adapters）
//! - `adapters/` - 平台适配器，声明"去哪里、找什么元素"
//! - `services/` - 任务存储、配额账本、会话校验、外部协作方
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"的完整发布流程
//! - `PublishFlow` - 认领 → 登录确认 → 发布 → 校验 → 结清配额
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_coordinator` - 批次协调器，全局单批次执行权
//! - `orchestrator/task_queue` - 后台队列，超时清扫与恢复调度
//!
//! ## 模块结构

pub mod adapters;
pub mod app;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod workflow;

// 重新导出常用类型
pub use adapters::{builtin_registry, AdapterRegistry, PlatformAdapter};
pub use app::{App, BatchItem, CreateTaskRequest};
pub use browser::connect_browser;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{CdpBrowser, CdpDom, Dom, DomProvider};
pub use models::{PlatformId, PublishingTask, TaskStatus};
pub use orchestrator::{BatchCoordinator, StopOutcome, TaskQueue};
pub use services::{QuotaLedger, SessionVerifier, TaskFilter, TaskStore};
pub use workflow::PublishFlow;
