//! 应用装配与对外操作入口
//!
//! `App` 把存储、账本、适配器注册表、工作流与编排层装配起来，
//! 对外暴露任务与批次的全部操作。所有带租户参数的操作都先做
//! 归属校验，配额在任务创建时预扣减。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::{builtin_registry, AdapterRegistry};
use crate::browser::connect_browser;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{CdpBrowser, DomProvider};
use crate::models::{
    BatchSummary, NewTask, PlatformId, PublishingTask, QuotaType, TaskLog, TaskStatus,
};
use crate::orchestrator::{BatchCoordinator, QueueHandle, StopOutcome, TaskQueue};
use crate::services::{AccountStore, ArticleStore, QuotaLedger, SessionVerifier, TaskFilter, TaskStore};
use crate::workflow::PublishFlow;

/// 创建单个任务的请求
#[derive(Debug, Clone)]
pub struct CreateTaskRequest {
    pub tenant_id: i64,
    pub article_id: i64,
    pub account_id: i64,
    pub platform_id: PlatformId,
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// 批次里的一项
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub article_id: i64,
    pub account_id: i64,
    pub platform_id: PlatformId,
}

pub struct App {
    config: Config,
    store: Arc<TaskStore>,
    ledger: Arc<QuotaLedger>,
    articles: Arc<ArticleStore>,
    accounts: Arc<AccountStore>,
    registry: Arc<AdapterRegistry>,
    verifier: Arc<SessionVerifier>,
    provider: Arc<dyn DomProvider>,
    flow: Arc<PublishFlow>,
    coordinator: Arc<BatchCoordinator>,
    queue: Arc<TaskQueue>,
}

impl App {
    /// 连接调试端口上的浏览器并装配整个应用
    pub async fn connect(config: Config) -> Result<Self> {
        let browser = connect_browser(config.browser_debug_port).await?;
        let provider: Arc<dyn DomProvider> = Arc::new(CdpBrowser::new(
            browser,
            config.navigation_timeout_secs,
            config.selector_timeout_secs,
        ));
        Ok(Self::assemble(config, provider))
    }

    /// 用外部提供的页面能力装配（测试与嵌入场景）
    pub fn assemble(config: Config, provider: Arc<dyn DomProvider>) -> Self {
        let store = Arc::new(TaskStore::new());
        let ledger = Arc::new(QuotaLedger::new(config.reservation_ttl_minutes));
        let articles = Arc::new(ArticleStore::new());
        let accounts = Arc::new(AccountStore::new());
        let registry: Arc<AdapterRegistry> = Arc::new(builtin_registry());
        let verifier = Arc::new(SessionVerifier::new(config.settle_ms));
        let flow = Arc::new(PublishFlow::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&registry),
            Arc::clone(&articles),
            Arc::clone(&accounts),
            Arc::clone(&verifier),
            Arc::clone(&provider),
            config.auto_retry,
        ));
        let coordinator = Arc::new(BatchCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&flow),
            Arc::clone(&ledger),
            Duration::from_secs(config.batch_wait_check_secs),
        ));
        let queue = Arc::new(TaskQueue::new(
            Arc::clone(&store),
            Arc::clone(&flow),
            Arc::clone(&coordinator),
            Arc::clone(&ledger),
            config.queue_check_interval_secs,
            config.task_timeout_minutes,
        ));
        Self {
            config,
            store,
            ledger,
            articles,
            accounts,
            registry,
            verifier,
            provider,
            flow,
            coordinator,
            queue,
        }
    }

    pub fn articles(&self) -> &Arc<ArticleStore> {
        &self.articles
    }

    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    /// 校验归属并预扣配额后创建单个任务
    pub async fn create_task(&self, request: CreateTaskRequest) -> AppResult<PublishingTask> {
        let account = self
            .accounts
            .get_for_tenant(request.account_id, request.tenant_id)
            .await?;
        if account.platform_id != request.platform_id {
            return Err(AppError::Validation(format!(
                "账号 {} 不属于平台 {}",
                request.account_id, request.platform_id
            )));
        }
        self.articles
            .get_for_tenant(request.article_id, request.tenant_id)
            .await?;
        let reservation = self
            .ledger
            .reserve(request.tenant_id, QuotaType::Publish, 1)
            .await?;
        let task = self
            .store
            .create(NewTask {
                tenant_id: request.tenant_id,
                article_id: request.article_id,
                account_id: request.account_id,
                platform_id: request.platform_id,
                scheduled_at: request.scheduled_at,
                max_retries: self.config.default_max_retries,
                batch_id: None,
                batch_order: None,
                interval_minutes: None,
                reservation_id: Some(reservation.reservation_id),
            })
            .await;
        info!("📋 创建任务 {} (租户 {})", task.id, task.tenant_id);
        Ok(task)
    }

    /// 创建一个批次
    ///
    /// 配额先于任务：全部项目的预留一次性成功才开始建任务，
    /// 任何一笔预留失败就释放已预留的部分并整体拒绝，不会留下半个批次。
    pub async fn create_batch(
        &self,
        tenant_id: i64,
        items: Vec<BatchItem>,
        interval_minutes: Option<i64>,
    ) -> AppResult<String> {
        if items.is_empty() {
            return Err(AppError::Validation("批次不能为空".to_string()));
        }
        for item in &items {
            let account = self
                .accounts
                .get_for_tenant(item.account_id, tenant_id)
                .await?;
            if account.platform_id != item.platform_id {
                return Err(AppError::Validation(format!(
                    "账号 {} 不属于平台 {}",
                    item.account_id, item.platform_id
                )));
            }
            self.articles
                .get_for_tenant(item.article_id, tenant_id)
                .await?;
        }
        let mut reservations = Vec::with_capacity(items.len());
        for _ in &items {
            match self.ledger.reserve(tenant_id, QuotaType::Publish, 1).await {
                Ok(reservation) => reservations.push(reservation),
                Err(err) => {
                    for reservation in reservations {
                        if let Err(release_err) =
                            self.ledger.release(reservation.reservation_id).await
                        {
                            warn!("⚠️ 回滚预留失败: {}", release_err);
                        }
                    }
                    return Err(err);
                }
            }
        }

        let batch_id = Uuid::new_v4().to_string();
        self.coordinator.register_batch(&batch_id, items.len()).await;
        for (order, (item, reservation)) in items.iter().zip(reservations).enumerate() {
            self.store
                .create(NewTask {
                    tenant_id,
                    article_id: item.article_id,
                    account_id: item.account_id,
                    platform_id: item.platform_id,
                    scheduled_at: None,
                    max_retries: self.config.default_max_retries,
                    batch_id: Some(batch_id.clone()),
                    batch_order: Some(order as i32),
                    interval_minutes,
                    reservation_id: Some(reservation.reservation_id),
                })
                .await;
            self.coordinator.notify_task_created(&batch_id).await;
        }
        info!("📦 创建批次 {} ({} 个任务)", batch_id, items.len());
        Ok(batch_id)
    }

    /// 手动执行一个任务（同租户已有任务在执行时拒绝）
    pub async fn execute_task(&self, task_id: i64, tenant_id: i64) -> AppResult<PublishingTask> {
        let task = self.store.get_for_tenant(task_id, tenant_id).await?;
        if self.store.tenant_has_running(tenant_id).await {
            return Err(AppError::Validation(format!(
                "租户 {} 已有任务在执行",
                tenant_id
            )));
        }
        self.flow.execute(task.id).await
    }

    /// 取消等待中的任务并释放预留
    pub async fn cancel_task(&self, task_id: i64, tenant_id: i64) -> AppResult<PublishingTask> {
        self.store.get_for_tenant(task_id, tenant_id).await?;
        let task = self.store.cancel(task_id).await?;
        self.release_reservation(&task).await;
        info!("🚫 任务 {} 已取消", task_id);
        Ok(task)
    }

    /// 终止正在执行的任务并释放预留（幂等）
    pub async fn terminate_task(&self, task_id: i64, tenant_id: i64) -> AppResult<bool> {
        self.store.get_for_tenant(task_id, tenant_id).await?;
        let terminated = self.store.terminate(task_id, "任务被手动终止").await?;
        if terminated {
            let task = self.store.get(task_id).await?;
            self.release_reservation(&task).await;
            info!("🛑 任务 {} 已终止", task_id);
        }
        Ok(terminated)
    }

    /// 删除任务；未到终态的先取消/终止再删
    pub async fn delete_task(&self, task_id: i64, tenant_id: i64) -> AppResult<()> {
        let task = self.store.get_for_tenant(task_id, tenant_id).await?;
        match task.status {
            TaskStatus::Pending => {
                self.cancel_task(task_id, tenant_id).await?;
            }
            TaskStatus::Running => {
                self.terminate_task(task_id, tenant_id).await?;
            }
            _ => {}
        }
        self.store.delete(task_id).await
    }

    pub async fn task(&self, task_id: i64, tenant_id: i64) -> AppResult<PublishingTask> {
        self.store.get_for_tenant(task_id, tenant_id).await
    }

    pub async fn tasks(&self, filter: &TaskFilter) -> Vec<PublishingTask> {
        self.store.list(filter).await
    }

    pub async fn task_logs(&self, task_id: i64, tenant_id: i64) -> AppResult<Vec<TaskLog>> {
        self.store.get_for_tenant(task_id, tenant_id).await?;
        Ok(self.store.logs(task_id).await)
    }

    /// 批量删除（跳过非终态与不属于该租户的任务）
    pub async fn batch_delete(&self, task_ids: &[i64], tenant_id: i64) -> usize {
        let mut owned = Vec::with_capacity(task_ids.len());
        for id in task_ids {
            if self.store.get_for_tenant(*id, tenant_id).await.is_ok() {
                owned.push(*id);
            }
        }
        self.store.batch_delete(&owned).await
    }

    /// 清空某租户的终态任务
    pub async fn delete_all(&self, tenant_id: i64, status: Option<TaskStatus>) -> usize {
        self.store.delete_all(tenant_id, status).await
    }

    pub async fn start_batch(&self, batch_id: &str) -> bool {
        self.coordinator.start_batch(batch_id).await
    }

    pub async fn stop_batch(&self, batch_id: &str) -> StopOutcome {
        self.coordinator.stop_batch(batch_id).await
    }

    pub async fn delete_batch(&self, batch_id: &str) -> usize {
        self.coordinator.delete_batch(batch_id).await
    }

    pub async fn batch_summary(&self, batch_id: &str) -> AppResult<BatchSummary> {
        self.store.batch_summary(batch_id).await
    }

    /// 校验账号的登录会话是否有效，并回写校验痕迹
    pub async fn check_account_session(
        &self,
        account_id: i64,
        tenant_id: i64,
    ) -> AppResult<bool> {
        let account = self.accounts.get_for_tenant(account_id, tenant_id).await?;
        let adapter = self.registry.get(account.platform_id)?;
        let dom = self.provider.open().await?;
        if account.credentials.has_cookies() {
            dom.set_cookies(&account.credentials.cookies).await?;
        }
        let valid = self
            .verifier
            .verify_cookie_valid(adapter.as_ref(), dom.as_ref())
            .await;
        self.accounts.record_session_check(account_id, valid).await;
        Ok(valid)
    }

    /// 打开登录页并等待用户完成登录
    pub async fn wait_for_account_login(
        &self,
        account_id: i64,
        tenant_id: i64,
    ) -> AppResult<bool> {
        let account = self.accounts.get_for_tenant(account_id, tenant_id).await?;
        let adapter = self.registry.get(account.platform_id)?;
        let dom = self.provider.open().await?;
        dom.goto(adapter.login_url()).await?;
        let logged_in = self
            .verifier
            .wait_for_login(
                adapter.as_ref(),
                dom.as_ref(),
                Duration::from_secs(self.config.login_poll_interval_secs),
                self.config.login_max_attempts,
            )
            .await;
        self.accounts.record_session_check(account_id, logged_in).await;
        Ok(logged_in)
    }

    /// 启动账号的在线状态监控，回调只在状态翻转时触发
    pub async fn monitor_account(
        &self,
        account_id: i64,
        tenant_id: i64,
        callback: crate::services::StatusCallback,
    ) -> AppResult<crate::services::MonitorHandle> {
        let account = self.accounts.get_for_tenant(account_id, tenant_id).await?;
        let adapter = self.registry.get(account.platform_id)?;
        let dom = self.provider.open().await?;
        if account.credentials.has_cookies() {
            dom.set_cookies(&account.credentials.cookies).await?;
        }
        dom.goto(adapter.publish_url()).await?;
        Ok(self.verifier.start_monitoring(
            adapter,
            dom,
            Duration::from_secs(self.config.monitor_interval_secs),
            callback,
        ))
    }

    /// 启动后台队列并阻塞运行，直到收到退出信号
    pub async fn run(&self) -> Result<()> {
        let handle: QueueHandle = Arc::clone(&self.queue).start();
        info!("🚀 发布引擎已就绪");
        tokio::signal::ctrl_c().await?;
        info!("👋 收到退出信号，停止后台队列");
        handle.stop();
        Ok(())
    }

    async fn release_reservation(&self, task: &PublishingTask) {
        if let Some(reservation_id) = task.reservation_id {
            if let Err(err) = self.ledger.release(reservation_id).await {
                warn!("⚠️ 释放预留 {} 失败: {}", reservation_id, err);
            }
        }
    }
}
