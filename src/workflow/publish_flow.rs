//! 单任务发布流程
//!
//! 一次完整的执行：独占认领 -> 登录确认 -> 页面发布 -> 结果校验，
//! 然后收敛到终态并结清配额预留。
//!
//! 配额结清规则（每笔预留恰好结清一次）：
//!
//! - 成功：confirm
//! - 最终失败（重试耗尽 / 会话失效 / 取消 / 终止）：release
//! - 重试入队：预留跟着任务走，不结清
//!
//! 会话失效是快速失败：不做发布尝试、不重试，重试对它没有意义。

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::adapters::AdapterRegistry;
use crate::error::{AppError, AppResult};
use crate::infrastructure::DomProvider;
use crate::models::{ErrorKind, LogLevel, PublishConfig, PublishingTask};
use crate::services::{AccountStore, ArticleStore, QuotaLedger, SessionVerifier, TaskStore};

fn kind_of(err: &AppError) -> ErrorKind {
    match err {
        AppError::QuotaExhausted { .. } => ErrorKind::Quota,
        AppError::SessionExpired { .. } => ErrorKind::SessionExpired,
        AppError::Timeout { .. } => ErrorKind::Timeout,
        _ => ErrorKind::Automation,
    }
}

pub struct PublishFlow {
    store: Arc<TaskStore>,
    ledger: Arc<QuotaLedger>,
    registry: Arc<AdapterRegistry>,
    articles: Arc<ArticleStore>,
    accounts: Arc<AccountStore>,
    verifier: Arc<SessionVerifier>,
    dom_provider: Arc<dyn DomProvider>,
    auto_retry: bool,
}

impl PublishFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<TaskStore>,
        ledger: Arc<QuotaLedger>,
        registry: Arc<AdapterRegistry>,
        articles: Arc<ArticleStore>,
        accounts: Arc<AccountStore>,
        verifier: Arc<SessionVerifier>,
        dom_provider: Arc<dyn DomProvider>,
        auto_retry: bool,
    ) -> Self {
        Self {
            store,
            ledger,
            registry,
            articles,
            accounts,
            verifier,
            dom_provider,
            auto_retry,
        }
    }

    /// 执行一个任务直至终态
    ///
    /// 返回 `Err` 表示本次尝试失败（任务可能已重新入队等待重试）。
    pub async fn execute(&self, task_id: i64) -> AppResult<PublishingTask> {
        // 独占认领，竞争失败的调用者在这里拿到非法流转错误
        let task = self.store.claim(task_id).await?;
        info!(
            "🚀 开始执行任务 {} (平台 {}, 文章 {})",
            task.id, task.platform_id, task.article_id
        );
        self.store
            .append_log(task.id, LogLevel::Info, "开始执行发布任务")
            .await;

        match self.run_attempt(&task).await {
            Ok(()) => {
                let task = self.store.complete(task.id).await?;
                if let Some(reservation_id) = task.reservation_id {
                    if let Err(err) = self.ledger.confirm(reservation_id).await {
                        // 预留过期时任务结果不受影响，账本按已清理处理
                        warn!("⚠️ 任务 {} 确认配额失败: {}", task.id, err);
                    }
                }
                self.store
                    .append_log(task.id, LogLevel::Info, "发布成功")
                    .await;
                info!("✅ 任务 {} 发布成功", task.id);
                Ok(task)
            }
            Err(err) => {
                self.handle_failure(&task, &err).await;
                Err(err)
            }
        }
    }

    async fn run_attempt(&self, task: &PublishingTask) -> AppResult<()> {
        let adapter = self.registry.get(task.platform_id)?;
        let article = self
            .articles
            .get_for_tenant(task.article_id, task.tenant_id)
            .await?;
        let account = self
            .accounts
            .get_for_tenant(task.account_id, task.tenant_id)
            .await?;

        let dom = self.dom_provider.open().await?;

        // 登录确认。失败是快速失败：不进入发布阶段
        let logged_in = match adapter.perform_login(dom.as_ref(), &account.credentials).await {
            Ok(status) => status,
            Err(err) => {
                warn!("⚠️ 任务 {} 登录流程出错: {}", task.id, err);
                false
            }
        };
        self.accounts
            .record_session_check(account.id, logged_in)
            .await;
        if !logged_in {
            return Err(AppError::SessionExpired {
                platform: adapter.platform_name().to_string(),
            });
        }

        // 二次确认会话在发布页上仍然有效（同时把页面带到发布页）
        if !self.verifier.verify_cookie_valid(adapter.as_ref(), dom.as_ref()).await {
            self.accounts.record_session_check(account.id, false).await;
            return Err(AppError::SessionExpired {
                platform: adapter.platform_name().to_string(),
            });
        }

        self.store
            .append_log(task.id, LogLevel::Info, "登录确认通过，开始发布")
            .await;
        adapter
            .perform_publish(dom.as_ref(), &article, &PublishConfig::default())
            .await?;

        if !adapter.verify_publish_success(dom.as_ref()).await? {
            return Err(AppError::Automation("发布结果校验未通过".to_string()));
        }
        Ok(())
    }

    /// 失败收敛：标记失败，按策略重试或最终结清预留
    async fn handle_failure(&self, task: &PublishingTask, err: &AppError) {
        error!("❌ 任务 {} 执行失败: {}", task.id, err);
        let kind = kind_of(err);
        if let Err(transition_err) = self.store.fail(task.id, err.to_string(), kind).await {
            // 任务已在别处被终止，预留由终止方结清
            warn!(
                "任务 {} 已不在执行态，跳过失败处理: {}",
                task.id, transition_err
            );
            return;
        }
        self.store
            .append_log(task.id, LogLevel::Error, format!("执行失败: {}", err))
            .await;

        let should_retry =
            self.auto_retry && err.counts_toward_retry() && task.retry_count < task.max_retries;
        if should_retry {
            match self.retry(task).await {
                Ok(retry_count) => {
                    info!(
                        "🔄 任务 {} 重新入队，第 {}/{} 次重试",
                        task.id, retry_count, task.max_retries
                    );
                    return;
                }
                Err(requeue_err) => {
                    warn!("任务 {} 重新入队失败: {}", task.id, requeue_err);
                }
            }
        }
        // 最终失败，释放预留
        if let Some(reservation_id) = task.reservation_id {
            if let Err(release_err) = self.ledger.release(reservation_id).await {
                warn!("⚠️ 任务 {} 释放配额失败: {}", task.id, release_err);
            }
        }
    }

    async fn retry(&self, task: &PublishingTask) -> AppResult<i32> {
        let retry_count = self.store.increment_retry(task.id).await?;
        // 预留跟随任务进入下一次尝试，不在这里结清
        self.store.requeue(task.id).await?;
        self.store
            .append_log(
                task.id,
                LogLevel::Warning,
                format!("自动重试，第 {}/{} 次", retry_count, task.max_retries),
            )
            .await;
        Ok(retry_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::builtin_registry;
    use crate::infrastructure::fake_dom::FakeDom;
    use crate::infrastructure::Dom;
    use crate::models::{
        Account, Article, Cookie, Credentials, LoginSession, NewTask, PlatformId, QuotaType,
        ReservationStatus, TaskStatus,
    };
    use async_trait::async_trait;

    /// 每次 open 都返回同一个 FakeDom
    struct FakeProvider {
        dom: Arc<FakeDom>,
    }

    #[async_trait]
    impl DomProvider for FakeProvider {
        async fn open(&self) -> AppResult<Arc<dyn Dom>> {
            Ok(self.dom.clone())
        }
    }

    struct Fixture {
        store: Arc<TaskStore>,
        ledger: Arc<QuotaLedger>,
        flow: PublishFlow,
        dom: Arc<FakeDom>,
    }

    async fn fixture(dom: Arc<FakeDom>, auto_retry: bool) -> Fixture {
        let store = Arc::new(TaskStore::new());
        let ledger = Arc::new(QuotaLedger::new(10));
        ledger.set_limit(1, QuotaType::Publish, 100).await;
        let articles = Arc::new(ArticleStore::new());
        articles
            .upsert(Article {
                id: 1,
                tenant_id: 1,
                title: "春季养生指南".to_string(),
                content: "第一段\n\n第二段".to_string(),
                keyword: None,
                images: vec![],
            })
            .await;
        let accounts = Arc::new(AccountStore::new());
        accounts
            .upsert(Account {
                id: 1,
                tenant_id: 1,
                platform_id: PlatformId::Toutiao,
                account_name: "头条主号".to_string(),
                credentials: Credentials {
                    cookies: vec![Cookie {
                        name: "sessionid".to_string(),
                        value: "abc".to_string(),
                        domain: ".toutiao.com".to_string(),
                        path: "/".to_string(),
                    }],
                    ..Default::default()
                },
                session: LoginSession::default(),
            })
            .await;
        let flow = PublishFlow::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::new(builtin_registry()),
            articles,
            accounts,
            Arc::new(SessionVerifier::new(0)),
            Arc::new(FakeProvider { dom: dom.clone() }),
            auto_retry,
        );
        Fixture {
            store,
            ledger,
            flow,
            dom,
        }
    }

    async fn create_task(fx: &Fixture) -> i64 {
        let reservation = fx.ledger.reserve(1, QuotaType::Publish, 1).await.unwrap();
        fx.store
            .create(NewTask {
                tenant_id: 1,
                article_id: 1,
                account_id: 1,
                platform_id: PlatformId::Toutiao,
                scheduled_at: None,
                max_retries: 3,
                batch_id: None,
                batch_order: None,
                interval_minutes: None,
                reservation_id: Some(reservation.reservation_id),
            })
            .await
            .id
    }

    #[tokio::test]
    async fn test_success_path_confirms_reservation() {
        let fx = fixture(FakeDom::permissive(), true).await;
        let task_id = create_task(&fx).await;
        let task = fx.flow.execute(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        let reservation = fx
            .ledger
            .reservation(task.reservation_id.unwrap())
            .await
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Confirmed);
        // 发布动作确实发生了
        assert!(!fx.dom.clicks().is_empty());
        assert!(!fx.dom.typed().is_empty());
    }

    #[tokio::test]
    async fn test_session_expired_fails_fast_without_publishing() {
        let dom = FakeDom::permissive();
        dom.set_redirect("https://mp.toutiao.com/auth/page/login");
        let fx = fixture(dom, true).await;
        let task_id = create_task(&fx).await;
        let err = fx.flow.execute(task_id).await.unwrap_err();
        assert!(matches!(err, AppError::SessionExpired { .. }));
        let task = fx.store.get(task_id).await.unwrap();
        // 会话失效不重试，直接最终失败并释放预留
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_kind, Some(ErrorKind::SessionExpired));
        let reservation = fx
            .ledger
            .reservation(task.reservation_id.unwrap())
            .await
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Released);
        // 没有做任何发布动作
        assert!(fx.dom.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_mid_publish_failure_requeues_and_keeps_reservation() {
        let dom = FakeDom::permissive();
        dom.fail_click("button:has-text(\"预览并发布\")");
        let fx = fixture(dom, true).await;
        let task_id = create_task(&fx).await;
        assert!(fx.flow.execute(task_id).await.is_err());
        let task = fx.store.get(task_id).await.unwrap();
        // 自动化失败计入重试，任务重新入队，预留保持在途
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        let reservation = fx
            .ledger
            .reservation(task.reservation_id.unwrap())
            .await
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Reserved);
    }

    #[tokio::test]
    async fn test_retries_exhausted_releases_reservation() {
        let dom = FakeDom::permissive();
        dom.fail_click("button:has-text(\"预览并发布\")");
        let fx = fixture(dom, true).await;
        let task_id = create_task(&fx).await;
        for _ in 0..4 {
            assert!(fx.flow.execute(task_id).await.is_err());
        }
        let task = fx.store.get(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 3);
        let reservation = fx
            .ledger
            .reservation(task.reservation_id.unwrap())
            .await
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Released);
    }

    #[tokio::test]
    async fn test_auto_retry_disabled_fails_final() {
        let dom = FakeDom::permissive();
        dom.fail_click("button:has-text(\"预览并发布\")");
        let fx = fixture(dom, false).await;
        let task_id = create_task(&fx).await;
        assert!(fx.flow.execute(task_id).await.is_err());
        let task = fx.store.get(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 0);
    }
}
