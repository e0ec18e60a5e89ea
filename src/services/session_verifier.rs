//! 登录会话校验
//!
//! 职责只有"验证并报告"：判定登录状态、等待用户完成登录、
//! 周期性监控在线状态。绝不伪造或修复凭证。
//!
//! 判定一律收敛到布尔值：检查过程中的任何错误（页面崩溃、
//! 导航失败）都按"未登录"报告，绝不让错误冒泡成任务失败以外的状态。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::PlatformAdapter;
use crate::infrastructure::Dom;
use crate::models::PlatformId;

/// 在线状态变化的回调（仅在状态翻转时触发）
pub type StatusCallback = Arc<dyn Fn(PlatformId, bool) + Send + Sync>;

/// 监控任务的句柄
pub struct MonitorHandle {
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn stop(self) {
        self.handle.abort();
    }
}

pub struct SessionVerifier {
    /// 导航后等待页面稳定的毫秒数
    settle_ms: u64,
}

impl SessionVerifier {
    pub fn new(settle_ms: u64) -> Self {
        Self { settle_ms }
    }

    /// 检查当前页面的登录状态，检查失败一律按未登录处理
    pub async fn check_login_status(
        &self,
        adapter: &dyn PlatformAdapter,
        dom: &dyn Dom,
    ) -> bool {
        match adapter.check_login_status(dom).await {
            Ok(logged_in) => logged_in,
            Err(err) => {
                warn!("⚠️ {} 登录检查失败，按未登录处理: {}", adapter.platform_name(), err);
                false
            }
        }
    }

    /// 导航到发布页后验证 Cookie 会话是否仍然有效
    ///
    /// 导航失败同样按无效处理，调用方据此走会话失效的失败路径。
    pub async fn verify_cookie_valid(
        &self,
        adapter: &dyn PlatformAdapter,
        dom: &dyn Dom,
    ) -> bool {
        if let Err(err) = dom.goto(adapter.publish_url()).await {
            warn!("⚠️ {} 导航到发布页失败: {}", adapter.platform_name(), err);
            return false;
        }
        dom.settle(self.settle_ms).await;
        self.check_login_status(adapter, dom).await
    }

    /// 轮询等待用户在浏览器里完成登录，尝试耗尽返回 false
    pub async fn wait_for_login(
        &self,
        adapter: &dyn PlatformAdapter,
        dom: &dyn Dom,
        interval: Duration,
        max_attempts: u32,
    ) -> bool {
        info!(
            "⏳ 等待 {} 登录（最多 {} 次，每 {:?} 检查一次）",
            adapter.platform_name(),
            max_attempts,
            interval
        );
        for attempt in 1..=max_attempts {
            if self.check_login_status(adapter, dom).await {
                info!("✅ {} 已登录（第 {} 次检查）", adapter.platform_name(), attempt);
                return true;
            }
            debug!("{} 第 {}/{} 次检查：未登录", adapter.platform_name(), attempt, max_attempts);
            tokio::time::sleep(interval).await;
        }
        warn!("❌ 等待 {} 登录超时", adapter.platform_name());
        false
    }

    /// 启动周期性在线状态监控
    ///
    /// 回调只在状态翻转时触发（上线 / 掉线各一次），
    /// 单次检查出错按当次掉线处理，不中断监控。
    pub fn start_monitoring(
        &self,
        adapter: Arc<dyn PlatformAdapter>,
        dom: Arc<dyn Dom>,
        interval: Duration,
        callback: StatusCallback,
    ) -> MonitorHandle {
        let platform_id = adapter.platform_id();
        info!("👀 启动 {} 在线状态监控，每 {:?} 检查一次", adapter.platform_name(), interval);
        let handle = tokio::spawn(async move {
            let mut last_status: Option<bool> = None;
            loop {
                let online = adapter
                    .check_login_status(dom.as_ref())
                    .await
                    .unwrap_or(false);
                if last_status != Some(online) {
                    if online {
                        info!("🟢 {} 上线", adapter.platform_name());
                    } else {
                        warn!("🔴 {} 掉线", adapter.platform_name());
                    }
                    callback(platform_id, online);
                    last_status = Some(online);
                }
                tokio::time::sleep(interval).await;
            }
        });
        MonitorHandle { handle }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::adapters::sohu::SohuAdapter;
    use crate::adapters::toutiao::ToutiaoAdapter;
    use crate::infrastructure::fake_dom::FakeDom;

    #[tokio::test]
    async fn test_redirect_to_login_page_means_offline() {
        let verifier = SessionVerifier::new(0);
        let dom = FakeDom::permissive();
        dom.set_redirect("https://mp.toutiao.com/auth/page/login");
        assert!(!verifier.verify_cookie_valid(&ToutiaoAdapter, &*dom).await);
    }

    #[tokio::test]
    async fn test_navigation_error_means_offline() {
        let verifier = SessionVerifier::new(0);
        let dom = FakeDom::permissive();
        dom.set_fail_goto(true);
        assert!(!verifier.verify_cookie_valid(&ToutiaoAdapter, &*dom).await);
    }

    #[tokio::test]
    async fn test_wait_for_login_exhausts_attempts() {
        let verifier = SessionVerifier::new(0);
        let dom = FakeDom::blank();
        dom.set_redirect("https://mp.sohu.com/mpfe/v4/login");
        dom.goto("https://mp.sohu.com/mpfe/v3/main/index")
            .await
            .unwrap();
        let logged_in = verifier
            .wait_for_login(&SohuAdapter, &*dom, Duration::from_millis(5), 3)
            .await;
        assert!(!logged_in);
    }

    #[tokio::test]
    async fn test_wait_for_login_detects_completion() {
        let verifier = SessionVerifier::new(0);
        let dom = FakeDom::blank();
        dom.goto("https://mp.sohu.com/mpfe/v3/main/index")
            .await
            .unwrap();
        // 两次检查后模拟用户完成登录
        let dom_clone = Arc::clone(&dom);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            dom_clone.show(".user-name");
        });
        let logged_in = verifier
            .wait_for_login(&SohuAdapter, &*dom, Duration::from_millis(5), 50)
            .await;
        assert!(logged_in);
    }

    #[tokio::test]
    async fn test_monitoring_fires_only_on_transitions() {
        let verifier = SessionVerifier::new(0);
        let dom = FakeDom::blank();
        dom.goto("https://mp.sohu.com/mpfe/v3/main/index")
            .await
            .unwrap();
        dom.show(".user-name");

        let events: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let handle = verifier.start_monitoring(
            Arc::new(SohuAdapter),
            dom.clone(),
            Duration::from_millis(5),
            Arc::new(move |_, online| sink.lock().unwrap().push(online)),
        );

        // 在线一段时间后掉线
        tokio::time::sleep(Duration::from_millis(20)).await;
        dom.set_redirect("https://mp.sohu.com/mpfe/v4/login");
        dom.goto("https://mp.sohu.com/mpfe/v3/main/index")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop();

        let events = events.lock().unwrap().clone();
        // 多轮检查但只记录两次翻转：上线、掉线
        assert_eq!(events, vec![true, false]);
    }
}
