//! 平台适配器
//!
//! 每个平台一个适配器，只声明"去哪里、找什么元素"，
//! 登录检测 / 脚本发布 / 结果确认的通用流程由 trait 默认实现提供，
//! 平台页面结构特殊时再覆写对应方法。
//!
//! ## 判定口径
//!
//! - 被重定向到登录页是确定性的"未登录"
//! - 成功指示器出现是确定性的"成功"
//! - 两者都没有时按成功处理：宁可漏报失败，不可把已发布的文章判为失败后重试造成重复发布

mod content;

pub mod baijiahao;
pub mod bilibili;
pub mod csdn;
pub mod douyin;
pub mod jianshu;
pub mod qie;
pub mod sohu;
pub mod toutiao;
pub mod wangyi;
pub mod wechat;
pub mod xiaohongshu;
pub mod zhihu;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::Dom;
use crate::models::{Article, Credentials, PlatformId, PublishConfig};

pub use content::{clean_article, extract_images, CleanedArticle};

/// 登录流程的元素定位
#[derive(Debug, Clone, Copy)]
pub struct LoginSelectors {
    pub username_input: &'static str,
    pub password_input: &'static str,
    pub submit_button: &'static str,
    /// 登录成功后才出现的元素（None 表示平台没有稳定的指示器）
    pub success_indicator: Option<&'static str>,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            username_input: "input[placeholder=\"请输入手机号\"]",
            password_input: "input[placeholder=\"请输入密码\"]",
            submit_button: "button:has-text(\"登录\")",
            success_indicator: None,
        }
    }
}

/// 发布流程的元素定位
#[derive(Debug, Clone, Copy)]
pub struct PublishSelectors {
    pub title_input: &'static str,
    pub content_editor: &'static str,
    pub tags_input: Option<&'static str>,
    pub cover_image_upload: Option<&'static str>,
    pub publish_button: &'static str,
    /// 发布成功的指示器（元素或 `text=` 文本）
    pub success_indicator: Option<&'static str>,
}

/// 登录页 URL 的特征片段，命中即判定未登录
const LOGIN_URL_MARKERS: [&str; 3] = ["/login", "passport", "clientAuth"];

/// 等待成功指示器的时长
const INDICATOR_WAIT: Duration = Duration::from_secs(10);

/// 登录状态指示器的短等待
const LOGIN_INDICATOR_WAIT: Duration = Duration::from_secs(5);

/// 发布后等待页面响应的静置时长（毫秒）
pub(crate) const PUBLISH_SETTLE_MS: u64 = 2000;

/// 平台适配器契约
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform_id(&self) -> PlatformId;

    fn platform_name(&self) -> &'static str;

    /// 登录页地址
    fn login_url(&self) -> &'static str;

    /// 发布页（或已登录后台首页）地址
    fn publish_url(&self) -> &'static str;

    fn login_selectors(&self) -> LoginSelectors;

    fn publish_selectors(&self) -> PublishSelectors;

    /// 检查当前页面的登录状态
    ///
    /// 只读取页面，不做任何导航。调用方负责先把页面带到平台域内。
    async fn check_login_status(&self, dom: &dyn Dom) -> AppResult<bool> {
        let url = dom.current_url().await.unwrap_or_default();
        if LOGIN_URL_MARKERS.iter().any(|marker| url.contains(marker)) {
            debug!("{} 被重定向到登录页: {}", self.platform_name(), url);
            return Ok(false);
        }
        match self.login_selectors().success_indicator {
            Some(indicator) => dom.wait_for_selector(indicator, LOGIN_INDICATOR_WAIT).await,
            // 平台没有稳定指示器时，以未跳转登录页为准
            None => Ok(true),
        }
    }

    /// 执行登录，返回是否已登录
    ///
    /// Cookie 优先；有账号密码则走表单兜底；都没有返回 `Ok(false)`，
    /// 等待用户在浏览器里手动登录。
    async fn perform_login(&self, dom: &dyn Dom, credentials: &Credentials) -> AppResult<bool> {
        if credentials.has_cookies() {
            info!("🍪 {} 使用 Cookie 登录", self.platform_name());
            dom.set_cookies(&credentials.cookies).await?;
            dom.goto(self.publish_url()).await?;
            dom.settle(PUBLISH_SETTLE_MS).await;
            return self.check_login_status(dom).await;
        }
        if !credentials.username.is_empty() && !credentials.password.is_empty() {
            info!("🔑 {} 使用账号密码登录", self.platform_name());
            let selectors = self.login_selectors();
            dom.goto(self.login_url()).await?;
            dom.type_text(selectors.username_input, &credentials.username)
                .await?;
            dom.type_text(selectors.password_input, &credentials.password)
                .await?;
            dom.click(selectors.submit_button).await?;
            dom.settle(PUBLISH_SETTLE_MS).await;
            return self.check_login_status(dom).await;
        }
        info!("⏳ {} 无可用凭证，需要手动登录", self.platform_name());
        Ok(false)
    }

    /// 在发布页上完成一次发布动作
    ///
    /// 调用前页面已处于 `publish_url`，登录状态已确认。
    async fn perform_publish(
        &self,
        dom: &dyn Dom,
        article: &Article,
        config: &PublishConfig,
    ) -> AppResult<()> {
        let selectors = self.publish_selectors();
        let title = config.title.as_deref().unwrap_or(&article.title);
        let cleaned = clean_article(title, &article.content);

        info!("📝 {} 填写标题: {}", self.platform_name(), title);
        dom.type_text(selectors.title_input, title).await?;

        info!("📄 {} 注入正文", self.platform_name());
        dom.set_editor_html(selectors.content_editor, &cleaned.html)
            .await?;

        if let (Some(tags_input), false) = (selectors.tags_input, config.tags.is_empty()) {
            dom.type_text(tags_input, &config.tags.join(",")).await?;
        }

        if let Some(upload) = selectors.cover_image_upload {
            let cover = config
                .cover_image
                .as_deref()
                .or_else(|| article.images.first().map(String::as_str));
            if let Some(path) = cover {
                info!("🖼️ {} 上传封面: {}", self.platform_name(), path);
                dom.upload_file(upload, path).await?;
                dom.settle(PUBLISH_SETTLE_MS).await;
            }
        }

        dom.settle(PUBLISH_SETTLE_MS).await;
        info!("🚀 {} 点击发布", self.platform_name());
        dom.click(selectors.publish_button).await?;
        dom.settle(PUBLISH_SETTLE_MS).await;
        Ok(())
    }

    /// 确认发布结果
    async fn verify_publish_success(&self, dom: &dyn Dom) -> AppResult<bool> {
        match self.publish_selectors().success_indicator {
            Some(indicator) => {
                if dom.wait_for_selector(indicator, INDICATOR_WAIT).await? {
                    return Ok(true);
                }
                // 指示器未出现但也没回到登录页时按成功处理，避免重复发布
                let url = dom.current_url().await.unwrap_or_default();
                if LOGIN_URL_MARKERS.iter().any(|marker| url.contains(marker)) {
                    return Ok(false);
                }
                warn!(
                    "⚠️ {} 未检测到成功指示器，按成功处理",
                    self.platform_name()
                );
                Ok(true)
            }
            None => Ok(true),
        }
    }
}

/// 适配器注册表
pub struct AdapterRegistry {
    adapters: HashMap<PlatformId, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        let id = adapter.platform_id();
        if self.adapters.insert(id, adapter).is_some() {
            warn!("⚠️ 平台适配器被重复注册，已覆盖: {}", id);
        }
    }

    /// 按平台查找适配器，未注册时报出具名错误并列出已注册的平台
    pub fn get(&self, platform_id: PlatformId) -> AppResult<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform_id).cloned().ok_or_else(|| {
            let mut registered: Vec<&str> =
                self.adapters.keys().map(|id| id.as_str()).collect();
            registered.sort_unstable();
            AppError::NotFound(format!(
                "平台 {} 未注册适配器（已注册: {}）",
                platform_id,
                registered.join(", ")
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 注册全部内置平台适配器
pub fn builtin_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(xiaohongshu::XiaohongshuAdapter));
    registry.register(Arc::new(douyin::DouyinAdapter));
    registry.register(Arc::new(toutiao::ToutiaoAdapter));
    registry.register(Arc::new(sohu::SohuAdapter));
    registry.register(Arc::new(wangyi::WangyiAdapter));
    registry.register(Arc::new(baijiahao::BaijiahaoAdapter));
    registry.register(Arc::new(zhihu::ZhihuAdapter));
    registry.register(Arc::new(csdn::CsdnAdapter));
    registry.register(Arc::new(jianshu::JianshuAdapter));
    registry.register(Arc::new(wechat::WechatAdapter));
    registry.register(Arc::new(qie::QieAdapter));
    registry.register(Arc::new(bilibili::BilibiliAdapter));
    info!("📦 已注册 {} 个平台适配器", registry.len());
    registry
}
