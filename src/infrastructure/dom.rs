//! 页面操作能力
//!
//! `CdpDom` 是 `Dom` 的 CDP 实现，唯一持有 `Page`。
//! 适配器与会话校验器只依赖 `Dom` 这个能力接口，
//! 不认识任务也不处理业务流程。
//!
//! 选择器约定：平台脚本沿用 `text=...` 与 `css:has-text("...")`
//! 两种文本定位写法，由本层翻译成 JS 扫描执行；其余为标准 CSS。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::{Browser, Page};
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::Cookie;

/// 元素轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 页面操作能力接口
#[async_trait]
pub trait Dom: Send + Sync {
    /// 导航到指定 URL（有界等待）
    async fn goto(&self, url: &str) -> AppResult<()>;

    /// 当前页面 URL
    async fn current_url(&self) -> AppResult<String>;

    /// 刷新页面（设置 Cookie 后使其生效）
    async fn reload(&self) -> AppResult<()>;

    /// 写入登录 Cookie
    async fn set_cookies(&self, cookies: &[Cookie]) -> AppResult<()>;

    /// 在限时内等待元素出现，返回是否出现（不出现不算错误）
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> AppResult<bool>;

    /// 短时检查元素是否可见（检查失败一律视为不可见）
    async fn is_visible(&self, selector: &str) -> bool;

    /// 等待元素出现并点击（等不到视为超时错误）
    async fn click(&self, selector: &str) -> AppResult<()>;

    /// 等待输入框出现并输入文本（先清空已有内容）
    async fn type_text(&self, selector: &str, text: &str) -> AppResult<()>;

    /// 通过 DOM 直接设置富文本编辑器内容，并触发 input/change 事件
    async fn set_editor_html(&self, selector: &str, html: &str) -> AppResult<()>;

    /// 向文件选择框注入本地文件
    async fn upload_file(&self, selector: &str, path: &str) -> AppResult<()>;

    /// 在限时内等待页面出现指定文本
    async fn contains_text(&self, text: &str, timeout: Duration) -> AppResult<bool>;

    /// 页面静置（等待前端渲染/跳转稳定）
    async fn settle(&self, ms: u64);
}

/// 文本定位翻译结果
enum Target {
    Css(String),
    /// 在 base 选择器命中的元素里按文本过滤
    Text { base: String, text: String },
}

fn parse_target(selector: &str) -> Target {
    if let Some(text) = selector.strip_prefix("text=") {
        return Target::Text {
            base: "*".to_string(),
            text: text.to_string(),
        };
    }
    if let Some(idx) = selector.find(":has-text(") {
        let base = selector[..idx].to_string();
        let text = selector[idx + ":has-text(".len()..]
            .trim_end_matches(')')
            .trim_matches('"')
            .to_string();
        return Target::Text { base, text };
    }
    Target::Css(selector.to_string())
}

/// `Dom` 的 CDP 实现
pub struct CdpDom {
    page: Page,
    navigation_timeout: Duration,
    selector_timeout: Duration,
}

impl CdpDom {
    pub fn new(page: Page, navigation_timeout_secs: u64, selector_timeout_secs: u64) -> Self {
        Self {
            page,
            navigation_timeout: Duration::from_secs(navigation_timeout_secs),
            selector_timeout: Duration::from_secs(selector_timeout_secs),
        }
    }

    /// 获取底层 page 的引用（集成测试使用）
    pub fn page(&self) -> &Page {
        &self.page
    }

    fn timeout_error(&self, operation: impl Into<String>, limit: Duration) -> AppError {
        AppError::Timeout {
            operation: operation.into(),
            secs: limit.as_secs(),
        }
    }

    /// 按文本过滤元素的 JS 片段，action 为 "exists" 或 "click"
    fn text_target_js(base: &str, text: &str, action: &str) -> AppResult<String> {
        let base_json = serde_json::to_string(base)?;
        let text_json = serde_json::to_string(text)?;
        let action_json = serde_json::to_string(action)?;
        Ok(format!(
            r#"(() => {{
                const matches = Array.from(document.querySelectorAll({base_json}))
                    .filter(el => el.innerText && el.innerText.trim().includes({text_json}));
                if (matches.length === 0) return false;
                if ({action_json} === 'click') matches[0].click();
                return true;
            }})()"#
        ))
    }

    async fn eval_bool(&self, js: String) -> AppResult<bool> {
        let value: bool = self
            .page
            .evaluate(js)
            .await?
            .into_value()
            .unwrap_or(false);
        Ok(value)
    }

    /// 目标是否存在（单次检查）
    async fn target_exists(&self, target: &Target) -> AppResult<bool> {
        match target {
            Target::Css(css) => Ok(self.page.find_element(css.as_str()).await.is_ok()),
            Target::Text { base, text } => {
                let js = Self::text_target_js(base, text, "exists")?;
                self.eval_bool(js).await
            }
        }
    }

    /// 在限时内轮询目标是否出现
    async fn wait_for_target(&self, target: &Target, limit: Duration) -> AppResult<bool> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if self.target_exists(target).await.unwrap_or(false) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// 在限时内反复查找 CSS 元素
    async fn find_css_within(
        &self,
        css: &str,
        limit: Duration,
    ) -> AppResult<Option<chromiumoxide::element::Element>> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if let Ok(element) = self.page.find_element(css).await {
                return Ok(Some(element));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Dom for CdpDom {
    async fn goto(&self, url: &str) -> AppResult<()> {
        debug!("导航到: {}", url);
        timeout(self.navigation_timeout, async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, AppError>(())
        })
        .await
        .map_err(|_| self.timeout_error(format!("导航到 {}", url), self.navigation_timeout))??;
        Ok(())
    }

    async fn current_url(&self) -> AppResult<String> {
        let url = self.page.url().await?;
        Ok(url.unwrap_or_default())
    }

    async fn reload(&self) -> AppResult<()> {
        timeout(self.navigation_timeout, async {
            self.page.reload().await?;
            Ok::<_, AppError>(())
        })
        .await
        .map_err(|_| self.timeout_error("刷新页面", self.navigation_timeout))??;
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> AppResult<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let param = CookieParam::builder()
                .name(&cookie.name)
                .value(&cookie.value)
                .domain(&cookie.domain)
                .path(&cookie.path)
                .build()
                .map_err(AppError::Browser)?;
            params.push(param);
        }
        debug!("设置 {} 个 Cookie", params.len());
        self.page.set_cookies(params).await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, limit: Duration) -> AppResult<bool> {
        let target = parse_target(selector);
        self.wait_for_target(&target, limit).await
    }

    async fn is_visible(&self, selector: &str) -> bool {
        let target = parse_target(selector);
        self.wait_for_target(&target, Duration::from_secs(3))
            .await
            .unwrap_or(false)
    }

    async fn click(&self, selector: &str) -> AppResult<()> {
        match parse_target(selector) {
            Target::Css(css) => {
                let element = self
                    .find_css_within(&css, self.selector_timeout)
                    .await?
                    .ok_or_else(|| {
                        self.timeout_error(format!("等待元素 {}", selector), self.selector_timeout)
                    })?;
                element.click().await?;
            }
            target @ Target::Text { .. } => {
                if !self.wait_for_target(&target, self.selector_timeout).await? {
                    return Err(
                        self.timeout_error(format!("等待元素 {}", selector), self.selector_timeout)
                    );
                }
                if let Target::Text { base, text } = &target {
                    let js = Self::text_target_js(base, text, "click")?;
                    self.eval_bool(js).await?;
                }
            }
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> AppResult<()> {
        let element = self
            .find_css_within(selector, self.selector_timeout)
            .await?
            .ok_or_else(|| {
                self.timeout_error(format!("等待输入框 {}", selector), self.selector_timeout)
            })?;
        element.click().await?;
        // 清空已有内容后再输入
        let escaped = serde_json::to_string(selector)?;
        let js = format!(
            "(() => {{ const el = document.querySelector({escaped}); if (el && 'value' in el) el.value = ''; }})()"
        );
        self.page.evaluate(js).await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn set_editor_html(&self, selector: &str, html: &str) -> AppResult<()> {
        let selector_json = serde_json::to_string(selector)?;
        let html_json = serde_json::to_string(html)?;
        // 直接设置 innerHTML 并触发事件，让编辑器感知内容变化
        let js = format!(
            r#"(() => {{
                const editor = document.querySelector({selector_json});
                if (!editor) return false;
                editor.innerHTML = {html_json};
                editor.dispatchEvent(new Event('input', {{ bubbles: true }}));
                editor.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#
        );
        let ok = self.eval_bool(js).await?;
        if !ok {
            return Err(AppError::Automation(format!(
                "编辑器元素不存在: {}",
                selector
            )));
        }
        Ok(())
    }

    async fn upload_file(&self, selector: &str, path: &str) -> AppResult<()> {
        let element = self
            .find_css_within(selector, self.selector_timeout)
            .await?
            .ok_or_else(|| {
                self.timeout_error(
                    format!("等待文件选择框 {}", selector),
                    self.selector_timeout,
                )
            })?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![path.to_string()])
            .node_id(element.node_id)
            .build()
            .map_err(AppError::Browser)?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn contains_text(&self, text: &str, limit: Duration) -> AppResult<bool> {
        let text_json = serde_json::to_string(text)?;
        let js =
            format!("document.body ? document.body.innerText.includes({text_json}) : false");
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if self.eval_bool(js.clone()).await.unwrap_or(false) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn settle(&self, ms: u64) {
        sleep(Duration::from_millis(ms)).await;
    }
}

/// 按需开启新页面的能力（执行器为每个任务开一个页面）
#[async_trait]
pub trait DomProvider: Send + Sync {
    async fn open(&self) -> AppResult<Arc<dyn Dom>>;
}

/// 持有 `Browser` 的 `DomProvider` 实现
pub struct CdpBrowser {
    browser: Browser,
    navigation_timeout_secs: u64,
    selector_timeout_secs: u64,
}

impl CdpBrowser {
    pub fn new(browser: Browser, navigation_timeout_secs: u64, selector_timeout_secs: u64) -> Self {
        Self {
            browser,
            navigation_timeout_secs,
            selector_timeout_secs,
        }
    }
}

#[async_trait]
impl DomProvider for CdpBrowser {
    async fn open(&self) -> AppResult<Arc<dyn Dom>> {
        let page = self.browser.new_page("about:blank").await?;
        Ok(Arc::new(CdpDom::new(
            page,
            self.navigation_timeout_secs,
            self.selector_timeout_secs,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_prefix() {
        match parse_target("text=发布成功") {
            Target::Text { base, text } => {
                assert_eq!(base, "*");
                assert_eq!(text, "发布成功");
            }
            _ => panic!("应解析为文本定位"),
        }
    }

    #[test]
    fn test_parse_has_text() {
        match parse_target("button:has-text(\"登录\")") {
            Target::Text { base, text } => {
                assert_eq!(base, "button");
                assert_eq!(text, "登录");
            }
            _ => panic!("应解析为文本定位"),
        }
    }

    #[test]
    fn test_parse_plain_css() {
        match parse_target(".ql-editor") {
            Target::Css(css) => assert_eq!(css, ".ql-editor"),
            _ => panic!("应解析为 CSS 定位"),
        }
    }
}
