//! 测试用的 Dom 假实现
//!
//! 用脚本化的页面状态驱动适配器 / 会话校验器 / 执行流程的单元测试，
//! 不需要真实浏览器。`permissive` 模式下所有元素可见、所有文本存在，
//! 用于走通成功路径；各测试再按需打开具体的失败开关。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::infrastructure::dom::Dom;
use crate::models::Cookie;

#[derive(Default)]
struct FakeState {
    url: String,
    /// goto 之后强制跳转到的地址（模拟被重定向到登录页）
    redirect_to: Option<String>,
    visible: HashSet<String>,
    texts: HashSet<String>,
    fail_goto: bool,
    fail_clicks: HashSet<String>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    editor_html: Vec<(String, String)>,
    uploads: Vec<(String, String)>,
    cookie_calls: usize,
}

/// 脚本化的假页面
pub struct FakeDom {
    permissive: bool,
    state: Mutex<FakeState>,
}

impl FakeDom {
    /// 一切顺利的页面：元素全部可见、文本全部存在
    pub fn permissive() -> Arc<Self> {
        Arc::new(Self {
            permissive: true,
            state: Mutex::new(FakeState::default()),
        })
    }

    /// 空白页面：没有任何元素可见
    pub fn blank() -> Arc<Self> {
        Arc::new(Self {
            permissive: false,
            state: Mutex::new(FakeState::default()),
        })
    }

    pub fn set_redirect(&self, to: impl Into<String>) {
        self.state.lock().unwrap().redirect_to = Some(to.into());
    }

    pub fn show(&self, selector: impl Into<String>) {
        self.state.lock().unwrap().visible.insert(selector.into());
    }

    pub fn add_text(&self, text: impl Into<String>) {
        self.state.lock().unwrap().texts.insert(text.into());
    }

    pub fn set_fail_goto(&self, fail: bool) {
        self.state.lock().unwrap().fail_goto = fail;
    }

    /// 让点击指定元素时失败（模拟发布按钮点击报错）
    pub fn fail_click(&self, selector: impl Into<String>) {
        self.state.lock().unwrap().fail_clicks.insert(selector.into());
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().typed.clone()
    }

    pub fn editor_html(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().editor_html.clone()
    }

    pub fn uploads(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn cookie_calls(&self) -> usize {
        self.state.lock().unwrap().cookie_calls
    }

    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }
}

#[async_trait]
impl Dom for FakeDom {
    async fn goto(&self, url: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_goto {
            return Err(AppError::Automation(format!("导航到 {} 失败", url)));
        }
        state.url = match &state.redirect_to {
            Some(to) => to.clone(),
            None => url.to_string(),
        };
        Ok(())
    }

    async fn current_url(&self) -> AppResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn reload(&self) -> AppResult<()> {
        Ok(())
    }

    async fn set_cookies(&self, _cookies: &[Cookie]) -> AppResult<()> {
        self.state.lock().unwrap().cookie_calls += 1;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> AppResult<bool> {
        Ok(self.permissive || self.state.lock().unwrap().visible.contains(selector))
    }

    async fn is_visible(&self, selector: &str) -> bool {
        self.permissive || self.state.lock().unwrap().visible.contains(selector)
    }

    async fn click(&self, selector: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_clicks.contains(selector) {
            return Err(AppError::Automation(format!("点击 {} 失败", selector)));
        }
        if !self.permissive && !state.visible.contains(selector) {
            return Err(AppError::Timeout {
                operation: format!("等待元素 {}", selector),
                secs: 10,
            });
        }
        state.clicks.push(selector.to_string());
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if !self.permissive && !state.visible.contains(selector) {
            return Err(AppError::Timeout {
                operation: format!("等待输入框 {}", selector),
                secs: 10,
            });
        }
        state.typed.push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn set_editor_html(&self, selector: &str, html: &str) -> AppResult<()> {
        self.state
            .lock()
            .unwrap()
            .editor_html
            .push((selector.to_string(), html.to_string()));
        Ok(())
    }

    async fn upload_file(&self, selector: &str, path: &str) -> AppResult<()> {
        self.state
            .lock()
            .unwrap()
            .uploads
            .push((selector.to_string(), path.to_string()));
        Ok(())
    }

    async fn contains_text(&self, text: &str, _timeout: Duration) -> AppResult<bool> {
        Ok(self.permissive || self.state.lock().unwrap().texts.contains(text))
    }

    async fn settle(&self, _ms: u64) {
        // 测试中不做真实等待
    }
}
