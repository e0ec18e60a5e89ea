//! 搜狐号
//!
//! 搜狐未登录时会重定向到带 clientAuth 参数的认证页，
//! 登录后顶栏有稳定的用户名/头像元素，覆写登录检查以双重确认。

use async_trait::async_trait;
use tracing::debug;

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::error::AppResult;
use crate::infrastructure::Dom;
use crate::models::PlatformId;

pub struct SohuAdapter;

#[async_trait]
impl PlatformAdapter for SohuAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Sohu
    }

    fn platform_name(&self) -> &'static str {
        "搜狐号"
    }

    fn login_url(&self) -> &'static str {
        "https://mp.sohu.com/mpfe/v4/login"
    }

    fn publish_url(&self) -> &'static str {
        "https://mp.sohu.com/mpfe/v3/main/index"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors {
            success_indicator: Some("text=发布内容"),
            ..Default::default()
        }
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "input[placeholder*=\"请输入标题\"]",
            content_editor: ".ql-editor",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"发布\")",
            success_indicator: Some("text=发布成功"),
        }
    }

    async fn check_login_status(&self, dom: &dyn Dom) -> AppResult<bool> {
        let url = dom.current_url().await.unwrap_or_default();
        if url.contains("/login") || url.contains("clientAuth") {
            debug!("搜狐号被重定向到认证页: {}", url);
            return Ok(false);
        }
        Ok(dom.is_visible(".user-name").await || dom.is_visible(".user-pic").await)
    }
}
