//! 微信公众号
//!
//! 公众号后台只支持扫码登录，没有账号密码表单，
//! 覆写登录流程：有 Cookie 就复用会话，否则只能等用户扫码。

use async_trait::async_trait;
use tracing::info;

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors, PUBLISH_SETTLE_MS};
use crate::error::AppResult;
use crate::infrastructure::Dom;
use crate::models::{Credentials, PlatformId};

pub struct WechatAdapter;

#[async_trait]
impl PlatformAdapter for WechatAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Wechat
    }

    fn platform_name(&self) -> &'static str {
        "微信公众号"
    }

    fn login_url(&self) -> &'static str {
        "https://mp.weixin.qq.com/"
    }

    fn publish_url(&self) -> &'static str {
        "https://mp.weixin.qq.com/"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors {
            success_indicator: Some(".weui-desktop-account__nickname"),
            ..Default::default()
        }
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "#title",
            content_editor: ".ProseMirror",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"发表\")",
            success_indicator: Some("text=发表成功"),
        }
    }

    async fn perform_login(&self, dom: &dyn Dom, credentials: &Credentials) -> AppResult<bool> {
        if credentials.has_cookies() {
            info!("🍪 微信公众号使用 Cookie 登录");
            dom.set_cookies(&credentials.cookies).await?;
            dom.goto(self.publish_url()).await?;
            dom.settle(PUBLISH_SETTLE_MS).await;
            return self.check_login_status(dom).await;
        }
        info!("⏳ 微信公众号仅支持扫码，等待手动登录");
        Ok(false)
    }
}
