//! 抖音创作者平台
//!
//! 登录页挂在 passport 域下，默认的登录页特征检查即可覆盖。

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::models::PlatformId;

pub struct DouyinAdapter;

impl PlatformAdapter for DouyinAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Douyin
    }

    fn platform_name(&self) -> &'static str {
        "抖音"
    }

    fn login_url(&self) -> &'static str {
        "https://creator.douyin.com/passport/web/login"
    }

    fn publish_url(&self) -> &'static str {
        "https://creator.douyin.com/creator-micro/content/upload"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors::default()
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "input[placeholder*=\"添加作品标题\"]",
            content_editor: ".ace-line",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"发布\")",
            success_indicator: Some("text=发布成功"),
        }
    }
}
