//! 哔哩哔哩专栏

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::models::PlatformId;

pub struct BilibiliAdapter;

impl PlatformAdapter for BilibiliAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Bilibili
    }

    fn platform_name(&self) -> &'static str {
        "哔哩哔哩"
    }

    fn login_url(&self) -> &'static str {
        "https://passport.bilibili.com/login"
    }

    fn publish_url(&self) -> &'static str {
        "https://member.bilibili.com/read/editor/#/web"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors {
            success_indicator: Some("span.right-entry-text"),
            ..Default::default()
        }
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "textarea[placeholder*=\"请输入标题\"]",
            content_editor: ".ql-editor",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"提交\")",
            success_indicator: Some("text=发布成功"),
        }
    }
}
