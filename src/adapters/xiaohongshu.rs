//! 小红书创作者平台

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::models::PlatformId;

pub struct XiaohongshuAdapter;

impl PlatformAdapter for XiaohongshuAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Xiaohongshu
    }

    fn platform_name(&self) -> &'static str {
        "小红书"
    }

    fn login_url(&self) -> &'static str {
        "https://creator.xiaohongshu.com/login"
    }

    fn publish_url(&self) -> &'static str {
        "https://creator.xiaohongshu.com/publish/publish"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors {
            success_indicator: Some("text=发布笔记"),
            ..Default::default()
        }
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "input[placeholder*=\"填写标题\"]",
            content_editor: ".ql-editor",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"发布\")",
            success_indicator: Some("text=发布成功"),
        }
    }
}
