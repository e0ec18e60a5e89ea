//! 今日头条号

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::models::PlatformId;

pub struct ToutiaoAdapter;

impl PlatformAdapter for ToutiaoAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Toutiao
    }

    fn platform_name(&self) -> &'static str {
        "今日头条"
    }

    fn login_url(&self) -> &'static str {
        "https://mp.toutiao.com/auth/page/login"
    }

    fn publish_url(&self) -> &'static str {
        "https://mp.toutiao.com/profile_v4/graphic/publish"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors::default()
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "input[placeholder*=\"请输入文章标题\"]",
            content_editor: ".ProseMirror",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"预览并发布\")",
            success_indicator: Some("text=发布成功"),
        }
    }
}
