//! 简书

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::models::PlatformId;

pub struct JianshuAdapter;

impl PlatformAdapter for JianshuAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Jianshu
    }

    fn platform_name(&self) -> &'static str {
        "简书"
    }

    fn login_url(&self) -> &'static str {
        "https://www.jianshu.com/sign_in"
    }

    fn publish_url(&self) -> &'static str {
        "https://www.jianshu.com/writer"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors {
            success_indicator: Some(".avatar>img"),
            ..Default::default()
        }
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "input[placeholder*=\"标题\"]",
            content_editor: ".ProseMirror",
            tags_input: None,
            cover_image_upload: None,
            publish_button: "button:has-text(\"发布文章\")",
            success_indicator: Some("text=发布成功"),
        }
    }
}
