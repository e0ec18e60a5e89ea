//! 网易号

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::models::PlatformId;

pub struct WangyiAdapter;

impl PlatformAdapter for WangyiAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Wangyi
    }

    fn platform_name(&self) -> &'static str {
        "网易号"
    }

    fn login_url(&self) -> &'static str {
        "https://mp.163.com/login.html"
    }

    fn publish_url(&self) -> &'static str {
        "https://mp.163.com/subscribe_v4/index.html#/"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors {
            success_indicator: Some(".topBar__user"),
            ..Default::default()
        }
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "input[placeholder*=\"请输入标题\"]",
            content_editor: ".ProseMirror",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"发布\")",
            success_indicator: Some("text=发布成功"),
        }
    }
}
