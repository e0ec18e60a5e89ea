//! 企鹅号（腾讯内容开放平台）

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::models::PlatformId;

pub struct QieAdapter;

impl PlatformAdapter for QieAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Qie
    }

    fn platform_name(&self) -> &'static str {
        "企鹅号"
    }

    fn login_url(&self) -> &'static str {
        "https://om.qq.com/userAuth/index"
    }

    fn publish_url(&self) -> &'static str {
        "https://om.qq.com/main/creation/article"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors {
            success_indicator: Some("span.usernameText-cls2j9OE"),
            ..Default::default()
        }
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: ".omui-inputautogrowing__inner",
            content_editor: ".ProseMirror",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"发布\")",
            success_indicator: Some("text=发布成功"),
        }
    }
}
