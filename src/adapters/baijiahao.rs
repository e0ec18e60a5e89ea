//! 百家号
//!
//! 登录成功指示器是构建产物里的哈希类名，百度改版后需要同步更新。

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::models::PlatformId;

pub struct BaijiahaoAdapter;

impl PlatformAdapter for BaijiahaoAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Baijiahao
    }

    fn platform_name(&self) -> &'static str {
        "百家号"
    }

    fn login_url(&self) -> &'static str {
        "https://baijiahao.baidu.com/builder/rc/login"
    }

    fn publish_url(&self) -> &'static str {
        "https://baijiahao.baidu.com/builder/rc/home"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors {
            success_indicator: Some(".UjPPKm89R4RrZTKhwG5H"),
            ..Default::default()
        }
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "textarea[placeholder*=\"请输入标题\"]",
            content_editor: ".ProseMirror",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"发布\")",
            success_indicator: Some("text=发布成功"),
        }
    }
}
