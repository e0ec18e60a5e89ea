//! CSDN 博客

use crate::adapters::{LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::models::PlatformId;

pub struct CsdnAdapter;

impl PlatformAdapter for CsdnAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Csdn
    }

    fn platform_name(&self) -> &'static str {
        "CSDN"
    }

    fn login_url(&self) -> &'static str {
        "https://passport.csdn.net/v1/register/pc/login"
    }

    fn publish_url(&self) -> &'static str {
        "https://mp.csdn.net/mp_blog/creation/editor"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors {
            success_indicator: Some(".hasAvatar"),
            ..Default::default()
        }
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "input[placeholder*=\"请输入文章标题\"]",
            content_editor: ".editor__inner",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"发布文章\")",
            success_indicator: Some("text=发布成功"),
        }
    }
}
