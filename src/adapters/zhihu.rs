//! 知乎专栏
//!
//! 专栏编辑器基于 Draft.js，直接改 innerHTML 会被编辑器状态覆盖，
//! 所以覆写发布流程改为逐字输入正文；发布成功后会跳到 `/p/文章id`，
//! 结果确认同时认 URL 和成功面板。

use async_trait::async_trait;
use tracing::info;

use crate::adapters::{clean_article, LoginSelectors, PlatformAdapter, PublishSelectors};
use crate::error::AppResult;
use crate::infrastructure::Dom;
use crate::models::{Article, PlatformId, PublishConfig};

const SETTLE_MS: u64 = 2000;

pub struct ZhihuAdapter;

#[async_trait]
impl PlatformAdapter for ZhihuAdapter {
    fn platform_id(&self) -> PlatformId {
        PlatformId::Zhihu
    }

    fn platform_name(&self) -> &'static str {
        "知乎"
    }

    fn login_url(&self) -> &'static str {
        "https://www.zhihu.com/signin"
    }

    fn publish_url(&self) -> &'static str {
        "https://zhuanlan.zhihu.com/write"
    }

    fn login_selectors(&self) -> LoginSelectors {
        LoginSelectors {
            username_input: "input[name=\"username\"]",
            password_input: "input[name=\"password\"]",
            submit_button: "button[type=\"submit\"]",
            success_indicator: Some(".Avatar"),
        }
    }

    fn publish_selectors(&self) -> PublishSelectors {
        PublishSelectors {
            title_input: "input[placeholder=\"请输入标题\"]",
            content_editor: ".public-DraftEditor-content",
            tags_input: None,
            cover_image_upload: Some("input[type=\"file\"]"),
            publish_button: "button:has-text(\"发布\")",
            success_indicator: Some(".SuccessPanel"),
        }
    }

    async fn perform_publish(
        &self,
        dom: &dyn Dom,
        article: &Article,
        config: &PublishConfig,
    ) -> AppResult<()> {
        let selectors = self.publish_selectors();
        let title = config.title.as_deref().unwrap_or(&article.title);
        let cleaned = clean_article(title, &article.content);

        info!("📝 知乎填写标题: {}", title);
        dom.type_text(selectors.title_input, title).await?;

        info!("📄 知乎逐段输入正文");
        dom.click(selectors.content_editor).await?;
        dom.type_text(selectors.content_editor, &cleaned.text).await?;
        dom.settle(SETTLE_MS).await;

        if let Some(upload) = selectors.cover_image_upload {
            if let Some(image) = article.images.first() {
                if dom.is_visible(upload).await {
                    info!("🖼️ 知乎插入配图: {}", image);
                    dom.upload_file(upload, image).await?;
                    dom.settle(SETTLE_MS).await;
                }
            }
        }

        info!("🚀 知乎发起发布");
        dom.click(selectors.publish_button).await?;
        dom.settle(SETTLE_MS).await;
        // 发布面板需要二次确认
        if dom.is_visible("button.PublishPanel-stepTwoButton").await {
            dom.click("button.PublishPanel-stepTwoButton").await?;
            dom.settle(SETTLE_MS).await;
        }
        Ok(())
    }

    async fn verify_publish_success(&self, dom: &dyn Dom) -> AppResult<bool> {
        let url = dom.current_url().await.unwrap_or_default();
        if url.contains("/p/") {
            return Ok(true);
        }
        dom.wait_for_selector(".SuccessPanel", std::time::Duration::from_secs(10))
            .await
    }
}
