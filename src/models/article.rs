//! 文章 / 账号 / 登录会话
//!
//! 这些形状由外部协作方（文章库、账号库）持有，核心只消费：
//! 会话校验器只读取并报告 `LoginSession`，绝不伪造凭证。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::platform::PlatformId;

/// 待发布的文章
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub tenant_id: i64,
    pub title: String,
    /// Markdown 正文（发布前经统一清洗）
    pub content: String,
    pub keyword: Option<String>,
    /// 图片的本地路径
    pub images: Vec<String>,
}

/// 浏览器 Cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// 账号凭证（Cookie 优先，表单为兜底）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
}

impl Credentials {
    pub fn has_cookies(&self) -> bool {
        !self.cookies.is_empty()
    }
}

/// 登录会话的校验痕迹（账号实体所有，校验器只读）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginSession {
    pub last_verified_at: Option<DateTime<Utc>>,
    /// 最近一次校验结果（None 表示从未校验过）
    pub last_status: Option<bool>,
}

/// 平台账号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub tenant_id: i64,
    pub platform_id: PlatformId,
    pub account_name: String,
    pub credentials: Credentials,
    #[serde(default)]
    pub session: LoginSession,
}

/// 发布配置（可覆盖标题、指定分类/标签/封面）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    pub title: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub cover_image: Option<String>,
}
