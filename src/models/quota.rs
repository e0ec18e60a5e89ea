//! 配额模型
//!
//! 预扣减 + 确认/释放机制，防止并发创建任务时超卖配额：
//!
//! 1. 创建任务前发起预扣减 (reserve)，账本锁定配额并返回 reservation_id
//! 2. 发布成功后确认 (confirm)，真正扣减用量
//! 3. 失败 / 取消 / 创建中止时释放 (release)，恢复配额
//!
//! 停留在 reserved 超过有效期的预留视为可释放（防泄漏）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// 配额类型到功能代码的映射（与计费侧约定的静态表）
pub static QUOTA_TYPE_TO_FEATURE_CODE: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "publish" => "publish",
    "article_generation" => "article_generation",
    "knowledge_upload" => "knowledge_upload",
    "image_upload" => "image_upload",
};

/// 配额类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaType {
    Publish,
    ArticleGeneration,
    KnowledgeUpload,
    ImageUpload,
}

impl QuotaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaType::Publish => "publish",
            QuotaType::ArticleGeneration => "article_generation",
            QuotaType::KnowledgeUpload => "knowledge_upload",
            QuotaType::ImageUpload => "image_upload",
        }
    }

    /// 计费侧的功能代码
    pub fn feature_code(&self) -> &'static str {
        // 静态表中必然存在，缺失属于编码错误
        QUOTA_TYPE_TO_FEATURE_CODE[self.as_str()]
    }
}

impl std::str::FromStr for QuotaType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(QuotaType::Publish),
            "article_generation" => Ok(QuotaType::ArticleGeneration),
            "knowledge_upload" => Ok(QuotaType::KnowledgeUpload),
            "image_upload" => Ok(QuotaType::ImageUpload),
            _ => Err(AppError::Validation(format!("无效的配额类型: {}", s))),
        }
    }
}

impl std::fmt::Display for QuotaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 配额检查结果
///
/// `limit == -1` 表示无限配额，短路所有基于剩余量的比较。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaCheck {
    pub has_quota: bool,
    pub remaining: i64,
    pub limit: i64,
}

impl QuotaCheck {
    pub const UNLIMITED: i64 = -1;

    pub fn unlimited() -> Self {
        Self {
            has_quota: true,
            remaining: i64::MAX,
            limit: Self::UNLIMITED,
        }
    }
}

/// 预留状态（confirm / release 恰好发生一个）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Reserved,
    Confirmed,
    Released,
    /// 超过有效期被清理（对守恒性而言等同于 released）
    Expired,
}

/// 一笔进行中的配额占用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaReservation {
    pub reservation_id: Uuid,
    pub tenant_id: i64,
    pub quota_type: QuotaType,
    pub amount: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
