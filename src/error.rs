//! 应用程序错误类型
//!
//! 错误分类原则：
//! - 校验/权限错误在任何状态变更之前就被拒绝
//! - 配额不足与会话失效是可区分的错误，调用方可以据此提示
//!   "升级套餐" 或 "重新登录"，而不是盲目重试
//! - 超时错误归入自动化失败，绝不允许挂起进程

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 请求参数校验失败（发生在任何状态变更之前）
    #[error("参数校验失败: {0}")]
    Validation(String),

    /// 资源不属于当前租户
    #[error("无权访问: {0}")]
    Authorization(String),

    /// 资源不存在
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// 配额不足（任务创建前拒绝，可区分于执行失败）
    #[error("配额不足 ({quota_type}): 剩余 {remaining}/{limit}")]
    QuotaExhausted {
        quota_type: String,
        remaining: i64,
        limit: i64,
    },

    /// 登录会话已失效（发布动作尚未执行，提示重新登录）
    #[error("登录会话已失效 ({platform})，请重新登录")]
    SessionExpired { platform: String },

    /// 自动化操作失败（发布或结果校验过程中的任何一步）
    #[error("自动化操作失败: {0}")]
    Automation(String),

    /// 有界等待超时（计入自动化失败，带可读的操作描述）
    #[error("操作超时: {operation} (上限 {secs} 秒)")]
    Timeout { operation: String, secs: u64 },

    /// 非法的任务状态流转
    #[error("非法状态流转: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// 浏览器协议层错误
    #[error("浏览器错误: {0}")]
    Browser(String),

    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON解析失败: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(format!("IO错误: {}", err))
    }
}

impl AppError {
    /// 是否应计入任务重试次数（只有执行期的自动化/超时失败才重试）
    pub fn counts_toward_retry(&self) -> bool {
        matches!(
            self,
            AppError::Automation(_) | AppError::Timeout { .. } | AppError::Browser(_)
        )
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
