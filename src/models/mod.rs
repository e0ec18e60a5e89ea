//! 数据模型
//!
//! - `platform` - 平台标识（封闭集合）
//! - `task` - 发布任务记录与状态机
//! - `quota` - 配额预留与检查结果
//! - `article` - 文章 / 账号 / 登录会话（外部协作方持有的形状）

pub mod article;
pub mod platform;
pub mod quota;
pub mod task;

pub use article::{Account, Article, Cookie, Credentials, LoginSession, PublishConfig};
pub use platform::PlatformId;
pub use quota::{QuotaCheck, QuotaReservation, QuotaType, ReservationStatus};
pub use task::{
    BatchSummary, ErrorKind, LogLevel, NewTask, PublishingTask, TaskLog, TaskStatus,
};
