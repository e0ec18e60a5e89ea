//! 领域服务：任务存储、配额账本、会话校验、外部协作方

pub mod collaborators;
pub mod quota_ledger;
pub mod session_verifier;
pub mod task_store;

pub use collaborators::{AccountStore, ArticleStore};
pub use quota_ledger::QuotaLedger;
pub use session_verifier::{MonitorHandle, SessionVerifier, StatusCallback};
pub use task_store::{TaskFilter, TaskStore};
