//! 文章库与账号库
//!
//! 发布引擎的外部协作方。引擎只读取它们的数据，
//! 所有访问都带租户归属校验：存在但不属于该租户按无权访问报错，
//! 不泄露资源是否存在之外的信息。

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::models::{Account, Article};

pub struct ArticleStore {
    articles: Mutex<HashMap<i64, Article>>,
}

impl ArticleStore {
    pub fn new() -> Self {
        Self {
            articles: Mutex::new(HashMap::new()),
        }
    }

    pub async fn upsert(&self, article: Article) {
        let mut articles = self.articles.lock().await;
        articles.insert(article.id, article);
    }

    pub async fn get_for_tenant(&self, id: i64, tenant_id: i64) -> AppResult<Article> {
        let articles = self.articles.lock().await;
        let article = articles
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("文章 {}", id)))?;
        if article.tenant_id != tenant_id {
            return Err(AppError::Authorization(format!("文章 {}", id)));
        }
        Ok(article.clone())
    }
}

impl Default for ArticleStore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AccountStore {
    accounts: Mutex<HashMap<i64, Account>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
        }
    }

    pub async fn upsert(&self, account: Account) {
        let mut accounts = self.accounts.lock().await;
        accounts.insert(account.id, account);
    }

    pub async fn get_for_tenant(&self, id: i64, tenant_id: i64) -> AppResult<Account> {
        let accounts = self.accounts.lock().await;
        let account = accounts
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("账号 {}", id)))?;
        if account.tenant_id != tenant_id {
            return Err(AppError::Authorization(format!("账号 {}", id)));
        }
        Ok(account.clone())
    }

    /// 回写会话校验痕迹
    pub async fn record_session_check(&self, id: i64, status: bool) {
        let mut accounts = self.accounts.lock().await;
        if let Some(account) = accounts.get_mut(&id) {
            account.session.last_verified_at = Some(chrono::Utc::now());
            account.session.last_status = Some(status);
        }
    }
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credentials, LoginSession, PlatformId};

    fn account(id: i64, tenant_id: i64) -> Account {
        Account {
            id,
            tenant_id,
            platform_id: PlatformId::Zhihu,
            account_name: "测试账号".to_string(),
            credentials: Credentials::default(),
            session: LoginSession::default(),
        }
    }

    #[tokio::test]
    async fn test_wrong_tenant_is_authorization_error() {
        let store = AccountStore::new();
        store.upsert(account(1, 10)).await;
        assert!(store.get_for_tenant(1, 10).await.is_ok());
        assert!(matches!(
            store.get_for_tenant(1, 11).await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            store.get_for_tenant(2, 10).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_session_check_recorded() {
        let store = AccountStore::new();
        store.upsert(account(1, 10)).await;
        store.record_session_check(1, true).await;
        let account = store.get_for_tenant(1, 10).await.unwrap();
        assert_eq!(account.session.last_status, Some(true));
        assert!(account.session.last_verified_at.is_some());
    }
}
