//! 配额账本
//!
//! 预扣减账本的单进程实现。同一租户的 reserve 经过同一把锁串行化，
//! 检查与登记在锁内一次完成，并发 reserve 不可能把剩余量打穿。
//!
//! 守恒性：任何时刻 `已预留 + 已确认 + 已释放 = 历次 reserve 总量`，
//! 静止时（无 reserved 在途）预留量归零。

use std::collections::HashMap;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{QuotaCheck, QuotaReservation, QuotaType, ReservationStatus};

struct LedgerState {
    /// (租户, 配额类型) -> 配额上限，未配置视为 0，-1 为无限
    limits: HashMap<(i64, QuotaType), i64>,
    /// (租户, 配额类型) -> 已确认用量
    used: HashMap<(i64, QuotaType), i64>,
    reservations: HashMap<Uuid, QuotaReservation>,
}

pub struct QuotaLedger {
    state: Mutex<LedgerState>,
    /// 预留的有效期，到期未确认视为可清理
    reservation_ttl: Duration,
}

impl QuotaLedger {
    pub fn new(reservation_ttl_minutes: i64) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                limits: HashMap::new(),
                used: HashMap::new(),
                reservations: HashMap::new(),
            }),
            reservation_ttl: Duration::minutes(reservation_ttl_minutes),
        }
    }

    pub async fn set_limit(&self, tenant_id: i64, quota_type: QuotaType, limit: i64) {
        let mut state = self.state.lock().await;
        state.limits.insert((tenant_id, quota_type), limit);
    }

    fn active_reserved(state: &LedgerState, tenant_id: i64, quota_type: QuotaType) -> i64 {
        state
            .reservations
            .values()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.quota_type == quota_type
                    && r.status == ReservationStatus::Reserved
            })
            .map(|r| r.amount)
            .sum()
    }

    fn check_inner(state: &LedgerState, tenant_id: i64, quota_type: QuotaType) -> QuotaCheck {
        let limit = state
            .limits
            .get(&(tenant_id, quota_type))
            .copied()
            .unwrap_or(0);
        if limit == QuotaCheck::UNLIMITED {
            return QuotaCheck::unlimited();
        }
        let used = state
            .used
            .get(&(tenant_id, quota_type))
            .copied()
            .unwrap_or(0);
        let reserved = Self::active_reserved(state, tenant_id, quota_type);
        let remaining = (limit - used - reserved).max(0);
        QuotaCheck {
            has_quota: remaining > 0,
            remaining,
            limit,
        }
    }

    /// 只读检查（不锁定配额）
    pub async fn check_quota(&self, tenant_id: i64, quota_type: QuotaType) -> QuotaCheck {
        let state = self.state.lock().await;
        Self::check_inner(&state, tenant_id, quota_type)
    }

    /// 预扣减：检查与登记在同一临界区内完成
    pub async fn reserve(
        &self,
        tenant_id: i64,
        quota_type: QuotaType,
        amount: i64,
    ) -> AppResult<QuotaReservation> {
        if amount <= 0 {
            return Err(AppError::Validation(format!(
                "预留数量必须为正: {}",
                amount
            )));
        }
        let mut state = self.state.lock().await;
        let check = Self::check_inner(&state, tenant_id, quota_type);
        if check.limit != QuotaCheck::UNLIMITED && check.remaining < amount {
            return Err(AppError::QuotaExhausted {
                quota_type: quota_type.to_string(),
                remaining: check.remaining,
                limit: check.limit,
            });
        }
        let now = Utc::now();
        let reservation = QuotaReservation {
            reservation_id: Uuid::new_v4(),
            tenant_id,
            quota_type,
            amount,
            status: ReservationStatus::Reserved,
            created_at: now,
            expires_at: now + self.reservation_ttl,
        };
        debug!(
            "🔒 租户 {} 预留 {} 配额 {} 份: {}",
            tenant_id, quota_type, amount, reservation.reservation_id
        );
        state
            .reservations
            .insert(reservation.reservation_id, reservation.clone());
        Ok(reservation)
    }

    /// 确认预留，真正计入用量。过期的预留拒绝确认。
    pub async fn confirm(&self, reservation_id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or_else(|| AppError::NotFound(format!("预留 {}", reservation_id)))?;
        if reservation.status != ReservationStatus::Reserved {
            return Err(AppError::Validation(format!(
                "预留 {} 已处理过，当前状态不允许确认",
                reservation_id
            )));
        }
        if reservation.expires_at < Utc::now() {
            reservation.status = ReservationStatus::Expired;
            return Err(AppError::Validation(format!(
                "预留 {} 已过期，无法确认",
                reservation_id
            )));
        }
        reservation.status = ReservationStatus::Confirmed;
        let key = (reservation.tenant_id, reservation.quota_type);
        let amount = reservation.amount;
        *state.used.entry(key).or_insert(0) += amount;
        info!("✅ 预留 {} 已确认，计入用量 {}", reservation_id, amount);
        Ok(())
    }

    /// 释放预留，恢复配额。幂等：已释放/已过期的预留直接返回。
    pub async fn release(&self, reservation_id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or_else(|| AppError::NotFound(format!("预留 {}", reservation_id)))?;
        match reservation.status {
            ReservationStatus::Reserved => {
                reservation.status = ReservationStatus::Released;
                info!("🔓 预留 {} 已释放", reservation_id);
                Ok(())
            }
            ReservationStatus::Released | ReservationStatus::Expired => Ok(()),
            ReservationStatus::Confirmed => Err(AppError::Validation(format!(
                "预留 {} 已确认，不能再释放",
                reservation_id
            ))),
        }
    }

    /// 清理过期未确认的预留，返回清理数量
    pub async fn cleanup_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut cleaned = 0;
        for reservation in state.reservations.values_mut() {
            if reservation.status == ReservationStatus::Reserved && reservation.expires_at < now {
                reservation.status = ReservationStatus::Expired;
                cleaned += 1;
            }
        }
        if cleaned > 0 {
            warn!("🧹 清理了 {} 笔过期的配额预留", cleaned);
        }
        cleaned
    }

    /// 当前在途（reserved）的总预留量
    pub async fn reserved_amount(&self, tenant_id: i64, quota_type: QuotaType) -> i64 {
        let state = self.state.lock().await;
        Self::active_reserved(&state, tenant_id, quota_type)
    }

    pub async fn reservation(&self, reservation_id: Uuid) -> Option<QuotaReservation> {
        let state = self.state.lock().await;
        state.reservations.get(&reservation_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unlimited_short_circuits() {
        let ledger = QuotaLedger::new(10);
        ledger.set_limit(1, QuotaType::Publish, -1).await;
        let check = ledger.check_quota(1, QuotaType::Publish).await;
        assert!(check.has_quota);
        assert_eq!(check.limit, QuotaCheck::UNLIMITED);
        // 无限配额下可以随意预留
        for _ in 0..100 {
            ledger.reserve(1, QuotaType::Publish, 1).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_reserve_blocks_overcommit() {
        let ledger = QuotaLedger::new(10);
        ledger.set_limit(1, QuotaType::Publish, 2).await;
        ledger.reserve(1, QuotaType::Publish, 1).await.unwrap();
        ledger.reserve(1, QuotaType::Publish, 1).await.unwrap();
        let err = ledger.reserve(1, QuotaType::Publish, 1).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExhausted { .. }));
    }

    #[tokio::test]
    async fn test_release_restores_quota() {
        let ledger = QuotaLedger::new(10);
        ledger.set_limit(1, QuotaType::Publish, 1).await;
        let reservation = ledger.reserve(1, QuotaType::Publish, 1).await.unwrap();
        assert!(ledger.reserve(1, QuotaType::Publish, 1).await.is_err());
        ledger.release(reservation.reservation_id).await.unwrap();
        ledger.reserve(1, QuotaType::Publish, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_confirm_consumes_quota_exactly_once() {
        let ledger = QuotaLedger::new(10);
        ledger.set_limit(1, QuotaType::Publish, 3).await;
        let reservation = ledger.reserve(1, QuotaType::Publish, 1).await.unwrap();
        ledger.confirm(reservation.reservation_id).await.unwrap();
        // 确认后不能再释放，也不能重复确认
        assert!(ledger.release(reservation.reservation_id).await.is_err());
        assert!(ledger.confirm(reservation.reservation_id).await.is_err());
        let check = ledger.check_quota(1, QuotaType::Publish).await;
        assert_eq!(check.remaining, 2);
    }

    #[tokio::test]
    async fn test_conservation_at_quiescence() {
        let ledger = QuotaLedger::new(10);
        ledger.set_limit(1, QuotaType::Publish, 10).await;
        let r1 = ledger.reserve(1, QuotaType::Publish, 2).await.unwrap();
        let r2 = ledger.reserve(1, QuotaType::Publish, 3).await.unwrap();
        ledger.confirm(r1.reservation_id).await.unwrap();
        ledger.release(r2.reservation_id).await.unwrap();
        // 在途预留清零，剩余 = 上限 - 已确认
        assert_eq!(ledger.reserved_amount(1, QuotaType::Publish).await, 0);
        let check = ledger.check_quota(1, QuotaType::Publish).await;
        assert_eq!(check.remaining, 8);
    }

    #[tokio::test]
    async fn test_expired_reservation_cleanup() {
        // ttl 为 0 分钟，预留立即过期
        let ledger = QuotaLedger::new(0);
        ledger.set_limit(1, QuotaType::Publish, 1).await;
        let reservation = ledger.reserve(1, QuotaType::Publish, 1).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(ledger.cleanup_expired().await, 1);
        assert!(ledger.confirm(reservation.reservation_id).await.is_err());
        // 清理后配额恢复
        let check = ledger.check_quota(1, QuotaType::Publish).await;
        assert_eq!(check.remaining, 1);
    }

    #[tokio::test]
    async fn test_concurrent_reserve_never_oversells() {
        use std::sync::Arc;

        let ledger = Arc::new(QuotaLedger::new(10));
        ledger.set_limit(1, QuotaType::Publish, 5).await;
        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.reserve(1, QuotaType::Publish, 1).await.is_ok()
            }));
        }
        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 5);
    }
}
