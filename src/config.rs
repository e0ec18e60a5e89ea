//! 程序配置
//!
//! 支持两种加载方式：环境变量覆盖默认值，或从 TOML 文件读取。
//! 所有外部等待的超时上限都集中在这里，UI 等待 5-30 秒，
//! 轮询间隔 2-10 秒。

use serde::Deserialize;
use std::path::Path;

use crate::error::{AppError, AppResult};

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 页面导航超时（秒）
    pub navigation_timeout_secs: u64,
    /// 元素等待超时（秒）
    pub selector_timeout_secs: u64,
    /// 导航后的页面静置时间（毫秒）
    pub settle_ms: u64,
    /// 登录轮询间隔（秒）
    pub login_poll_interval_secs: u64,
    /// 登录轮询最大次数
    pub login_max_attempts: u32,
    /// 登录状态监控间隔（秒）
    pub monitor_interval_secs: u64,
    /// 任务队列检查间隔（秒）
    pub queue_check_interval_secs: u64,
    /// 单个任务的执行超时上限（分钟）
    pub task_timeout_minutes: i64,
    /// 批次等待期间的分段检查间隔（秒）
    pub batch_wait_check_secs: u64,
    /// 失败任务是否自动重试（协调器策略，不是隐藏行为）
    pub auto_retry: bool,
    /// 任务默认最大重试次数
    pub default_max_retries: i32,
    /// 配额预留的过期时间（分钟），防止泄漏
    pub reservation_ttl_minutes: i64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            navigation_timeout_secs: 30,
            selector_timeout_secs: 10,
            settle_ms: 2000,
            login_poll_interval_secs: 2,
            login_max_attempts: 30,
            monitor_interval_secs: 10,
            queue_check_interval_secs: 10,
            task_timeout_minutes: 15,
            batch_wait_check_secs: 10,
            auto_retry: true,
            default_max_retries: 3,
            reservation_ttl_minutes: 10,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量加载配置（未设置的项使用默认值）
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", default.browser_debug_port),
            navigation_timeout_secs: env_parse(
                "NAVIGATION_TIMEOUT_SECS",
                default.navigation_timeout_secs,
            ),
            selector_timeout_secs: env_parse(
                "SELECTOR_TIMEOUT_SECS",
                default.selector_timeout_secs,
            ),
            settle_ms: env_parse("SETTLE_MS", default.settle_ms),
            login_poll_interval_secs: env_parse(
                "LOGIN_POLL_INTERVAL_SECS",
                default.login_poll_interval_secs,
            ),
            login_max_attempts: env_parse("LOGIN_MAX_ATTEMPTS", default.login_max_attempts),
            monitor_interval_secs: env_parse(
                "MONITOR_INTERVAL_SECS",
                default.monitor_interval_secs,
            ),
            queue_check_interval_secs: env_parse(
                "QUEUE_CHECK_INTERVAL_SECS",
                default.queue_check_interval_secs,
            ),
            task_timeout_minutes: env_parse("TASK_TIMEOUT_MINUTES", default.task_timeout_minutes),
            batch_wait_check_secs: env_parse(
                "BATCH_WAIT_CHECK_SECS",
                default.batch_wait_check_secs,
            ),
            auto_retry: env_parse("AUTO_RETRY", default.auto_retry),
            default_max_retries: env_parse("DEFAULT_MAX_RETRIES", default.default_max_retries),
            reservation_ttl_minutes: env_parse(
                "RESERVATION_TTL_MINUTES",
                default.reservation_ttl_minutes,
            ),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging),
        }
    }

    /// 从 TOML 文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Other(format!("读取配置文件失败 ({}): {}", path.display(), e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| AppError::Other(format!("配置文件解析失败 ({}): {}", path.display(), e)))
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts_are_bounded() {
        let config = Config::default();
        // UI 等待统一落在 5-30 秒区间
        assert!(config.navigation_timeout_secs <= 30);
        assert!(config.selector_timeout_secs >= 5);
        assert!(config.login_poll_interval_secs >= 2);
        assert!(config.monitor_interval_secs <= 10);
    }

    #[test]
    fn test_from_toml() {
        let raw = "browser_debug_port = 2001\nauto_retry = false\n";
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.browser_debug_port, 2001);
        assert!(!config.auto_retry);
        // 未指定的项取默认值
        assert_eq!(config.task_timeout_minutes, 15);
    }
}
