//! 平台标识
//!
//! 十二个内容平台组成的封闭集合。新增平台时在这里加一个变体，
//! 并在 `adapters::builtin_registry` 中补一条注册即可。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// 平台标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Xiaohongshu,
    Douyin,
    Toutiao,
    Sohu,
    Wangyi,
    Baijiahao,
    Zhihu,
    Csdn,
    Jianshu,
    Wechat,
    Qie,
    Bilibili,
}

impl PlatformId {
    /// 全部平台（注册表初始化与诊断日志使用）
    pub const ALL: [PlatformId; 12] = [
        PlatformId::Xiaohongshu,
        PlatformId::Douyin,
        PlatformId::Toutiao,
        PlatformId::Sohu,
        PlatformId::Wangyi,
        PlatformId::Baijiahao,
        PlatformId::Zhihu,
        PlatformId::Csdn,
        PlatformId::Jianshu,
        PlatformId::Wechat,
        PlatformId::Qie,
        PlatformId::Bilibili,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::Xiaohongshu => "xiaohongshu",
            PlatformId::Douyin => "douyin",
            PlatformId::Toutiao => "toutiao",
            PlatformId::Sohu => "sohu",
            PlatformId::Wangyi => "wangyi",
            PlatformId::Baijiahao => "baijiahao",
            PlatformId::Zhihu => "zhihu",
            PlatformId::Csdn => "csdn",
            PlatformId::Jianshu => "jianshu",
            PlatformId::Wechat => "wechat",
            PlatformId::Qie => "qie",
            PlatformId::Bilibili => "bilibili",
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformId::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| AppError::Validation(format!("未知的平台标识: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_id_round_trip() {
        for platform in PlatformId::ALL {
            let parsed: PlatformId = platform.as_str().parse().unwrap();
            assert_eq!(parsed, platform);
        }
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let result: Result<PlatformId, _> = "weibo".parse();
        assert!(result.is_err());
    }
}
