//! 服务器选择策略定义

use crate::DnsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 服务器选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// 随机策略：在活动服务器中均匀随机选择
    Random,

    /// 轮询策略：按加载顺序依次使用活动服务器
    RoundRobin,

    /// 时间分片策略：以当前Unix秒数对活动服务器数取模，不需要共享游标
    TimeSliced,
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Random => "random",
            Self::RoundRobin => "round_robin",
            Self::TimeSliced => "time_sliced",
        };
        f.write_str(name)
    }
}

impl FromStr for SelectionStrategy {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "round_robin" | "roundrobin" | "rotate" => Ok(Self::RoundRobin),
            "time_sliced" | "timesliced" | "time" => Ok(Self::TimeSliced),
            other => Err(DnsError::BadStrategy(other.to_string())),
        }
    }
}

/// 兼容数字模式：1=随机，2=轮询，3=时间分片
impl TryFrom<u8> for SelectionStrategy {
    type Error = DnsError;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        match mode {
            1 => Ok(Self::Random),
            2 => Ok(Self::RoundRobin),
            3 => Ok(Self::TimeSliced),
            other => Err(DnsError::BadStrategy(format!("mode {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy_names() {
        assert_eq!("random".parse::<SelectionStrategy>().unwrap(), SelectionStrategy::Random);
        assert_eq!("Rotate".parse::<SelectionStrategy>().unwrap(), SelectionStrategy::RoundRobin);
        assert_eq!("time_sliced".parse::<SelectionStrategy>().unwrap(), SelectionStrategy::TimeSliced);
        assert!(matches!(
            "fastest".parse::<SelectionStrategy>(),
            Err(DnsError::BadStrategy(_))
        ));
    }

    #[test]
    fn test_numeric_modes() {
        assert_eq!(SelectionStrategy::try_from(1).unwrap(), SelectionStrategy::Random);
        assert_eq!(SelectionStrategy::try_from(3).unwrap(), SelectionStrategy::TimeSliced);
        assert!(matches!(SelectionStrategy::try_from(0), Err(DnsError::BadStrategy(_))));
    }

    #[test]
    fn test_display_matches_serde_name() {
        let json = serde_json::to_string(&SelectionStrategy::RoundRobin).unwrap();
        assert_eq!(json, format!("\"{}\"", SelectionStrategy::RoundRobin));
    }
}
