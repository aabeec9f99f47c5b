//! 错误类型定义

use std::fmt;
use std::io;

use crate::config::ConfigError;

/// DNS查询结果类型
pub type Result<T> = std::result::Result<T, DnsError>;

/// DNS错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    /// IO错误
    Io(String),
    /// 协议错误
    Protocol(String),
    /// 超时错误
    Timeout,
    /// 网络错误
    Network(String),
    /// HTTP错误
    Http(String),
    /// 配置错误
    Config(String),
    /// 服务器错误
    Server(String),
    /// 域名不存在
    NxDomain,
    /// 查询被拒绝
    Refused,
    /// 服务器失败
    ServerFailure,
    /// 格式错误
    FormatError,
    /// 活动服务器列表为空
    EmptyPool,
    /// 无法识别的选择策略
    BadStrategy(String),
    /// 重试次数耗尽
    RetryLimitExceeded,
    /// 查询被调用方取消
    Cancelled,
}

impl DnsError {
    /// 是否为可重试的临时错误
    ///
    /// 只有临时错误会计入服务器的连续失败次数并触发重试。
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            DnsError::NxDomain
                | DnsError::EmptyPool
                | DnsError::BadStrategy(_)
                | DnsError::RetryLimitExceeded
                | DnsError::Cancelled
                | DnsError::Config(_)
        )
    }
}

impl fmt::Display for DnsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsError::Io(msg) => write!(f, "IO error: {}", msg),
            DnsError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            DnsError::Timeout => write!(f, "Request timeout"),
            DnsError::Network(msg) => write!(f, "Network error: {}", msg),
            DnsError::Http(msg) => write!(f, "HTTP error: {}", msg),
            DnsError::Config(msg) => write!(f, "Config error: {}", msg),
            DnsError::Server(msg) => write!(f, "Server error: {}", msg),
            DnsError::NxDomain => write!(f, "Domain not found"),
            DnsError::Refused => write!(f, "Query refused"),
            DnsError::ServerFailure => write!(f, "Server failure"),
            DnsError::FormatError => write!(f, "Format error"),
            DnsError::EmptyPool => write!(f, "Server list is empty"),
            DnsError::BadStrategy(name) => write!(f, "Bad selection strategy: {}", name),
            DnsError::RetryLimitExceeded => write!(f, "Retry limit exceeded"),
            DnsError::Cancelled => write!(f, "Lookup cancelled"),
        }
    }
}

impl std::error::Error for DnsError {}

impl From<io::Error> for DnsError {
    fn from(err: io::Error) -> Self {
        DnsError::Io(err.to_string())
    }
}

impl From<ConfigError> for DnsError {
    fn from(err: ConfigError) -> Self {
        DnsError::Config(err.to_string())
    }
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for DnsError {
    fn from(err: reqwest::Error) -> Self {
        DnsError::Http(err.to_string())
    }
}
