//! 解析器配置
//!
//! 每个会话不可变的策略参数：选择策略、超时、隔离阈值、重试、恢复与缓存。

use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::resolver::strategy::SelectionStrategy;

/// 默认的重试退避生效阈值：活动服务器少于该数量时在重试之间休眠
pub const DEFAULT_BACKOFF_POOL_THRESHOLD: usize = 10;

/// 配置错误类型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// 无效的超时设置
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
    /// 无效的间隔设置
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

/// 解析器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// 服务器选择策略
    pub strategy: SelectionStrategy,
    /// 单次查询的网络超时
    pub dial_timeout: Duration,
    /// 连续失败超过该次数后隔离服务器
    pub failure_threshold: u32,
    /// 每次查询的最大尝试次数，0 表示不限
    pub retry_limit: u32,
    /// 服务器较少时两次尝试之间的休眠时间
    pub retry_sleep: Duration,
    /// 隔离服务器闲置多久后恢复
    pub restore_delay: Duration,
    /// 恢复扫描的执行间隔
    pub restore_interval: Duration,
    /// 活动服务器少于该数量时才在重试间休眠
    pub backoff_pool_threshold: usize,
    /// 正向查询缓存容量，0 表示禁用缓存
    pub cache_capacity: usize,
    /// 缓存条目闲置多久后可被清理
    pub cache_lifetime: Duration,
    /// 服务器池耗尽时回退到系统解析器
    pub bypass_on_empty: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::RoundRobin,
            dial_timeout: Duration::from_secs(1),
            failure_threshold: 30,
            retry_limit: 5,
            retry_sleep: Duration::from_millis(500),
            restore_delay: Duration::from_secs(15 * 60),
            restore_interval: Duration::from_secs(60),
            backoff_pool_threshold: DEFAULT_BACKOFF_POOL_THRESHOLD,
            cache_capacity: 65535,
            cache_lifetime: Duration::from_secs(300),
            bypass_on_empty: false,
        }
    }
}

impl ResolverConfig {
    /// 创建配置构建器
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::new()
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dial_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "dial timeout must be greater than 0".to_string(),
            ));
        }

        if self.restore_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "restore interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置构建器
#[derive(Debug, Clone, Default)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    /// 以默认值创建构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置选择策略
    pub fn strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// 设置单次查询超时
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    /// 设置隔离阈值
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// 设置最大尝试次数
    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.config.retry_limit = limit;
        self
    }

    /// 设置重试休眠时间
    pub fn retry_sleep(mut self, sleep: Duration) -> Self {
        self.config.retry_sleep = sleep;
        self
    }

    /// 设置恢复延迟
    pub fn restore_delay(mut self, delay: Duration) -> Self {
        self.config.restore_delay = delay;
        self
    }

    /// 设置恢复扫描间隔
    pub fn restore_interval(mut self, interval: Duration) -> Self {
        self.config.restore_interval = interval;
        self
    }

    /// 设置退避生效阈值
    pub fn backoff_pool_threshold(mut self, threshold: usize) -> Self {
        self.config.backoff_pool_threshold = threshold;
        self
    }

    /// 设置缓存容量
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// 设置缓存条目生存时间
    pub fn cache_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.cache_lifetime = lifetime;
        self
    }

    /// 设置是否在池耗尽时回退到系统解析器
    pub fn bypass_on_empty(mut self, bypass: bool) -> Self {
        self.config.bypass_on_empty = bypass;
        self
    }

    /// 构建并校验配置
    pub fn build(self) -> Result<ResolverConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.strategy, SelectionStrategy::RoundRobin);
        assert_eq!(config.retry_limit, 5);
        assert_eq!(config.failure_threshold, 30);
        assert_eq!(config.cache_capacity, 65535);
        assert!(!config.bypass_on_empty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let result = ResolverConfig::builder()
            .dial_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidTimeout(_))));

        let result = ResolverConfig::builder()
            .restore_interval(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidInterval(_))));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ResolverConfig::builder()
            .strategy(SelectionStrategy::Random)
            .retry_limit(0)
            .failure_threshold(1)
            .cache_capacity(50)
            .build()
            .unwrap();
        assert_eq!(config.strategy, SelectionStrategy::Random);
        assert_eq!(config.retry_limit, 0);
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.cache_capacity, 50);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = ResolverConfig::builder().bypass_on_empty(true).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ResolverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
