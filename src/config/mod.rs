//! 配置模块
//!
//! 解析器的全部策略参数集中在 `ResolverConfig` 中，通过构建器创建并校验。

pub mod resolver_config;

pub use resolver_config::{
    ResolverConfig,
    ResolverConfigBuilder,
    ConfigError,
    DEFAULT_BACKOFF_POOL_THRESHOLD,
};
