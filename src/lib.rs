//! RatFailoverDNS - 故障转移DNS查询库
//!
//! 把查询分散到一组公共转发服务器上：按策略选择服务器、连续失败的服务器被隔离并在闲置后恢复、
//! 临时失败自动换服务器重试，正向查询结果在有界缓存中保存一段时间。
//!
//! ```no_run
//! use rat_failover_dns::{Resolver, ResolverConfig};
//!
//! # async fn run() -> rat_failover_dns::Result<()> {
//! let resolver = Resolver::with_udp(ResolverConfig::default())?;
//! resolver.load_from_str("1.1.1.1\n8.8.8.8\n9.9.9.9\n");
//! let addrs = resolver.lookup_ip_addr("example.com").await?;
//! println!("{:?}", addrs);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod types;
pub mod transport;
pub mod resolver;
pub mod error;
pub mod config;
pub mod utils;
pub mod dns_response;
pub mod logger;

pub use types::*;
pub use transport::{QueryExecutor, UdpExecutor};
pub use resolver::{
    CacheStats, HostCache, Resolver, ResolverStats, SelectionStrategy, ServerHandle, ServerPool,
    DEFAULT_SERVER_LIST_URL,
};
pub use config::{ConfigError, ResolverConfig, ResolverConfigBuilder};
pub use error::{DnsError, Result};
pub use dns_response::DnsResponseBuilder;
pub use utils::{is_public_unicast, parse_server_list};
pub use logger::{init_dns_logger, init_dns_logger_silent, dns_format};

// 重新导出log基础日志宏到crate根部，供DNS宏使用
pub use log::{error, warn, info, debug, trace};

/// 便捷宏：快速创建UDP解析器并加载服务器
#[macro_export]
macro_rules! failover_dns {
    () => {
        $crate::Resolver::with_udp($crate::ResolverConfig::default())
    };
    (servers = [$($server:expr),* $(,)?]) => {
        $crate::Resolver::with_udp($crate::ResolverConfig::default()).map(|resolver| {
            $(
                resolver.add_server($server);
            )*
            resolver
        })
    };
}
