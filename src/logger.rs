//! DNS 查询器专用日志系统
//!
//! 基于 `log` 门面与 `env_logger`，提供适合 DNS 故障转移场景的彩色日志输出

use chrono::Local;
use env_logger::fmt::Formatter;
use log::{Level, LevelFilter, Record};
use std::io::Write;
use std::sync::Once;

// 重新导出 log 的日志宏
pub use log::{debug, error, info, trace, warn};

/// 确保日志器只初始化一次
static INIT: Once = Once::new();

/// DNS 查询专用日志格式化器
pub fn dns_format(buf: &mut Formatter, record: &Record<'_>) -> std::io::Result<()> {
    let level = record.level();

    // DNS 主题配色方案
    let (level_color, level_bg, level_icon) = match level {
        Level::Error => ("\x1b[97m", "\x1b[41m", "🚫"),
        Level::Warn => ("\x1b[30m", "\x1b[43m", "⚠️ "),
        Level::Info => ("\x1b[97m", "\x1b[42m", "🌐"),
        Level::Debug => ("\x1b[30m", "\x1b[46m", "🔍"),
        Level::Trace => ("\x1b[97m", "\x1b[45m", "📡"),
    };

    let timestamp_color = "\x1b[90m";
    let message_color = "\x1b[37m";
    let reset = "\x1b[0m";

    let timestamp = Local::now().format("%H:%M:%S%.3f");

    writeln!(
        buf,
        "{}{} {}{}{:5}{} {} {}{}{}",
        timestamp_color, timestamp,
        level_color, level_bg, level, reset,
        level_icon,
        message_color, record.args(), reset
    )
}

/// 初始化 DNS 查询器日志系统（线程安全，防止重复初始化）
///
/// 如果宿主程序已经安装了其他 logger，本函数不会覆盖它。
///
/// # Example
/// ```
/// use rat_failover_dns::logger::init_dns_logger;
/// use log::LevelFilter;
///
/// init_dns_logger(LevelFilter::Info);
/// // 第二次调用不会产生任何效果
/// init_dns_logger(LevelFilter::Off);
/// ```
pub fn init_dns_logger(level: LevelFilter) {
    INIT.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(level)
            .format(dns_format)
            .try_init();
    });
}

/// 静默初始化，默认禁用日志输出
pub fn init_dns_logger_silent() {
    init_dns_logger(LevelFilter::Off)
}

/// 错误日志
#[macro_export]
macro_rules! dns_error {
    ($($arg:tt)*) => {
        $crate::error!($($arg)*);
    };
}

/// 警告日志
#[macro_export]
macro_rules! dns_warn {
    ($($arg:tt)*) => {
        $crate::warn!($($arg)*);
    };
}

/// 信息日志
#[macro_export]
macro_rules! dns_info {
    ($($arg:tt)*) => {
        $crate::info!($($arg)*);
    };
}

/// 调试日志
#[macro_export]
macro_rules! dns_debug {
    ($($arg:tt)*) => {
        $crate::debug!($($arg)*);
    };
}

/// 缓存命中日志
#[macro_export]
macro_rules! dns_cache_hit {
    ($domain:expr) => {
        $crate::logger::debug!("💾 缓存命中: {}", $domain);
    };
}

/// 缓存未命中日志
#[macro_export]
macro_rules! dns_cache_miss {
    ($domain:expr) => {
        $crate::logger::debug!("🔄 缓存未命中: {}", $domain);
    };
}

/// 上游查询日志
#[macro_export]
macro_rules! dns_upstream {
    ($server:expr, $domain:expr) => {
        $crate::logger::trace!("📡 上游服务器 {} 查询: {}", $server, $domain);
    };
}

/// 服务器隔离日志
#[macro_export]
macro_rules! dns_quarantine {
    ($server:expr, $fails:expr) => {
        $crate::logger::warn!("🚧 服务器 {} 连续失败 {} 次，已隔离", $server, $fails);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_ignored() {
        init_dns_logger(LevelFilter::Debug);
        init_dns_logger_silent();
        crate::dns_info!("日志初始化测试");
        crate::dns_quarantine!("1.0.0.0", 3);
    }
}
