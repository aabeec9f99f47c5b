//! DNS查询执行器抽象
//!
//! 执行器负责与指定服务器完成一次DNS交换，并把失败归类为
//! `DnsError::NxDomain`（名称确定不存在）或其他临时错误。
//! 服务器池与重试逻辑只把它当作不透明的可调用对象。

use crate::{Query, Response, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;

pub mod udp;

pub use udp::UdpExecutor;

/// DNS查询执行器接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// 向 `server` 发送一次查询并等待响应，整个交换不超过 `timeout`
    async fn exchange(&self, server: SocketAddr, query: &Query, timeout: Duration) -> Result<Response>;

    /// 获取传输类型名称
    fn transport_type(&self) -> &'static str;
}
