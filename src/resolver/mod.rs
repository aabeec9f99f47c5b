//! 故障转移DNS解析器
//!
//! 把服务器池、重试循环与主机缓存组合在一起：
//! 每次查询从池中选择一个服务器，失败时记入该服务器的连续失败次数并换一个服务器重试，
//! 名称不存在的回答被视为确定结果立即返回。后台任务周期性地恢复被隔离的服务器。

use crate::config::ResolverConfig;
use crate::transport::{QueryExecutor, UdpExecutor};
use crate::types::{MxRecord, Query, RecordType, Response};
use crate::utils::{normalize_host, parse_server_list, reverse_name};
use crate::{dns_cache_hit, dns_cache_miss, dns_debug, dns_info, dns_upstream, dns_warn};
use crate::{DnsError, Result};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub mod cache;
pub mod pool;
pub mod restore;
pub mod strategy;

pub use cache::{CacheStats, HostCache};
pub use pool::{ServerHandle, ServerId, ServerPool, ServerSnapshot, ServerState, DNS_PORT};
pub use restore::RestoreTask;
pub use strategy::SelectionStrategy;

/// 公共DNS服务器列表地址
pub const DEFAULT_SERVER_LIST_URL: &str = "https://public-dns.info/nameservers.txt";

/// 解析器运行状态，用于外部监控
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// 活动服务器数量
    pub active_servers: usize,
    /// 隔离服务器数量
    pub quarantined_servers: usize,
    /// 缓存条目数量
    pub cache_size: usize,
}

impl ResolverStats {
    /// 序列化为JSON，供监控端点输出
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// 故障转移DNS解析器
pub struct Resolver {
    config: ResolverConfig,
    pool: Arc<ServerPool>,
    cache: HostCache,
    executor: Arc<dyn QueryExecutor>,
    /// 根令牌：取消后恢复任务与进行中的重试循环都会退出
    cancel: CancellationToken,
    restore_task: RestoreTask,
}

impl Resolver {
    /// 使用自定义查询执行器创建解析器
    ///
    /// 必须在tokio运行时内调用，恢复任务随解析器一起启动。
    pub fn new(config: ResolverConfig, executor: Arc<dyn QueryExecutor>) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(ServerPool::new(
            config.strategy,
            config.failure_threshold,
            config.restore_delay,
        ));
        let cache = HostCache::new(config.cache_capacity, config.cache_lifetime);
        let cancel = CancellationToken::new();
        let restore_task = RestoreTask::spawn(pool.clone(), config.restore_interval, &cancel)?;

        dns_info!(
            "🚀 创建解析器: 策略 {}, 传输 {}, 重试上限 {}",
            config.strategy,
            executor.transport_type(),
            config.retry_limit
        );

        Ok(Self {
            config,
            pool,
            cache,
            executor,
            cancel,
            restore_task,
        })
    }

    /// 使用UDP执行器创建解析器
    pub fn with_udp(config: ResolverConfig) -> Result<Self> {
        Self::new(config, Arc::new(UdpExecutor::new()))
    }

    /// 解析器配置
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// 服务器池
    pub fn pool(&self) -> &ServerPool {
        &self.pool
    }

    /// 主机缓存
    pub fn cache(&self) -> &HostCache {
        &self.cache
    }

    /// 从文本加载服务器列表（每行一个地址），替换现有列表
    pub fn load_from_str(&self, text: &str) -> usize {
        let servers = parse_server_list(text);
        self.pool.load(servers.iter().map(|ip| ip.to_string()))
    }

    /// 从URL下载并加载服务器列表
    #[cfg(feature = "reqwest")]
    pub async fn load_from_url(&self, url: &str) -> Result<usize> {
        let url = crate::utils::validate_list_url(url)?;

        let client = reqwest::Client::builder()
            .user_agent(crate::utils::get_user_agent())
            .build()?;

        dns_info!("🌐 下载服务器列表: {}", url);
        let text = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(self.load_from_str(&text))
    }

    /// 从默认的公共服务器列表加载
    #[cfg(feature = "reqwest")]
    pub async fn load_default_list(&self) -> Result<usize> {
        self.load_from_url(DEFAULT_SERVER_LIST_URL).await
    }

    /// 追加单个服务器
    pub fn add_server(&self, server: &str) -> bool {
        self.pool.add_server(server)
    }

    /// 当前活动服务器地址
    pub fn active_servers(&self) -> Vec<IpAddr> {
        self.pool.active_servers()
    }

    /// 运行状态快照
    pub fn stats(&self) -> ResolverStats {
        let (active_servers, quarantined_servers) = self.pool.counts();
        ResolverStats {
            active_servers,
            quarantined_servers,
            cache_size: self.cache.len(),
        }
    }

    /// 缓存统计
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// 重试循环
    ///
    /// `query_fn` 接收所选服务器的 `地址:53`，每次调用受拨号超时约束。
    /// 返回 `NxDomain` 时立即结束且不重试；其他非临时错误直接返回且不计入服务器失败；
    /// 临时错误计入服务器失败并换服务器重试，
    /// 直到成功、达到重试上限或被取消。
    pub async fn resolve_with<T, F, Fut>(
        &self,
        subject: &str,
        cancel: Option<&CancellationToken>,
        query_fn: F,
    ) -> Result<T>
    where
        F: Fn(SocketAddr) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retry_limit = self.config.retry_limit;
        let mut attempts: u32 = 1;

        loop {
            if self.is_cancelled(cancel) {
                return Err(DnsError::Cancelled);
            }

            let server = self.pool.select()?;
            dns_upstream!(server.address(), subject);

            let outcome = tokio::select! {
                biased;
                _ = self.cancelled(cancel) => return Err(DnsError::Cancelled),
                result = timeout(self.config.dial_timeout, query_fn(server.socket_addr())) => {
                    result.unwrap_or(Err(DnsError::Timeout))
                }
            };

            match outcome {
                Ok(value) => {
                    self.pool.mark_success(&server);
                    return Ok(value);
                }
                Err(DnsError::NxDomain) => {
                    self.pool.mark_success(&server);
                    return Err(DnsError::NxDomain);
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    dns_debug!("第 {} 次查询 {} 失败 (服务器 {}): {}", attempts, subject, server.address(), err);
                    self.pool.mark_failure(&server);
                }
            }

            if retry_limit != 0 && attempts >= retry_limit {
                dns_warn!("⏱️ 查询 {} 达到重试上限 {}", subject, retry_limit);
                return Err(DnsError::RetryLimitExceeded);
            }
            attempts += 1;

            if self.pool.active_len() < self.config.backoff_pool_threshold && !self.config.retry_sleep.is_zero() {
                tokio::select! {
                    _ = self.cancelled(cancel) => return Err(DnsError::Cancelled),
                    _ = tokio::time::sleep(self.config.retry_sleep) => {}
                }
            }
        }
    }

    /// 发送任意类型的查询并返回原始响应
    pub async fn query(
        &self,
        name: &str,
        rtype: RecordType,
        cancel: Option<&CancellationToken>,
    ) -> Result<Response> {
        let query = Query::new(name, rtype);
        let query = &query;
        let executor = self.executor.as_ref();
        let deadline = self.config.dial_timeout;

        self.resolve_with(name, cancel, move |server| async move {
            executor.exchange(server, query, deadline).await
        })
        .await
    }

    /// 正向解析主机地址（A + AAAA），结果会被缓存
    pub async fn lookup_ip_addr(&self, host: &str) -> Result<Vec<IpAddr>> {
        self.lookup_ip_addr_with_cancel(host, None).await
    }

    /// 可取消的正向解析
    pub async fn lookup_ip_addr_with_cancel(
        &self,
        host: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<IpAddr>> {
        if let Some(addrs) = self.cache.get(host) {
            dns_cache_hit!(host);
            return Ok(addrs);
        }
        if self.cache.is_enabled() {
            dns_cache_miss!(host);
        }

        let v4 = Query::new(host, RecordType::A);
        let v6 = Query::new(host, RecordType::AAAA);
        let (v4, v6) = (&v4, &v6);
        let executor = self.executor.as_ref();
        let deadline = self.config.dial_timeout;

        let result = self
            .resolve_with(host, cancel, move |server| async move {
                let (a, aaaa) = tokio::join!(
                    executor.exchange(server, v4, deadline),
                    executor.exchange(server, v6, deadline),
                );
                merge_address_answers(a, aaaa)
            })
            .await;

        let addrs = match result {
            Err(DnsError::EmptyPool) if self.config.bypass_on_empty => self.system_lookup(host).await?,
            other => other?,
        };

        self.cache.put(host, addrs.clone());
        Ok(addrs)
    }

    /// 反向解析：查询地址对应的PTR名称
    pub async fn lookup_addr(&self, ip: IpAddr) -> Result<Vec<String>> {
        self.lookup_addr_with_cancel(ip, None).await
    }

    /// 可取消的反向解析
    pub async fn lookup_addr_with_cancel(
        &self,
        ip: IpAddr,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<String>> {
        self.lookup_records(&reverse_name(&ip), RecordType::PTR, cancel, Response::ptr_names)
            .await
    }

    /// 查询域名的权威名称服务器
    pub async fn lookup_ns(&self, name: &str) -> Result<Vec<String>> {
        self.lookup_ns_with_cancel(name, None).await
    }

    /// 可取消的NS查询
    pub async fn lookup_ns_with_cancel(
        &self,
        name: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<String>> {
        self.lookup_records(name, RecordType::NS, cancel, Response::ns_names).await
    }

    /// 查询TXT记录
    pub async fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        self.lookup_txt_with_cancel(name, None).await
    }

    /// 可取消的TXT查询
    pub async fn lookup_txt_with_cancel(
        &self,
        name: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<String>> {
        self.lookup_records(name, RecordType::TXT, cancel, Response::txt_strings).await
    }

    /// 查询MX记录，按优先级升序
    pub async fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>> {
        self.lookup_mx_with_cancel(name, None).await
    }

    /// 可取消的MX查询
    pub async fn lookup_mx_with_cancel(
        &self,
        name: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<MxRecord>> {
        self.lookup_records(name, RecordType::MX, cancel, Response::mx_records).await
    }

    /// 查询规范名称
    ///
    /// 没有别名时返回查询的名称本身。
    pub async fn lookup_cname(&self, name: &str) -> Result<String> {
        self.lookup_cname_with_cancel(name, None).await
    }

    /// 可取消的规范名称查询
    pub async fn lookup_cname_with_cancel(
        &self,
        name: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let response = self.query(name, RecordType::CNAME, cancel).await?;
        Ok(response
            .cname_target()
            .unwrap_or_else(|| normalize_host(name)))
    }

    /// 停止恢复任务并中止进行中的查询
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.restore_task.shutdown().await;
        dns_info!("🛑 解析器已关闭");
    }

    async fn lookup_records<T>(
        &self,
        name: &str,
        rtype: RecordType,
        cancel: Option<&CancellationToken>,
        extract: fn(&Response) -> Vec<T>,
    ) -> Result<Vec<T>> {
        let query = Query::new(name, rtype);
        let query = &query;
        let executor = self.executor.as_ref();
        let deadline = self.config.dial_timeout;

        self.resolve_with(name, cancel, move |server| async move {
            let response = executor.exchange(server, query, deadline).await?;
            let items = extract(&response);
            if items.is_empty() {
                Err(DnsError::NxDomain)
            } else {
                Ok(items)
            }
        })
        .await
    }

    async fn system_lookup(&self, host: &str) -> Result<Vec<IpAddr>> {
        dns_warn!("服务器池为空，使用系统解析器查询 {}", host);

        let mut addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0)).await?.map(|a| a.ip()).collect();
        addrs.dedup();

        if addrs.is_empty() {
            Err(DnsError::NxDomain)
        } else {
            Ok(addrs)
        }
    }

    fn is_cancelled(&self, caller: Option<&CancellationToken>) -> bool {
        self.cancel.is_cancelled() || caller.map_or(false, CancellationToken::is_cancelled)
    }

    async fn cancelled(&self, caller: Option<&CancellationToken>) {
        match caller {
            Some(token) => tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = token.cancelled() => {}
            },
            None => self.cancel.cancelled().await,
        }
    }
}

/// 合并同一服务器上A与AAAA查询的结果
///
/// 任一族返回地址即成功；没有地址时，任一族的名称不存在都是确定结果，
/// 优先于另一族的临时错误。
fn merge_address_answers(a: Result<Response>, aaaa: Result<Response>) -> Result<Vec<IpAddr>> {
    let mut addrs = Vec::new();
    let mut not_found = false;
    let mut failure = None;

    for result in [a, aaaa] {
        match result {
            Ok(response) => addrs.extend(response.ip_addrs()),
            Err(DnsError::NxDomain) => not_found = true,
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }

    if !addrs.is_empty() {
        return Ok(addrs);
    }
    match failure {
        Some(err) if !not_found => Err(err),
        _ => Err(DnsError::NxDomain),
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("transport", &self.executor.transport_type())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_response::DnsResponseBuilder;
    use crate::transport::MockQueryExecutor;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn config(retry_limit: u32) -> ResolverConfig {
        ResolverConfig::builder()
            .strategy(SelectionStrategy::RoundRobin)
            .retry_limit(retry_limit)
            .retry_sleep(Duration::from_millis(10))
            .failure_threshold(30)
            .build()
            .unwrap()
    }

    fn a_response(ip: Ipv4Addr) -> Response {
        DnsResponseBuilder::new().add_a_answer("example.com", 60, ip).build()
    }

    #[tokio::test]
    async fn test_nxdomain_is_not_retried() {
        let mut mock = MockQueryExecutor::new();
        mock.expect_transport_type().return_const("MOCK");
        mock.expect_exchange()
            .times(1)
            .returning(|_, _, _| Err(DnsError::NxDomain));

        let resolver = Resolver::new(config(5), Arc::new(mock)).unwrap();
        resolver.load_from_str("1.0.0.0\n2.0.0.0\n");

        let result = resolver.lookup_ns("missing.example").await;
        assert_eq!(result, Err(DnsError::NxDomain));
        assert_eq!(resolver.pool().snapshot()[0].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_retry_limit() {
        let mut mock = MockQueryExecutor::new();
        mock.expect_transport_type().return_const("MOCK");
        mock.expect_exchange()
            .times(3)
            .returning(|_, _, _| Err(DnsError::Timeout));

        let resolver = Resolver::new(config(3), Arc::new(mock)).unwrap();
        resolver.load_from_str("1.0.0.0\n2.0.0.0\n3.0.0.0\n");

        let result = resolver.lookup_txt("example.com").await;
        assert_eq!(result, Err(DnsError::RetryLimitExceeded));

        // 轮询使三次尝试落在三个不同服务器上
        for snapshot in resolver.pool().snapshot() {
            assert_eq!(snapshot.consecutive_failures, 1);
        }
    }

    #[tokio::test]
    async fn test_forward_lookup_merges_families_and_caches() {
        let mut mock = MockQueryExecutor::new();
        mock.expect_transport_type().return_const("MOCK");
        mock.expect_exchange()
            .times(2)
            .returning(|_, query, _| match query.qtype {
                RecordType::A => Ok(a_response(Ipv4Addr::new(93, 184, 216, 34))),
                _ => Err(DnsError::NxDomain),
            });

        let resolver = Resolver::new(config(5), Arc::new(mock)).unwrap();
        resolver.add_server("1.0.0.0");

        let first = resolver.lookup_ip_addr("Example.com").await.unwrap();
        let second = resolver.lookup_ip_addr("example.com.").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))]);
        assert_eq!(resolver.cache_stats().hits, 1);
        assert_eq!(resolver.stats().cache_size, 1);
    }

    #[tokio::test]
    async fn test_empty_pool_is_not_retried() {
        let mut mock = MockQueryExecutor::new();
        mock.expect_transport_type().return_const("MOCK");
        mock.expect_exchange().never();

        let resolver = Resolver::new(config(0), Arc::new(mock)).unwrap();
        assert_eq!(resolver.lookup_mx("example.com").await, Err(DnsError::EmptyPool));
    }

    #[tokio::test]
    async fn test_cname_falls_back_to_queried_name() {
        let mut mock = MockQueryExecutor::new();
        mock.expect_transport_type().return_const("MOCK");
        mock.expect_exchange()
            .returning(|_, _, _| Ok(DnsResponseBuilder::new().build()));

        let resolver = Resolver::new(config(1), Arc::new(mock)).unwrap();
        resolver.add_server("1.0.0.0");
        assert_eq!(resolver.lookup_cname("Example.com.").await.unwrap(), "example.com");
    }

    #[tokio::test]
    async fn test_stats_serialize_to_json() {
        let mut mock = MockQueryExecutor::new();
        mock.expect_transport_type().return_const("MOCK");

        let resolver = Resolver::new(config(1), Arc::new(mock)).unwrap();
        resolver.load_from_str("1.0.0.0\n10.0.0.1\nnot-an-ip\n");

        let json: serde_json::Value = serde_json::from_str(&resolver.stats().to_json().unwrap()).unwrap();
        assert_eq!(json["active_servers"], 1);
        assert_eq!(json["quarantined_servers"], 0);
        assert_eq!(json["cache_size"], 0);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_charged() {
        let mut mock = MockQueryExecutor::new();
        mock.expect_transport_type().return_const("MOCK");

        let resolver = Resolver::new(config(5), Arc::new(mock)).unwrap();
        resolver.load_from_str("1.0.0.0\n2.0.0.0\n");

        let calls = std::sync::atomic::AtomicUsize::new(0);
        let result: Result<()> = resolver
            .resolve_with("example.com", None, |_| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err(DnsError::Config("bad query".to_string())) }
            })
            .await;

        assert_eq!(result, Err(DnsError::Config("bad query".to_string())));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        for snapshot in resolver.pool().snapshot() {
            assert_eq!(snapshot.consecutive_failures, 0);
        }
    }

    #[test]
    fn test_merge_address_answers() {
        let v4 = Ok(a_response(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(merge_address_answers(v4, Err(DnsError::Timeout)).unwrap().len(), 1);
        assert_eq!(
            merge_address_answers(Err(DnsError::NxDomain), Err(DnsError::NxDomain)),
            Err(DnsError::NxDomain)
        );
        assert_eq!(
            merge_address_answers(Err(DnsError::Refused), Err(DnsError::NxDomain)),
            Err(DnsError::NxDomain)
        );
        assert_eq!(
            merge_address_answers(Err(DnsError::NxDomain), Err(DnsError::Timeout)),
            Err(DnsError::NxDomain)
        );
        assert_eq!(
            merge_address_answers(Err(DnsError::Refused), Err(DnsError::Timeout)),
            Err(DnsError::Refused)
        );
        let v6_only = DnsResponseBuilder::new()
            .add_aaaa_answer("example.com", 60, "2606:2800::1".parse().unwrap())
            .build();
        assert_eq!(merge_address_answers(Err(DnsError::Timeout), Ok(v6_only)).unwrap().len(), 1);
    }
}
