//! 正向查询结果缓存

use crate::utils::normalize_host;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

/// 缓存条目
#[derive(Debug, Clone)]
struct CacheEntry {
    /// 解析得到的地址
    addrs: Vec<IpAddr>,
    /// 最近一次命中或写入的时间
    last_hit_at: Instant,
}

/// 缓存统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 插入次数
    pub inserts: u64,
    /// 淘汰次数（过期清理与容量淘汰）
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

/// 有界、按闲置时间过期的主机缓存
///
/// 不保证 single-flight：并发未命中的调用方可能同时查询并写入，后写者覆盖。
#[derive(Debug)]
pub struct HostCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    lifetime: Duration,
}

impl HostCache {
    /// 创建缓存，`capacity` 为 0 时缓存被禁用
    pub fn new(capacity: usize, lifetime: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity,
            lifetime,
        }
    }

    /// 缓存是否启用
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// 容量上限
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 获取缓存记录，命中时刷新最近命中时间
    ///
    /// 闲置超过生存时间的条目视为未命中并被移除。
    pub fn get(&self, host: &str) -> Option<Vec<IpAddr>> {
        if !self.is_enabled() {
            return None;
        }

        let key = normalize_host(host);
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get_mut(&key) {
            Some(entry) if now.saturating_duration_since(entry.last_hit_at) < self.lifetime => {
                entry.last_hit_at = now;
                let addrs = entry.addrs.clone();
                inner.stats.hits += 1;
                return Some(addrs);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.remove(&key);
            inner.stats.evictions += 1;
        }
        inner.stats.misses += 1;
        None
    }

    /// 插入或覆盖缓存记录
    ///
    /// 缓存已满时先清理过期条目，仍然满则淘汰任意一个条目。
    pub fn put(&self, host: &str, addrs: Vec<IpAddr>) {
        if !self.is_enabled() {
            return;
        }

        let key = normalize_host(host);
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            Self::evict_expired_locked(inner, now, self.lifetime);

            if inner.entries.len() >= self.capacity {
                // 非LRU：任意淘汰一个
                if let Some(victim) = inner.entries.keys().next().cloned() {
                    inner.entries.remove(&victim);
                    inner.stats.evictions += 1;
                }
            }
        }

        inner.entries.insert(key, CacheEntry { addrs, last_hit_at: now });
        inner.stats.inserts += 1;
    }

    /// 清理所有闲置超过生存时间的条目，返回清理数量
    pub fn evict_expired(&self) -> usize {
        let mut guard = self.inner.lock();
        Self::evict_expired_locked(&mut guard, Instant::now(), self.lifetime)
    }

    fn evict_expired_locked(inner: &mut CacheInner, now: Instant, lifetime: Duration) -> usize {
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_hit_at) < lifetime);
        let evicted = before - inner.entries.len();
        inner.stats.evictions += evicted as u64;
        evicted
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 获取缓存统计
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    /// 获取命中率
    pub fn hit_rate(&self) -> f64 {
        let stats = self.stats();
        let total = stats.hits + stats.misses;
        if total == 0 {
            0.0
        } else {
            stats.hits as f64 / total as f64
        }
    }
}
