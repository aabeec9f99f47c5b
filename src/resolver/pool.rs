//! 转发服务器池
//!
//! 服务器保存在一个稳定索引的数组中，活动与隔离两个集合只保存索引。
//! 每个服务器记录自己在所属集合中的位置，因此隔离与恢复都是 O(1) 的 swap-remove。
//! 所有读写都在同一把互斥锁内完成，锁从不跨越网络 I/O。

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::Rng;
use tokio::time::Instant;

use super::strategy::SelectionStrategy;
use crate::utils::parse_server_address;
use crate::{dns_debug, dns_info, dns_quarantine, DnsError, Result};

/// DNS 标准端口
pub const DNS_PORT: u16 = 53;

/// 服务器在池中的稳定标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(usize);

/// `select()` 返回的服务器句柄
///
/// 句柄携带加载时的代数，列表重新加载后旧句柄上的标记会被忽略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerHandle {
    id: ServerId,
    generation: u64,
    address: IpAddr,
}

impl ServerHandle {
    /// 服务器标识
    pub fn id(&self) -> ServerId {
        self.id
    }

    /// 服务器IP地址
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// 服务器的 `地址:53`
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, DNS_PORT)
    }
}

/// 服务器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// 参与选择
    Active,
    /// 已隔离，等待恢复扫描
    Quarantined,
}

/// 服务器状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSnapshot {
    /// 服务器地址
    pub address: IpAddr,
    /// 连续失败次数
    pub consecutive_failures: u32,
    /// 最近一次使用时间
    pub last_used_at: Option<Instant>,
    /// 当前状态
    pub state: ServerState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Active(usize),
    Quarantined(usize),
}

#[derive(Debug)]
struct ServerEntry {
    address: IpAddr,
    consecutive_failures: u32,
    last_used_at: Option<Instant>,
    slot: Slot,
}

#[derive(Debug, Default)]
struct PoolState {
    servers: Vec<ServerEntry>,
    active: Vec<ServerId>,
    quarantined: Vec<ServerId>,
    cursor: usize,
    generation: u64,
}

impl PoolState {
    fn push_active(&mut self, address: IpAddr) {
        let id = ServerId(self.servers.len());
        self.servers.push(ServerEntry {
            address,
            consecutive_failures: 0,
            last_used_at: None,
            slot: Slot::Active(self.active.len()),
        });
        self.active.push(id);
        self.cursor = 0;
    }

    /// 判断句柄是否属于当前代
    fn entry_mut(&mut self, handle: &ServerHandle) -> Option<&mut ServerEntry> {
        if handle.generation != self.generation {
            return None;
        }
        self.servers.get_mut(handle.id.0)
    }

    fn quarantine(&mut self, id: ServerId) {
        let Slot::Active(pos) = self.servers[id.0].slot else {
            return;
        };

        self.active.swap_remove(pos);
        if let Some(&moved) = self.active.get(pos) {
            self.servers[moved.0].slot = Slot::Active(pos);
        }

        self.servers[id.0].slot = Slot::Quarantined(self.quarantined.len());
        self.quarantined.push(id);
        self.cursor = 0;
    }

    fn restore(&mut self, id: ServerId) {
        let Slot::Quarantined(pos) = self.servers[id.0].slot else {
            return;
        };

        self.quarantined.swap_remove(pos);
        if let Some(&moved) = self.quarantined.get(pos) {
            self.servers[moved.0].slot = Slot::Quarantined(pos);
        }

        let entry = &mut self.servers[id.0];
        entry.slot = Slot::Active(self.active.len());
        entry.consecutive_failures = 0;
        self.active.push(id);
        self.cursor = 0;
    }
}

/// 转发服务器池
#[derive(Debug)]
pub struct ServerPool {
    state: Mutex<PoolState>,
    strategy: SelectionStrategy,
    failure_threshold: u32,
    restore_delay: Duration,
}

impl ServerPool {
    /// 创建空的服务器池
    pub fn new(strategy: SelectionStrategy, failure_threshold: u32, restore_delay: Duration) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            strategy,
            failure_threshold,
            restore_delay,
        }
    }

    /// 选择策略
    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// 替换整个服务器列表
    ///
    /// 无法解析或非公网地址被静默丢弃，返回实际加载的服务器数量。
    pub fn load<I, S>(&self, servers: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses: Vec<IpAddr> = servers
            .into_iter()
            .filter_map(|line| parse_server_address(line.as_ref()))
            .collect();

        let mut state = self.state.lock();
        let generation = state.generation.wrapping_add(1);
        *state = PoolState {
            generation,
            ..PoolState::default()
        };
        for address in addresses {
            state.push_active(address);
        }

        let loaded = state.active.len();
        dns_info!("📋 加载服务器列表: {} 个可用服务器", loaded);
        loaded
    }

    /// 追加单个服务器，地址无效时返回 `false`
    pub fn add_server(&self, server: &str) -> bool {
        match parse_server_address(server) {
            Some(address) => {
                self.state.lock().push_active(address);
                true
            }
            None => {
                dns_debug!("忽略无效服务器地址: {}", server);
                false
            }
        }
    }

    /// 按策略选择一个活动服务器
    pub fn select(&self) -> Result<ServerHandle> {
        let mut state = self.state.lock();
        let len = state.active.len();
        if len == 0 {
            return Err(DnsError::EmptyPool);
        }

        let index = match self.strategy {
            SelectionStrategy::Random => rand::thread_rng().gen_range(0..len),
            SelectionStrategy::RoundRobin => {
                let index = if state.cursor < len { state.cursor } else { 0 };
                state.cursor = (index + 1) % len;
                index
            }
            SelectionStrategy::TimeSliced => {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                (secs % len as u64) as usize
            }
        };

        let id = state.active[index];
        Ok(ServerHandle {
            id,
            generation: state.generation,
            address: state.servers[id.0].address,
        })
    }

    /// 记录一次成功：清零连续失败次数
    pub fn mark_success(&self, handle: &ServerHandle) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entry_mut(handle) {
            entry.consecutive_failures = 0;
            entry.last_used_at = Some(Instant::now());
        }
    }

    /// 记录一次失败，超过阈值时隔离服务器
    ///
    /// 返回本次调用是否导致了隔离。
    pub fn mark_failure(&self, handle: &ServerHandle) -> bool {
        let mut state = self.state.lock();
        let threshold = self.failure_threshold;

        let Some(entry) = state.entry_mut(handle) else {
            return false;
        };
        entry.last_used_at = Some(Instant::now());
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);

        let fails = entry.consecutive_failures;
        let is_active = matches!(entry.slot, Slot::Active(_));
        if fails > threshold && is_active {
            state.quarantine(handle.id);
            dns_quarantine!(handle.address, fails);
            return true;
        }

        false
    }

    /// 将闲置超过恢复延迟的隔离服务器放回活动集合
    ///
    /// 返回恢复的服务器数量。
    pub fn restore_eligible(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();

        let eligible: Vec<ServerId> = state
            .quarantined
            .iter()
            .copied()
            .filter(|id| match state.servers[id.0].last_used_at {
                Some(last) => now.saturating_duration_since(last) > self.restore_delay,
                None => true,
            })
            .collect();

        for id in &eligible {
            state.restore(*id);
        }

        if !eligible.is_empty() {
            dns_info!(
                "♻️ 恢复 {} 个隔离服务器，当前活动服务器: {}",
                eligible.len(),
                state.active.len()
            );
        }

        eligible.len()
    }

    /// 活动服务器数量
    pub fn active_len(&self) -> usize {
        self.state.lock().active.len()
    }

    /// 隔离服务器数量
    pub fn quarantined_len(&self) -> usize {
        self.state.lock().quarantined.len()
    }

    /// 在同一把锁内读取 (活动, 隔离) 数量
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.active.len(), state.quarantined.len())
    }

    /// 活动服务器地址快照，按活动集合当前顺序
    pub fn active_servers(&self) -> Vec<IpAddr> {
        let state = self.state.lock();
        state.active.iter().map(|id| state.servers[id.0].address).collect()
    }

    /// 隔离服务器地址快照
    pub fn quarantined_servers(&self) -> Vec<IpAddr> {
        let state = self.state.lock();
        state.quarantined.iter().map(|id| state.servers[id.0].address).collect()
    }

    /// 所有服务器的状态快照，按加载顺序
    pub fn snapshot(&self) -> Vec<ServerSnapshot> {
        let state = self.state.lock();
        state
            .servers
            .iter()
            .map(|entry| ServerSnapshot {
                address: entry.address,
                consecutive_failures: entry.consecutive_failures,
                last_used_at: entry.last_used_at,
                state: match entry.slot {
                    Slot::Active(_) => ServerState::Active,
                    Slot::Quarantined(_) => ServerState::Quarantined,
                },
            })
            .collect()
    }
}
