//! 隔离服务器恢复任务

use super::pool::ServerPool;
use crate::{dns_debug, DnsError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// 后台恢复任务
///
/// 按固定间隔调用 `ServerPool::restore_eligible`，直到令牌被取消。
#[derive(Debug)]
pub struct RestoreTask {
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RestoreTask {
    /// 在当前tokio运行时上启动恢复任务
    ///
    /// 任务持有 `parent` 的子令牌，父令牌取消时任务随之退出。
    pub fn spawn(pool: Arc<ServerPool>, period: Duration, parent: &CancellationToken) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| DnsError::Config("Resolver must be created inside a tokio runtime".to_string()))?;

        let cancel = parent.child_token();
        let token = cancel.clone();

        let handle = runtime.spawn(async move {
            // 首次触发在一个周期之后
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let restored = pool.restore_eligible();
                        dns_debug!("恢复扫描完成，恢复 {} 个服务器", restored);
                    }
                }
            }

            dns_debug!("恢复任务已停止");
        });

        Ok(Self {
            cancel,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// 任务是否仍在运行
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// 停止任务并等待其退出
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for RestoreTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::strategy::SelectionStrategy;

    fn quarantined_pool() -> Arc<ServerPool> {
        let pool = Arc::new(ServerPool::new(SelectionStrategy::RoundRobin, 0, Duration::from_secs(60)));
        pool.load(["1.0.0.0", "2.0.0.0"]);
        let handle = pool.select().unwrap();
        assert!(pool.mark_failure(&handle));
        pool
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_task_restores_after_delay() {
        let pool = quarantined_pool();
        let root = CancellationToken::new();
        let task = RestoreTask::spawn(pool.clone(), Duration::from_secs(10), &root).unwrap();

        // 延迟尚未到达，仍在隔离中
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(pool.quarantined_len(), 1);

        // 第70秒的扫描时已闲置超过60秒
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(pool.quarantined_len(), 0);
        assert_eq!(pool.active_len(), 2);

        task.shutdown().await;
        assert!(!task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_stops_task() {
        let pool = quarantined_pool();
        let root = CancellationToken::new();
        let task = RestoreTask::spawn(pool, Duration::from_secs(1), &root).unwrap();
        assert!(task.is_running());

        root.cancel();
        task.shutdown().await;
        assert!(!task.is_running());
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let pool = Arc::new(ServerPool::new(SelectionStrategy::Random, 1, Duration::from_secs(1)));
        let result = RestoreTask::spawn(pool, Duration::from_secs(1), &CancellationToken::new());
        assert!(matches!(result, Err(DnsError::Config(_))));
    }
}
