//! 信号驱动的取消与清理
//!
//! ShutdownManager 监听 Ctrl+C、SIGTERM、SIGHUP，触发后取消 CancellationToken；执行循环看到取消后放弃当前工作，
//! 由 ShutdownCoordinator 依次执行清理任务（终止子进程、把状态置为 idle），每个任务有独立超时。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::core::{SafetyGovernor, StatePublisher, StatusSnapshot};

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Terminate,
    /// SIGHUP
    HangUp,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            shutdown_token: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 获取关闭 token（用于取消正在进行的运行）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        let _ = self.reason_tx.send(reason);
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM, SIGHUP)
    ///
    /// 向进程组发 SIGTERM 时本进程也会收到，这里的处理器保证它只是再次触发取消而不会杀死自己。
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, cancelling run...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            for (kind, reason, label) in [
                (SignalKind::terminate(), ShutdownReason::Terminate, "SIGTERM"),
                (SignalKind::hangup(), ShutdownReason::HangUp, "SIGHUP"),
            ] {
                let manager = Arc::clone(self);
                match signal(kind) {
                    Ok(mut stream) => {
                        tokio::spawn(async move {
                            while stream.recv().await.is_some() {
                                if !manager.is_shutdown() {
                                    tracing::info!("Received {}, cancelling run...", label);
                                }
                                manager.shutdown(reason.clone());
                            }
                        });
                    }
                    Err(e) => tracing::warn!("failed to install {} handler: {}", label, e),
                }
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭时需要执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 关闭协调器：按注册顺序执行清理任务
pub struct ShutdownCoordinator {
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    /// 单个清理任务的超时时间
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            cleanup_tasks: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    pub fn len(&self) -> usize {
        self.cleanup_tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cleanup_tasks.is_empty()
    }

    pub async fn run_cleanup(&self) {
        tracing::info!("Running {} cleanup tasks...", self.cleanup_tasks.len());

        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(self.timeout, task.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::info!("Cleanup task '{}' completed", name);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Cleanup task '{}' failed: {}", name, e);
                }
                Err(_) => {
                    tracing::warn!(
                        "Cleanup task '{}' timed out after {}ms",
                        name,
                        self.timeout.as_millis()
                    );
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// 终止登记的子进程与进程组
pub struct ProcessCleanup {
    governor: Arc<SafetyGovernor>,
}

impl ProcessCleanup {
    pub fn new(governor: Arc<SafetyGovernor>) -> Self {
        Self { governor }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for ProcessCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.governor.terminate();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ChildProcesses"
    }
}

/// 把状态文件置为 idle
pub struct IdleStatusCleanup {
    publisher: Arc<dyn StatePublisher>,
}

impl IdleStatusCleanup {
    pub fn new(publisher: Arc<dyn StatePublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for IdleStatusCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.publisher.publish(&StatusSnapshot::idle()).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "IdleStatus"
    }
}
