//! 单次运行的上下文
//!
//! 取代全局单例：运行 ID、进程登记、状态发布、取消信号与安全上限都挂在这里，由编排器创建并传给各个组件。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::{ProcessLauncher, SafetyGovernor, StatePublisher, StatusSnapshot};

pub struct RunContext {
    pub run_id: Uuid,
    launcher: ProcessLauncher,
    publisher: Arc<dyn StatePublisher>,
    cancel: CancellationToken,
    governor: Arc<SafetyGovernor>,
}

impl RunContext {
    pub fn new(
        launcher: ProcessLauncher,
        publisher: Arc<dyn StatePublisher>,
        cancel: CancellationToken,
        governor: SafetyGovernor,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            launcher,
            publisher,
            cancel,
            governor: Arc::new(governor),
        }
    }

    pub fn launcher(&self) -> &ProcessLauncher {
        &self.launcher
    }

    /// 登记一个不经 launcher 启动的外部进程
    pub fn register_process(&self, pid: u32) {
        self.launcher.registry().register(pid);
    }

    pub fn governor(&self) -> &Arc<SafetyGovernor> {
        &self.governor
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 与取消信号竞速：已取消时返回 None，进行中的工作被丢弃
    pub async fn cancellable<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// 可被取消的停顿；被取消时返回 false
    pub async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }
        self.cancellable(tokio::time::sleep(duration)).await.is_some()
    }

    pub fn publisher(&self) -> Arc<dyn StatePublisher> {
        Arc::clone(&self.publisher)
    }

    pub async fn publish(&self, snapshot: StatusSnapshot) {
        tracing::debug!(run_id = %self.run_id, phase = ?snapshot.phase, message = ?snapshot.message, "status");
        self.publisher.publish(&snapshot).await;
    }
}
