//! 安全上限与进程清理
//!
//! SafetyGovernor 持有步数上限与总时长上限，由执行循环 / supervisor 循环在每个工作单元开始前检查，
//! 从不在步骤中途打断。取消时先向登记的子进程逐个发送 SIGTERM，再向本进程组发送 SIGTERM 以覆盖未登记的子孙进程。
//! 这是尽力而为的清理：忽略 SIGTERM 的进程不会被强杀。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::core::{LimitExceeded, ProcessRegistry};

/// 本进程是否已成为独立进程组的组长（只有此时才向整个组发信号）
static OWNS_PROCESS_GROUP: AtomicBool = AtomicBool::new(false);

pub struct SafetyGovernor {
    max_steps: usize,
    max_duration: Duration,
    started: Instant,
    processes: ProcessRegistry,
}

impl SafetyGovernor {
    pub fn new(max_steps: usize, max_duration: Duration, processes: ProcessRegistry) -> Self {
        Self {
            max_steps,
            max_duration,
            started: Instant::now(),
            processes,
        }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 开始第 `unit_index` 个（0 起始）工作单元前的检查：先查总时长，再查步数
    pub fn check(&self, unit_index: usize) -> Result<(), LimitExceeded> {
        if self.elapsed() > self.max_duration {
            return Err(LimitExceeded::Time(self.max_duration.as_secs()));
        }
        if unit_index >= self.max_steps {
            return Err(LimitExceeded::Steps(self.max_steps));
        }
        Ok(())
    }

    /// 让本进程成为新进程组的组长，之后启动的子进程都在这个组里。进程启动时调用一次
    #[cfg(unix)]
    pub fn adopt_process_group() -> bool {
        // SAFETY: setpgid(0, 0) 只修改本进程的进程组
        let ok = unsafe { libc::setpgid(0, 0) } == 0;
        if ok {
            OWNS_PROCESS_GROUP.store(true, Ordering::SeqCst);
        } else {
            tracing::warn!("could not create a dedicated process group; group cleanup disabled");
        }
        ok
    }

    #[cfg(not(unix))]
    pub fn adopt_process_group() -> bool {
        false
    }

    pub fn owns_process_group() -> bool {
        OWNS_PROCESS_GROUP.load(Ordering::SeqCst)
    }

    /// 取消时的清理：登记的子进程 -> 整个进程组。返回收到信号的登记进程数
    pub fn terminate(&self) -> usize {
        let signalled = self.processes.terminate_all();
        if Self::owns_process_group() {
            signal_process_group();
        }
        tracing::info!(signalled, "terminated tracked child processes");
        signalled
    }
}

/// 本进程自己也会收到这个 SIGTERM，由已安装的信号处理器吸收
#[cfg(unix)]
fn signal_process_group() {
    // SAFETY: 只发送信号
    let rc = unsafe { libc::killpg(libc::getpgrp(), libc::SIGTERM) };
    if rc != 0 {
        tracing::warn!("failed to signal process group");
    }
}

#[cfg(not(unix))]
fn signal_process_group() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_ceiling() {
        let governor = SafetyGovernor::new(3, Duration::from_secs(60), ProcessRegistry::new());
        assert!(governor.check(0).is_ok());
        assert!(governor.check(2).is_ok());
        assert_eq!(governor.check(3), Err(LimitExceeded::Steps(3)));
    }

    #[test]
    fn test_time_ceiling_checked_first() {
        let governor = SafetyGovernor::new(3, Duration::ZERO, ProcessRegistry::new());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(governor.check(10), Err(LimitExceeded::Time(0)));
    }

    #[test]
    fn test_terminate_without_group_only_touches_registry() {
        let governor = SafetyGovernor::new(3, Duration::from_secs(1), ProcessRegistry::new());
        assert!(!SafetyGovernor::owns_process_group());
        assert_eq!(governor.terminate(), 0);
    }
}
