//! 子进程登记与受控启动
//!
//! 所有执行器都必须经 ProcessLauncher 启动外部进程：spawn 时登记 PID，进程结束（或超时被杀）时注销。
//! 等待中的 future 被取消丢弃时不杀进程也不注销，PID 留在登记表里，
//! 由 SafetyGovernor 在清理阶段逐个发送 SIGTERM。

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::Command;

use crate::core::ActionError;

/// 当前运行中登记的子进程集合
#[derive(Clone, Debug, Default)]
pub struct ProcessRegistry {
    pids: Arc<Mutex<HashSet<u32>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pid: u32) {
        if let Ok(mut pids) = self.pids.lock() {
            pids.insert(pid);
        }
    }

    pub fn release(&self, pid: u32) {
        if let Ok(mut pids) = self.pids.lock() {
            pids.remove(&pid);
        }
    }

    pub fn pids(&self) -> Vec<u32> {
        self.pids
            .lock()
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.lock().map(|p| p.is_empty()).unwrap_or(true)
    }

    fn track(&self, pid: u32) -> Registration {
        self.register(pid);
        Registration {
            registry: self.clone(),
            pid,
            finished: false,
        }
    }

    /// 向每个登记的进程发送 SIGTERM 并注销，返回成功发送的个数。尽力而为：忽略信号的进程不会被强杀
    pub fn terminate_all(&self) -> usize {
        let mut signalled = 0;
        for pid in self.pids() {
            if send_terminate(pid) {
                tracing::info!(pid, "sent SIGTERM to child process");
                signalled += 1;
            } else {
                tracing::debug!(pid, "child process already gone");
            }
            self.release(pid);
        }
        signalled
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill 只发送信号，不触碰本进程内存
    unsafe { libc::kill(pid, signal) == 0 }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> bool {
    send_signal(pid, libc::SIGTERM)
}

#[cfg(unix)]
fn send_kill(pid: u32) -> bool {
    send_signal(pid, libc::SIGKILL)
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> bool {
    false
}

#[cfg(not(unix))]
fn send_kill(_pid: u32) -> bool {
    false
}

/// 登记守卫：等待结束（包括超时）时 finish 注销；未 finish 就被丢弃说明等待被取消，PID 保留给清理阶段
struct Registration {
    registry: ProcessRegistry,
    pid: u32,
    finished: bool,
}

impl Registration {
    fn finish(&mut self) {
        self.registry.release(self.pid);
        self.finished = true;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(pid = self.pid, "wait abandoned, child left for cleanup");
        }
    }
}

/// 子进程输出
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// 非零退出码转成 ActionError，带上 stderr
    pub fn into_result(self, program: &str) -> Result<String, ActionError> {
        if self.success {
            Ok(self.stdout.trim().to_string())
        } else {
            Err(ActionError::Command(format!(
                "{} failed (exit {}): {}",
                program,
                self.code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()),
                self.stderr.trim()
            )))
        }
    }
}

/// 受控启动器：超时时杀掉子进程并注销；被取消时子进程保持登记，等待 SafetyGovernor 终止
#[derive(Clone, Debug, Default)]
pub struct ProcessLauncher {
    registry: ProcessRegistry,
}

impl ProcessLauncher {
    pub fn new(registry: ProcessRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub async fn output(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ActionError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // 没有信号可用的平台上只能靠 drop 时强杀
            .kill_on_drop(cfg!(not(unix)));

        let child = cmd.spawn().map_err(|e| ActionError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;
        let mut registration = child.id().map(|pid| self.registry.track(pid));

        let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;
        if let Some(registration) = registration.as_mut() {
            if waited.is_err() && send_kill(registration.pid) {
                tracing::warn!(program, pid = registration.pid, "killed timed-out child process");
            }
            registration.finish();
        }

        let output = waited
            .map_err(|_| ActionError::Timeout {
                program: program.to_string(),
                secs: timeout.as_secs(),
            })??;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
