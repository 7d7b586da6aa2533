//! 状态发布
//!
//! FileStatePublisher 把 StatusSnapshot 写成单个 JSON 文件：先写临时文件再 rename，
//! 并发读取的 UI 不会看到写了一半的内容。发布失败只记日志，绝不中断运行。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::StatusSnapshot;

#[async_trait]
pub trait StatePublisher: Send + Sync {
    async fn publish(&self, snapshot: &StatusSnapshot);
}

/// 原子写文件
#[derive(Debug, Clone)]
pub struct FileStatePublisher {
    path: PathBuf,
}

impl FileStatePublisher {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, snapshot: &StatusSnapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(snapshot)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StatePublisher for FileStatePublisher {
    async fn publish(&self, snapshot: &StatusSnapshot) {
        if let Err(e) = self.write(snapshot).await {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to publish status");
        }
    }
}

#[derive(Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl StatePublisher for NoopPublisher {
    async fn publish(&self, _snapshot: &StatusSnapshot) {}
}

/// 把每次发布的快照留在内存里，便于检查发布序列
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    snapshots: Mutex<Vec<StatusSnapshot>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<StatusSnapshot> {
        self.snapshots.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<StatusSnapshot> {
        self.snapshots.lock().ok().and_then(|s| s.last().cloned())
    }
}

#[async_trait]
impl StatePublisher for MemoryPublisher {
    async fn publish(&self, snapshot: &StatusSnapshot) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(snapshot.clone());
        }
    }
}

/// 读取状态文件；文件不存在或内容无效时返回 None
pub fn read_state(path: &Path) -> Option<StatusSnapshot> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}
