//! Files agent：打开、创建、移动、复制、搜索、列目录、建目录

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::automation::expand_home;
use crate::actions::{AppControl, ShellControl};
use crate::agents::{quote_arg, Agent, AgentTask};
use crate::core::ActionError;
use crate::planning::Params;

/// 搜索结果最多计入的条数
const MAX_SEARCH_RESULTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileCommand {
    Open(String),
    Create { path: String, content: String },
    Move { from: String, to: String },
    Copy { from: String, to: String },
    Search(String),
    List(String),
    MakeDir(String),
}

/// 按参数分发：显式 action 优先，其次看 path / content / destination / query 的组合
pub fn from_params(params: &Params) -> Option<FileCommand> {
    let path = params.text("path");
    let destination = params.text("destination");
    let content = params.text("content");
    let query = params.text("query");
    let action = params.text("action").unwrap_or("");

    if action == "open" || (path.is_some() && content.is_none() && destination.is_none()) {
        if let Some(path) = path {
            return Some(FileCommand::Open(path.to_string()));
        }
    }
    if action == "create" || (path.is_some() && content.is_some()) {
        if let Some(path) = path {
            return Some(FileCommand::Create {
                path: path.to_string(),
                content: content.unwrap_or("").to_string(),
            });
        }
    }
    if let (Some(from), Some(to)) = (path, destination) {
        let (from, to) = (from.to_string(), to.to_string());
        return Some(if action == "copy" {
            FileCommand::Copy { from, to }
        } else {
            FileCommand::Move { from, to }
        });
    }
    if action == "search" || query.is_some() {
        if let Some(term) = query.or(path) {
            return Some(FileCommand::Search(term.to_string()));
        }
    }
    match action {
        "list" | "ls" => Some(FileCommand::List(path.unwrap_or(".").to_string())),
        "mkdir" => path.map(|p| FileCommand::MakeDir(p.to_string())),
        _ => None,
    }
}

/// 从任务文本推断：含 search / find 时用最后一个词作搜索词
pub fn infer_from_task(task: &str) -> Option<FileCommand> {
    let lower = task.to_lowercase();
    if !(lower.contains("search") || lower.contains("find")) {
        return None;
    }
    task.split_whitespace()
        .last()
        .map(|w| w.trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '?'))
        .filter(|w| !w.is_empty())
        .map(|w| FileCommand::Search(w.to_string()))
}

/// 命令不经 shell 执行，`~` 需要先展开
fn path_arg(path: &str) -> String {
    quote_arg(&expand_home(path).to_string_lossy())
}

pub struct FilesAgent {
    apps: Arc<dyn AppControl>,
    shell: Arc<dyn ShellControl>,
}

impl FilesAgent {
    pub fn new(apps: Arc<dyn AppControl>, shell: Arc<dyn ShellControl>) -> Self {
        Self { apps, shell }
    }

    async fn apply(&self, command: FileCommand) -> Result<String, ActionError> {
        match command {
            FileCommand::Open(path) => {
                self.apps.open_file(&path).await?;
                Ok(format!("Opened {}", path))
            }
            FileCommand::Create { path, content } => {
                let expanded = expand_home(&path);
                if let Some(parent) = expanded.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&expanded, content).await?;
                Ok(format!("Created {}", path))
            }
            FileCommand::Move { from, to } => {
                self.shell
                    .run_command(&format!("mv {} {}", path_arg(&from), path_arg(&to)))
                    .await?;
                Ok(format!("Moved {} to {}", from, to))
            }
            FileCommand::Copy { from, to } => {
                self.shell
                    .run_command(&format!("cp {} {}", path_arg(&from), path_arg(&to)))
                    .await?;
                Ok(format!("Copied {} to {}", from, to))
            }
            FileCommand::Search(term) => {
                let output = self
                    .shell
                    .run_command(&format!("mdfind {}", quote_arg(&term)))
                    .await?;
                let found = output
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .take(MAX_SEARCH_RESULTS)
                    .count();
                Ok(format!("Found {} files matching '{}'", found, term))
            }
            FileCommand::List(target) => {
                let output = self
                    .shell
                    .run_command(&format!("ls {}", path_arg(&target)))
                    .await?;
                Ok(format!("Directory listing of {}:\n{}", target, output.trim_end()))
            }
            FileCommand::MakeDir(path) => {
                tokio::fs::create_dir_all(expand_home(&path)).await?;
                Ok(format!("Created directory {}", path))
            }
        }
    }
}

#[async_trait]
impl Agent for FilesAgent {
    fn name(&self) -> &'static str {
        "files"
    }

    async fn execute(&self, task: &AgentTask<'_>) -> Result<String, ActionError> {
        let command = from_params(task.params).or_else(|| infer_from_task(task.task));
        match command {
            Some(command) => self.apply(command).await,
            None => Ok(format!("Files task handled: {}", task.task)),
        }
    }
}
