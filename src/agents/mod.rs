//! Supervisor / Router 变体
//!
//! 节点集合 {supervisor, web, system, files, gui, done}：supervisor 每轮向规划器要一个路由决策，
//! router 把标签映射到下一个节点（词表外一律 done），agent 执行一个任务后无条件回到 supervisor。
//! 每个 agent 先按参数做确定性分发，参数缺失时才走独立的任务文本推断。

pub mod files;
pub mod gui;
pub mod supervisor;
pub mod system;
pub mod web;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::actions::Toolbox;
use crate::core::{ActionError, RunContext, StatusSnapshot};
use crate::planning::Params;

pub use files::FilesAgent;
pub use gui::GuiAgent;
pub use supervisor::{run_supervisor, SupervisorSession};
pub use system::SystemAgent;
pub use web::WebAgent;

/// 状态机节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Supervisor,
    Web,
    System,
    Files,
    Gui,
    Done,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Web => "web",
            Self::System => "system",
            Self::Files => "files",
            Self::Gui => "gui",
            Self::Done => "done",
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, Self::Web | Self::System | Self::Files | Self::Gui)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 路由：词表外的标签（包括空串、大小写不符）一律去 done，状态机永远有出边
pub fn route(tag: &str) -> Node {
    match tag {
        "supervisor" => Node::Supervisor,
        "web" => Node::Web,
        "system" => Node::System,
        "files" => Node::Files,
        "gui" => Node::Gui,
        _ => Node::Done,
    }
}

/// 交给 agent 的一项任务
#[derive(Debug, Clone, Copy)]
pub struct AgentTask<'a> {
    pub task: &'a str,
    pub params: &'a Params,
    /// 用户原始请求，部分推断会回退到它
    pub intent: &'a str,
}

/// agent 执行后回传给 supervisor 的增量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDelta {
    pub summary: Option<String>,
    pub error: Option<String>,
}

impl AgentDelta {
    pub fn ok(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            summary: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, task: &AgentTask<'_>) -> Result<String, ActionError>;
}

/// 统一包装：发布 "[agent] task" 状态、记日志，把错误收敛为 "{agent} failed: {e}"
pub async fn run_agent(
    agent: &dyn Agent,
    task: &AgentTask<'_>,
    ctx: &RunContext,
    step: usize,
    total_steps: usize,
) -> AgentDelta {
    let name = agent.name();
    ctx.publish(StatusSnapshot::working_at(
        format!("[{}] {}", name, task.task),
        step,
        total_steps,
    ))
    .await;

    match agent.execute(task).await {
        Ok(summary) => {
            tracing::info!(agent = name, summary = %summary, "agent done");
            AgentDelta::ok(summary)
        }
        Err(e) => {
            let error = format!("{} failed: {}", name, e);
            tracing::warn!(agent = name, error = %e, "agent failed");
            AgentDelta::failed(error)
        }
    }
}

/// 四个 agent 的集合
pub struct AgentSet {
    web: WebAgent,
    system: SystemAgent,
    files: FilesAgent,
    gui: GuiAgent,
}

impl AgentSet {
    /// settle：打开页面、切换应用等动作之后留给界面响应的时间
    pub fn from_toolbox(toolbox: &Toolbox, settle: Duration) -> Self {
        Self {
            web: WebAgent::new(toolbox.browser.clone()).with_settle(settle),
            system: SystemAgent::new(toolbox.apps.clone(), toolbox.shell.clone()),
            files: FilesAgent::new(toolbox.apps.clone(), toolbox.shell.clone()),
            gui: GuiAgent::new(toolbox.apps.clone(), toolbox.input.clone()).with_settle(settle),
        }
    }

    pub fn get(&self, node: Node) -> Option<&dyn Agent> {
        match node {
            Node::Web => Some(&self.web),
            Node::System => Some(&self.system),
            Node::Files => Some(&self.files),
            Node::Gui => Some(&self.gui),
            Node::Supervisor | Node::Done => None,
        }
    }
}

/// 给 shell 命令中的路径加引号：整体用双引号包裹，内嵌的双引号改成相邻的 '"' 片段
pub(crate) fn quote_arg(arg: &str) -> String {
    format!("\"{}\"", arg.replace('"', "\"'\"'\""))
}
