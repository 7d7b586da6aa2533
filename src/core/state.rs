//! 状态定义：对外发布的 StatusSnapshot 与单次运行的内部控制块 RunState
//!
//! UI 只读取轻量的 StatusSnapshot（阶段、消息、步数）；RunState 由执行循环独占，不跨运行共享。

use serde::{Deserialize, Serialize};

use crate::core::LimitExceeded;
use crate::planning::{Plan, Step};

/// UI 可见的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusPhase {
    #[default]
    Idle,
    Working,
    Complete,
    Listening,
}

/// 写入状态文件的快照：`{state, message?, step?, total_steps?}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatusSnapshot {
    #[serde(rename = "state")]
    pub phase: StatusPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,
}

impl StatusSnapshot {
    pub fn working(message: impl Into<String>) -> Self {
        Self {
            phase: StatusPhase::Working,
            message: Some(message.into()),
            step: None,
            total_steps: None,
        }
    }

    /// step 为 1 起始的序号
    pub fn working_at(message: impl Into<String>, step: usize, total_steps: usize) -> Self {
        Self {
            phase: StatusPhase::Working,
            message: Some(message.into()),
            step: Some(step),
            total_steps: Some(total_steps),
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            phase: StatusPhase::Complete,
            message: Some(message.into()),
            step: None,
            total_steps: None,
        }
    }

    pub fn idle() -> Self {
        Self::default()
    }
}

/// 已完成的一个工作单元：计划步骤，或 supervisor 派发给某个 agent 的任务
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Work {
    Step(Step),
    Agent { agent: String, task: String },
}

/// 执行记录中的一条
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordEntry {
    #[serde(flatten)]
    pub work: Work,
    pub summary: String,
}

/// 只追加的执行记录：既是重规划的上下文，也是最终报告
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExecutionRecord {
    entries: Vec<RecordEntry>,
}

impl ExecutionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, work: Work, summary: impl Into<String>) {
        self.entries.push(RecordEntry {
            work,
            summary: summary.into(),
        });
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summaries(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.summary.as_str()).collect()
    }

    /// 以缩进 JSON 呈现，供重规划 prompt 使用
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }
}

/// 运行终态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// 计划走完或遇到 done
    Completed,
    /// 规划器返回空计划
    NoSteps,
    /// 初次规划请求失败（消息中给出原因）
    PlanningFailed,
    /// 重规划失败（致命）
    Failed,
    TimedOut,
    TooManySteps,
    Cancelled,
}

/// 单次运行的最终结果
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub message: String,
    pub record: ExecutionRecord,
}

/// 单次运行的可变控制块：当前下标、计划、执行记录、重试计数、终止标记与最终消息
#[derive(Debug)]
pub struct RunState {
    index: usize,
    plan: Plan,
    record: ExecutionRecord,
    retry_count: u32,
    terminal: Option<RunStatus>,
    final_message: Option<String>,
}

impl RunState {
    pub fn new(plan: Plan) -> Self {
        Self {
            index: 0,
            plan,
            record: ExecutionRecord::new(),
            retry_count: 0,
            terminal: None,
            final_message: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn record(&self) -> &ExecutionRecord {
        &self.record
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.plan.get(self.index)
    }

    /// 下标只增不减，且不超过计划长度
    pub fn advance(&mut self) {
        if self.index < self.plan.len() {
            self.index += 1;
        }
    }

    pub fn commit(&mut self, work: Work, summary: impl Into<String>) {
        self.record.push(work, summary);
    }

    /// 用重规划结果替换失败步骤之后的全部步骤，并越过失败步骤
    pub fn splice_after_failure(&mut self, suffix: Vec<Step>) {
        self.plan.splice_after(self.index, suffix);
        self.advance();
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn bump_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
    }

    pub fn set_final_message(&mut self, message: impl Into<String>) {
        self.final_message = Some(message.into());
    }

    pub fn final_message(&self) -> Option<&str> {
        self.final_message.as_deref()
    }

    pub fn terminate(&mut self, status: RunStatus, message: impl Into<String>) {
        self.terminal = Some(status);
        self.final_message = Some(message.into());
    }

    /// 安全上限触顶：正常终止，不是错误
    pub fn exceed(&mut self, limit: LimitExceeded) {
        let status = match limit {
            LimitExceeded::Steps(_) => RunStatus::TooManySteps,
            LimitExceeded::Time(_) => RunStatus::TimedOut,
        };
        self.terminate(status, limit.user_message());
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.terminal
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// 收尾：未显式终止时视为正常完成，消息默认 "Task complete."
    pub fn into_outcome(self) -> RunOutcome {
        RunOutcome {
            status: self.terminal.unwrap_or(RunStatus::Completed),
            message: self
                .final_message
                .unwrap_or_else(|| crate::planning::DEFAULT_DONE_MESSAGE.to_string()),
            record: self.record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::Action;

    fn plan(actions: &[&str]) -> Plan {
        Plan::bounded(
            actions.iter().map(|a| Step::new(Action::parse(a))).collect(),
            20,
        )
    }

    #[test]
    fn test_snapshot_serializes_optional_fields_only_when_set() {
        let json = serde_json::to_value(StatusSnapshot::idle()).unwrap();
        assert_eq!(json, serde_json::json!({"state": "idle"}));

        let json = serde_json::to_value(StatusSnapshot::working_at("Opening Notes...", 1, 2)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "working", "message": "Opening Notes...", "step": 1, "total_steps": 2})
        );
    }

    #[test]
    fn test_advance_never_passes_plan_end() {
        let mut state = RunState::new(plan(&["open_app"]));
        state.advance();
        state.advance();
        assert_eq!(state.index(), 1);
        assert!(state.current_step().is_none());
    }

    #[test]
    fn test_splice_keeps_committed_record() {
        let mut state = RunState::new(plan(&["open_app", "type_text", "key_press"]));
        state.commit(Work::Step(state.current_step().unwrap().clone()), "Opened Notes");
        state.advance();
        let before = state.record().clone();

        state.splice_after_failure(vec![Step::new(Action::Done)]);
        assert_eq!(state.index(), 2);
        assert_eq!(state.plan().len(), 3);
        assert_eq!(state.current_step().unwrap().action, Action::Done);
        assert_eq!(state.record(), &before);
    }

    #[test]
    fn test_exceed_maps_limit_to_status() {
        let mut state = RunState::new(plan(&["open_app"]));
        state.exceed(LimitExceeded::Time(60));
        let outcome = state.into_outcome();
        assert_eq!(outcome.status, RunStatus::TimedOut);
        assert_eq!(outcome.message, "Timed out.");
    }

    #[test]
    fn test_outcome_defaults_to_task_complete() {
        let state = RunState::new(plan(&[]));
        let outcome = state.into_outcome();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.message, "Task complete.");
    }
}
