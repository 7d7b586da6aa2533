//! 规划-执行-恢复主循环
//!
//! Planning -> Executing -> {Recovering, Completing} -> Terminal。
//! 每个步骤开始前检查安全上限；done 立即结束；执行失败时带着执行记录重规划，
//! 用返回的步骤替换失败点之后的剩余计划。重规划失败是致命的，不再重试。
//! 最终快照由编排器发布，本循环只负责过程中的状态。

use std::time::Duration;

use crate::actions::StepDispatcher;
use crate::core::{RunContext, RunOutcome, RunState, RunStatus, StatusSnapshot, Work};
use crate::memory::Preferences;
use crate::planning::{Action, ContextGatherer, Plan, PlannerAdapter};

/// 被取消时的终止消息
pub const CANCELLED_MESSAGE: &str = "Cancelled.";

/// 一次计划执行所需的组件（均为借用，生命周期不超过一次运行）
pub struct PlanSession<'a> {
    pub planner: &'a PlannerAdapter,
    pub dispatcher: &'a StepDispatcher,
    pub gatherer: &'a dyn ContextGatherer,
    pub ctx: &'a RunContext,
    /// 成功步骤之间的停顿（wait / done 之后不停顿）
    pub pacing: Duration,
}

impl<'a> PlanSession<'a> {
    pub fn new(
        planner: &'a PlannerAdapter,
        dispatcher: &'a StepDispatcher,
        gatherer: &'a dyn ContextGatherer,
        ctx: &'a RunContext,
    ) -> Self {
        Self {
            planner,
            dispatcher,
            gatherer,
            ctx,
            pacing: Duration::ZERO,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }
}

fn cancelled(mut state: RunState) -> RunOutcome {
    state.terminate(RunStatus::Cancelled, CANCELLED_MESSAGE);
    state.into_outcome()
}

/// 执行一次完整的计划运行
pub async fn run_plan(
    session: &PlanSession<'_>,
    intent: &str,
    preferences: &Preferences,
) -> RunOutcome {
    let ctx = session.ctx;
    let ceiling = ctx.governor().max_steps();

    ctx.publish(StatusSnapshot::working(format!("Understanding: {}", intent)))
        .await;
    let context = session.gatherer.gather().await;

    ctx.publish(StatusSnapshot::working("Planning steps...")).await;
    let parsed = match ctx
        .cancellable(session.planner.plan(intent, &context, preferences))
        .await
    {
        None => return cancelled(RunState::new(Plan::bounded(Vec::new(), ceiling))),
        Some(Err(e)) => {
            tracing::error!(error = %e, "planning failed");
            let mut state = RunState::new(Plan::bounded(Vec::new(), ceiling));
            state.terminate(RunStatus::PlanningFailed, format!("Planning failed: {}", e));
            return state.into_outcome();
        }
        Some(Ok(parsed)) => parsed,
    };
    tracing::info!(steps = parsed.steps.len(), source = ?parsed.source, "plan ready");

    let mut state = RunState::new(Plan::bounded(parsed.steps, ceiling));
    if state.plan().is_empty() {
        state.terminate(RunStatus::NoSteps, "No steps planned.");
        return state.into_outcome();
    }
    if state.plan().overflowed() {
        tracing::warn!(ceiling, "plan truncated to step ceiling");
    }

    while !state.is_terminal() {
        if ctx.is_cancelled() {
            return cancelled(state);
        }
        let Some(step) = state.current_step().cloned() else {
            break;
        };
        if let Err(limit) = ctx.governor().check(state.index()) {
            tracing::warn!(step = state.index() + 1, %limit, "safety limit reached");
            state.exceed(limit);
            break;
        }
        if step.action == Action::Done {
            state.terminate(RunStatus::Completed, step.done_message());
            break;
        }

        let number = state.index() + 1;
        ctx.publish(StatusSnapshot::working_at(
            step.describe(),
            number,
            state.plan().len(),
        ))
        .await;

        match ctx.cancellable(session.dispatcher.dispatch(&step)).await {
            None => return cancelled(state),
            Some(Ok(summary)) => {
                tracing::info!(step = number, summary = %summary, "step done");
                let timing_only = step.action.is_timing_only();
                if !timing_only {
                    state.commit(Work::Step(step), summary);
                }
                state.advance();
                if !timing_only && !ctx.pause(session.pacing).await {
                    return cancelled(state);
                }
            }
            Some(Err(action_err)) => {
                tracing::warn!(step = number, error = %action_err, "step failed, re-planning");
                ctx.publish(StatusSnapshot::working("Re-planning after error..."))
                    .await;
                let context = session.gatherer.gather().await;
                let error = action_err.to_string();
                match ctx
                    .cancellable(session.planner.replan(intent, state.record(), &error, &context))
                    .await
                {
                    None => return cancelled(state),
                    Some(Ok(suffix)) => {
                        tracing::info!(steps = suffix.steps.len(), "replanned remaining steps");
                        state.splice_after_failure(suffix.steps);
                    }
                    Some(Err(replan_err)) => {
                        tracing::error!(error = %replan_err, "re-planning failed");
                        state.terminate(
                            RunStatus::Failed,
                            format!("Failed at step {}: {}", number, error),
                        );
                    }
                }
            }
        }
    }

    if !state.is_terminal() && state.plan().overflowed() {
        state.terminate(RunStatus::TooManySteps, "Too many steps.");
    }
    state.into_outcome()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::actions::{RecordingDesktop, Toolbox};
    use crate::core::{MemoryPublisher, ProcessLauncher, ProcessRegistry, SafetyGovernor};
    use crate::llm::ScriptedLlmClient;
    use crate::planning::{DesktopContextGatherer, PlannerSettings};

    struct Harness {
        desktop: Arc<RecordingDesktop>,
        publisher: Arc<MemoryPublisher>,
        ctx: RunContext,
        planner: PlannerAdapter,
        dispatcher: StepDispatcher,
        gatherer: DesktopContextGatherer,
    }

    fn harness(desktop: RecordingDesktop, replies: &[&str], max_steps: usize) -> Harness {
        let desktop = Arc::new(desktop);
        let publisher = Arc::new(MemoryPublisher::new());
        let ctx = RunContext::new(
            ProcessLauncher::default(),
            publisher.clone(),
            CancellationToken::new(),
            SafetyGovernor::new(max_steps, Duration::from_secs(60), ProcessRegistry::new()),
        );
        let llm = Arc::new(ScriptedLlmClient::replying(replies.iter().copied()));
        Harness {
            desktop: desktop.clone(),
            publisher,
            ctx,
            planner: PlannerAdapter::new(llm, PlannerSettings::default()),
            dispatcher: StepDispatcher::new(Toolbox::recording(desktop.clone()), 10.0),
            gatherer: DesktopContextGatherer::new(desktop),
        }
    }

    async fn run(h: &Harness, intent: &str) -> RunOutcome {
        let session = PlanSession::new(&h.planner, &h.dispatcher, &h.gatherer, &h.ctx);
        run_plan(&session, intent, &Preferences::new()).await
    }

    #[tokio::test]
    async fn test_done_mid_plan_stops_execution() {
        let h = harness(
            RecordingDesktop::new(),
            &[r#"[{"action":"open_app","params":{"name":"Notes"}},{"action":"done","params":{"message":"Early"}},{"action":"type_text","params":{"text":"x"}}]"#],
            20,
        );
        let outcome = run(&h, "open notes").await;
        assert_eq!(outcome.message, "Early");
        assert_eq!(h.desktop.calls(), vec!["open_app Notes"]);
    }

    #[tokio::test]
    async fn test_wait_is_not_recorded() {
        let h = harness(
            RecordingDesktop::new(),
            &[r#"[{"action":"wait","params":{"seconds":0}},{"action":"key_press","params":{"key":"return"}}]"#],
            20,
        );
        let outcome = run(&h, "press enter").await;
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.message, "Task complete.");
        assert_eq!(outcome.record.summaries(), vec!["Pressed return"]);
    }

    #[tokio::test]
    async fn test_oversized_plan_ends_with_too_many_steps() {
        let steps: Vec<String> = (0..5)
            .map(|i| format!(r#"{{"action":"type_text","params":{{"text":"t{}"}}}}"#, i))
            .collect();
        let reply = format!("[{}]", steps.join(","));
        let h = harness(RecordingDesktop::new(), &[reply.as_str()], 3);
        let outcome = run(&h, "type a lot").await;
        assert_eq!(outcome.status, RunStatus::TooManySteps);
        assert_eq!(outcome.message, "Too many steps.");
        assert_eq!(h.desktop.count("type_text"), 3);
    }

    #[tokio::test]
    async fn test_step_snapshots_carry_position() {
        let h = harness(
            RecordingDesktop::new(),
            &[r#"[{"action":"open_app","params":{"name":"Notes"}},{"action":"done"}]"#],
            20,
        );
        run(&h, "open notes").await;
        let snapshots = h.publisher.snapshots();
        assert_eq!(
            snapshots[0].message.as_deref(),
            Some("Understanding: open notes")
        );
        assert_eq!(snapshots[1].message.as_deref(), Some("Planning steps..."));
        assert_eq!(
            snapshots[2],
            StatusSnapshot::working_at("Opening Notes...", 1, 2)
        );
    }

    #[tokio::test]
    async fn test_planning_transport_failure_is_reported() {
        let h = harness(RecordingDesktop::new(), &[], 20);
        let outcome = run(&h, "anything").await;
        assert_eq!(outcome.status, RunStatus::PlanningFailed);
        assert!(outcome.message.starts_with("Planning failed: "));
        assert!(h.desktop.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_first_step() {
        let h = harness(
            RecordingDesktop::new(),
            &[r#"[{"action":"open_app","params":{"name":"Notes"}}]"#],
            20,
        );
        h.ctx.cancel_token().cancel();
        let outcome = run(&h, "open notes").await;
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(h.desktop.calls().is_empty());
    }
}
