//! Supervisor 循环
//!
//! supervisor 节点每轮只做一次路由请求；路由请求失败时计入重试，未超过上限就自环重来，
//! 超过上限则以失败消息结束。agent 节点执行后无条件回到 supervisor，并把摘要或错误带回去。
//! 安全上限在每个工作单元（路由或 agent 任务）开始前检查。

use crate::agents::{route, run_agent, AgentSet, AgentTask, Node};
use crate::core::{RunContext, RunOutcome, RunState, RunStatus, StatusSnapshot, Work};
use crate::memory::Preferences;
use crate::planning::{
    ContextGatherer, Plan, PlannerAdapter, RouteInput, RoutingDecision, CANCELLED_MESSAGE,
    DEFAULT_DONE_MESSAGE,
};

pub struct SupervisorSession<'a> {
    pub planner: &'a PlannerAdapter,
    pub agents: &'a AgentSet,
    pub gatherer: &'a dyn ContextGatherer,
    pub ctx: &'a RunContext,
    /// 连续路由失败的重试上限
    pub max_retries: u32,
}

fn cancelled(mut state: RunState) -> RunOutcome {
    state.terminate(RunStatus::Cancelled, CANCELLED_MESSAGE);
    state.into_outcome()
}

/// 以 supervisor 为入口跑完整个状态机
pub async fn run_supervisor(
    session: &SupervisorSession<'_>,
    intent: &str,
    preferences: &Preferences,
) -> RunOutcome {
    let ctx = session.ctx;
    let governor = ctx.governor();
    let total = governor.max_steps();
    let mut state = RunState::new(Plan::bounded(Vec::new(), total));

    ctx.publish(StatusSnapshot::working(format!("Understanding: {}", intent)))
        .await;

    let mut node = Node::Supervisor;
    let mut pending: Option<RoutingDecision> = None;
    let mut last_error: Option<String> = None;
    // 已执行的 agent 任务数
    let mut units = 0usize;

    while !state.is_terminal() {
        if ctx.is_cancelled() {
            return cancelled(state);
        }
        if let Err(limit) = governor.check(units) {
            tracing::warn!(units, %limit, "safety limit reached");
            state.exceed(limit);
            break;
        }

        match node {
            Node::Supervisor => {
                ctx.publish(StatusSnapshot::working("Deciding next step...")).await;
                let context = session.gatherer.gather().await;
                let input = RouteInput {
                    intent,
                    context: &context,
                    preferences,
                    completed: state.record(),
                    error: last_error.as_deref(),
                };
                let routed = match ctx.cancellable(session.planner.route(&input)).await {
                    None => return cancelled(state),
                    Some(routed) => routed,
                };

                match routed {
                    Err(e) => {
                        tracing::warn!(error = %e, retry = state.retry_count(), "routing failed");
                        if state.retry_count() < session.max_retries {
                            state.bump_retry();
                            last_error = Some(e.to_string());
                        } else {
                            state.terminate(
                                RunStatus::Failed,
                                format!("Failed after {} retries: {}", session.max_retries, e),
                            );
                        }
                    }
                    Ok(parsed) => {
                        let decision = parsed.decision;
                        let next = route(&decision.agent);
                        tracing::info!(
                            agent = %decision.agent,
                            node = %next,
                            task = %decision.task,
                            source = ?parsed.source,
                            "routing decision"
                        );
                        match next {
                            Node::Done => {
                                state.terminate(
                                    RunStatus::Completed,
                                    decision
                                        .params
                                        .text("message")
                                        .unwrap_or(DEFAULT_DONE_MESSAGE),
                                );
                            }
                            // 显式自环也消耗一次重试，防止无限空转
                            Node::Supervisor => {
                                if state.retry_count() < session.max_retries {
                                    state.bump_retry();
                                } else {
                                    state.terminate(
                                        RunStatus::Failed,
                                        format!(
                                            "Failed after {} retries: planner kept deferring",
                                            session.max_retries
                                        ),
                                    );
                                }
                            }
                            agent => {
                                state.reset_retries();
                                last_error = None;
                                pending = Some(decision);
                                node = agent;
                            }
                        }
                    }
                }
            }
            agent_node => {
                let Some(decision) = pending.take() else {
                    node = Node::Supervisor;
                    continue;
                };
                let Some(agent) = session.agents.get(agent_node) else {
                    node = Node::Supervisor;
                    continue;
                };
                units += 1;
                let task = AgentTask {
                    task: &decision.task,
                    params: &decision.params,
                    intent,
                };
                let delta = match ctx
                    .cancellable(run_agent(agent, &task, ctx, units, total))
                    .await
                {
                    None => return cancelled(state),
                    Some(delta) => delta,
                };
                match (delta.summary, delta.error) {
                    (Some(summary), _) => {
                        state.commit(
                            Work::Agent {
                                agent: agent.name().to_string(),
                                task: decision.task.clone(),
                            },
                            summary,
                        );
                        last_error = None;
                    }
                    (None, error) => last_error = error,
                }
                node = Node::Supervisor;
            }
        }
    }

    state.into_outcome()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::actions::{RecordingDesktop, Toolbox};
    use crate::core::{NoopPublisher, ProcessLauncher, ProcessRegistry, SafetyGovernor};
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::planning::{DesktopContextGatherer, PlannerSettings};

    async fn run(
        desktop: RecordingDesktop,
        replies: Vec<Result<String, LlmError>>,
        max_steps: usize,
    ) -> (RunOutcome, Arc<RecordingDesktop>, Arc<ScriptedLlmClient>) {
        let desktop = Arc::new(desktop);
        let llm = Arc::new(ScriptedLlmClient::new(replies));
        let ctx = RunContext::new(
            ProcessLauncher::default(),
            Arc::new(NoopPublisher),
            CancellationToken::new(),
            SafetyGovernor::new(max_steps, Duration::from_secs(60), ProcessRegistry::new()),
        );
        let planner = PlannerAdapter::new(llm.clone(), PlannerSettings::default());
        let agents = AgentSet::from_toolbox(&Toolbox::recording(desktop.clone()), Duration::ZERO);
        let gatherer = DesktopContextGatherer::new(desktop.clone());
        let session = SupervisorSession {
            planner: &planner,
            agents: &agents,
            gatherer: &gatherer,
            ctx: &ctx,
            max_retries: 2,
        };
        let outcome = run_supervisor(&session, "search for rust", &Preferences::new()).await;
        (outcome, desktop, llm)
    }

    fn ok(s: &str) -> Result<String, LlmError> {
        Ok(s.to_string())
    }

    #[tokio::test]
    async fn test_routes_agent_then_done() {
        let (outcome, desktop, llm) = run(
            RecordingDesktop::new(),
            vec![
                ok(r#"{"agent":"web","task":"search","params":{"query":"rust"}}"#),
                ok(r#"{"agent":"done","task":"","params":{"message":"Searched"}}"#),
            ],
            20,
        )
        .await;
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.message, "Searched");
        assert_eq!(outcome.record.summaries(), vec!["Searched for 'rust'"]);
        assert_eq!(desktop.calls(), vec!["search rust"]);
        assert!(llm.requests()[1]
            .user_message
            .contains("Steps completed so far: Searched for 'rust'"));
    }

    #[tokio::test]
    async fn test_unknown_agent_routes_to_done() {
        let (outcome, desktop, _) = run(
            RecordingDesktop::new(),
            vec![ok(r#"{"agent":"teleporter","task":"beam me up"}"#)],
            20,
        )
        .await;
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.message, "Task complete.");
        assert!(desktop.calls().is_empty());
    }

    #[tokio::test]
    async fn test_routing_failures_retry_then_fail() {
        let (outcome, _, llm) = run(
            RecordingDesktop::new(),
            vec![
                Err(LlmError::Http("down".to_string())),
                Err(LlmError::Http("down".to_string())),
                Err(LlmError::Http("still down".to_string())),
            ],
            20,
        )
        .await;
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.message.starts_with("Failed after 2 retries: "));
        assert!(outcome.message.contains("still down"));
        assert_eq!(llm.requests().len(), 3);
        assert!(llm.requests()[1]
            .user_message
            .contains("Previous step failed with error: "));
    }

    #[tokio::test]
    async fn test_agent_error_is_reported_to_next_routing() {
        let (outcome, _, llm) = run(
            RecordingDesktop::new().failing_once("search", "browser crashed"),
            vec![
                ok(r#"{"agent":"web","task":"search","params":{"query":"rust"}}"#),
                ok(r#"{"agent":"done","params":{"message":"Gave up"}}"#),
            ],
            20,
        )
        .await;
        assert_eq!(outcome.message, "Gave up");
        assert!(outcome.record.is_empty());
        assert!(llm.requests()[1]
            .user_message
            .contains("Previous step failed with error: web failed: browser crashed"));
    }

    #[tokio::test]
    async fn test_step_ceiling_stops_agent_loop() {
        let route = r#"{"agent":"gui","task":"press","params":{"key":"return"}}"#;
        let (outcome, desktop, _) = run(
            RecordingDesktop::new(),
            vec![ok(route), ok(route), ok(route), ok(route)],
            2,
        )
        .await;
        assert_eq!(outcome.status, RunStatus::TooManySteps);
        assert_eq!(desktop.count("key_press"), 2);
    }
}
