//! 编排器：一次意图的完整运行
//!
//! 负责：为本次运行建立 RunContext（运行 ID、进程登记、安全上限、取消信号），读取偏好，
//! 按配置的形态驱动计划循环或 supervisor 循环，发布最终状态；被取消时执行清理；最后保存新学到的偏好。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::actions::StepDispatcher;
use crate::agents::{run_supervisor, AgentSet, SupervisorSession};
use crate::config::{AppConfig, RunMode};
use crate::core::{
    IdleStatusCleanup, OrchestratorBuilder, ProcessCleanup, ProcessLauncher, RunContext,
    RunOutcome, RunStatus, SafetyGovernor, ShutdownCoordinator, StatePublisher, StatusSnapshot,
};
use crate::memory::{extract_preferences, PreferenceStore, Preferences, PREFERRED_BROWSER};
use crate::planning::{run_plan, ContextGatherer, PlanSession, PlannerAdapter};

pub struct Orchestrator {
    pub(crate) config: AppConfig,
    pub(crate) planner: PlannerAdapter,
    pub(crate) dispatcher: StepDispatcher,
    pub(crate) agents: AgentSet,
    pub(crate) gatherer: Arc<dyn ContextGatherer>,
    pub(crate) publisher: Arc<dyn StatePublisher>,
    pub(crate) preferences: Arc<dyn PreferenceStore>,
    pub(crate) launcher: ProcessLauncher,
    pub(crate) cancel: CancellationToken,
}

impl Orchestrator {
    pub fn builder(config: AppConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// 生产配置：macOS 执行器、按配置选择的 LLM、状态文件与偏好文件
    pub fn from_config(config: AppConfig, cancel: CancellationToken) -> Self {
        OrchestratorBuilder::new(config)
            .with_cancel_token(cancel)
            .build()
    }

    pub fn mode(&self) -> RunMode {
        self.config.app.mode
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行一次意图；任何结局都归结为一条可读的最终消息
    pub async fn run(&self, intent: &str) -> RunOutcome {
        let intent = intent.trim();
        let safety = &self.config.safety;
        let ctx = RunContext::new(
            self.launcher.clone(),
            Arc::clone(&self.publisher),
            self.cancel.clone(),
            SafetyGovernor::new(
                safety.max_steps,
                safety.max_duration(),
                self.launcher.registry().clone(),
            ),
        );
        tracing::info!(run_id = %ctx.run_id, mode = ?self.mode(), intent, "run started");

        let preferences = self.load_preferences(intent).await;
        if let Some(browser) = preferences.get(PREFERRED_BROWSER) {
            self.dispatcher.toolbox().browser.set_preferred_browser(browser);
        }

        let outcome = match self.mode() {
            RunMode::Plan => {
                let session =
                    PlanSession::new(&self.planner, &self.dispatcher, self.gatherer.as_ref(), &ctx)
                        .with_pacing(safety.step_pacing());
                run_plan(&session, intent, &preferences).await
            }
            RunMode::Supervisor => {
                let session = SupervisorSession {
                    planner: &self.planner,
                    agents: &self.agents,
                    gatherer: self.gatherer.as_ref(),
                    ctx: &ctx,
                    max_retries: safety.max_retries,
                };
                run_supervisor(&session, intent, &preferences).await
            }
        };

        if outcome.status == RunStatus::Cancelled {
            self.cleanup(&ctx).await;
        } else {
            ctx.publish(StatusSnapshot::complete(outcome.message.as_str()))
                .await;
        }

        self.save_preferences(intent, preferences).await;

        tracing::info!(
            run_id = %ctx.run_id,
            status = ?outcome.status,
            message = %outcome.message,
            recorded = outcome.record.len(),
            elapsed_ms = ctx.governor().elapsed().as_millis() as u64,
            "run finished"
        );
        outcome
    }

    /// 取消后的清理：终止子进程，状态置为 idle
    async fn cleanup(&self, ctx: &RunContext) {
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.register(ProcessCleanup::new(Arc::clone(ctx.governor())));
        coordinator.register(IdleStatusCleanup::new(ctx.publisher()));
        coordinator.run_cleanup().await;
    }

    async fn load_preferences(&self, intent: &str) -> Preferences {
        match self.preferences.load(intent).await {
            Ok(prefs) => {
                if !prefs.is_empty() {
                    tracing::debug!(count = prefs.len(), "loaded preferences");
                }
                prefs
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load preferences");
                Preferences::new()
            }
        }
    }

    /// 从本次意图中抽取新偏好，合并后保存
    async fn save_preferences(&self, intent: &str, mut preferences: Preferences) {
        let learned = extract_preferences(intent);
        if learned.is_empty() {
            return;
        }
        tracing::info!(learned = ?learned, "learned preferences");
        preferences.extend(learned);
        if let Err(e) = self.preferences.save(&preferences).await {
            tracing::warn!(error = %e, "failed to save preferences");
        }
    }
}
