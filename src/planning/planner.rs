//! 规划适配器：plan / replan / route
//!
//! 每次只向外部规划器发一个请求，整体受超时约束；返回文本交给 parse 模块归一化。
//! 传输层失败（超时、网络、非 2xx）以 PlanningError 返回，不可解析的输出由兜底合成吸收。

use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmSection;
use crate::core::{ExecutionRecord, PlanningError};
use crate::llm::{LlmClient, LlmRequest};
use crate::memory::Preferences;
use crate::planning::parse::{parse_routing, parse_steps, ParsedPlan, ParsedRouting};
use crate::planning::prompts::{
    PLANNER_SYSTEM_PROMPT, PLAN_INSTRUCTION, REPLAN_INSTRUCTION, SUPERVISOR_SYSTEM_PROMPT,
};
use crate::planning::Context;

/// 温度、token 预算与请求超时
#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub plan_temperature: f32,
    pub replan_temperature: f32,
    pub route_temperature: f32,
    pub token_budget: u32,
    pub timeout: Duration,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self::from(&LlmSection::default())
    }
}

impl From<&LlmSection> for PlannerSettings {
    fn from(llm: &LlmSection) -> Self {
        Self {
            plan_temperature: llm.plan_temperature,
            replan_temperature: llm.replan_temperature,
            route_temperature: llm.route_temperature,
            token_budget: llm.token_budget,
            timeout: Duration::from_secs(llm.timeouts.request),
        }
    }
}

/// supervisor 一轮路由所需的输入
pub struct RouteInput<'a> {
    pub intent: &'a str,
    pub context: &'a Context,
    pub preferences: &'a Preferences,
    pub completed: &'a ExecutionRecord,
    pub error: Option<&'a str>,
}

pub struct PlannerAdapter {
    llm: Arc<dyn LlmClient>,
    settings: PlannerSettings,
}

fn preferences_line(preferences: &Preferences) -> Option<String> {
    if preferences.is_empty() {
        return None;
    }
    serde_json::to_string(preferences)
        .ok()
        .map(|json| format!("User preferences: {}", json))
}

/// 上下文行在前，空行分隔，正文在后
fn with_context(lines: Vec<String>, body: String) -> String {
    if lines.is_empty() {
        body
    } else {
        format!("{}\n\n{}", lines.join("\n"), body)
    }
}

impl PlannerAdapter {
    pub fn new(llm: Arc<dyn LlmClient>, settings: PlannerSettings) -> Self {
        Self { llm, settings }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    async fn complete(
        &self,
        kind: &str,
        system_prompt: &str,
        user_message: String,
        temperature: f32,
    ) -> Result<String, PlanningError> {
        let request = LlmRequest {
            system_prompt: system_prompt.to_string(),
            user_message,
            temperature,
            token_budget: self.settings.token_budget,
        };
        let raw = tokio::time::timeout(self.settings.timeout, self.llm.complete(&request))
            .await
            .map_err(|_| PlanningError::Timeout(self.settings.timeout.as_secs()))??;
        tracing::debug!(kind, llm = self.llm.name(), raw = %raw, "planner response");
        Ok(raw)
    }

    pub fn plan_message(intent: &str, context: &Context, preferences: &Preferences) -> String {
        let mut lines = context.prompt_lines();
        lines.extend(preferences_line(preferences));
        with_context(
            lines,
            format!("User request: {}\n\n{}", intent, PLAN_INSTRUCTION),
        )
    }

    pub fn replan_message(
        intent: &str,
        completed: &ExecutionRecord,
        error: &str,
        context: &Context,
    ) -> String {
        with_context(
            context.prompt_lines(),
            format!(
                "Original request: {}\n\nSteps completed so far:\n{}\n\nThe next step failed with error: {}\n\n{}",
                intent,
                completed.to_pretty_json(),
                error,
                REPLAN_INSTRUCTION
            ),
        )
    }

    pub fn route_message(input: &RouteInput<'_>) -> String {
        let mut parts = vec![format!("User request: {}", input.intent)];
        parts.extend(input.context.prompt_lines());
        parts.extend(preferences_line(input.preferences));
        if !input.completed.is_empty() {
            parts.push(format!(
                "Steps completed so far: {}",
                input.completed.summaries().join(", ")
            ));
        }
        if let Some(error) = input.error {
            parts.push(format!("Previous step failed with error: {}", error));
        }
        parts.join("\n")
    }

    /// 初次规划
    pub async fn plan(
        &self,
        intent: &str,
        context: &Context,
        preferences: &Preferences,
    ) -> Result<ParsedPlan, PlanningError> {
        let raw = self
            .complete(
                "plan",
                PLANNER_SYSTEM_PROMPT,
                Self::plan_message(intent, context, preferences),
                self.settings.plan_temperature,
            )
            .await?;
        Ok(parse_steps(&raw))
    }

    /// 失败后重规划，返回替换剩余部分的步骤
    pub async fn replan(
        &self,
        intent: &str,
        completed: &ExecutionRecord,
        error: &str,
        context: &Context,
    ) -> Result<ParsedPlan, PlanningError> {
        let raw = self
            .complete(
                "replan",
                PLANNER_SYSTEM_PROMPT,
                Self::replan_message(intent, completed, error, context),
                self.settings.replan_temperature,
            )
            .await?;
        Ok(parse_steps(&raw))
    }

    /// supervisor 的一轮路由
    pub async fn route(&self, input: &RouteInput<'_>) -> Result<ParsedRouting, PlanningError> {
        let raw = self
            .complete(
                "route",
                SUPERVISOR_SYSTEM_PROMPT,
                Self::route_message(input),
                self.settings.route_temperature,
            )
            .await?;
        Ok(parse_routing(&raw))
    }
}
