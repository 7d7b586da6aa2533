//! 规划器输出的归一化
//!
//! parse_steps：严格 JSON（数组 / 包在 steps|actions|plan 下 / 单个 Step 对象）-> 从文本中截取 JSON 数组 ->
//! 合成一个 done 步骤（消息为原始回复的截断摘录）。
//! parse_routing：严格 JSON 对象 -> 截取 JSON 对象片段 -> 关键字兜底 -> done。
//! 两者都不会失败，执行循环因此不需要处理不可解析的输出。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::planning::{Params, Step};

/// 回复摘录的最大字符数
pub const EXCERPT_CHARS: usize = 200;

const WRAPPER_KEYS: [&str; 3] = ["steps", "actions", "plan"];
const KEYWORD_AGENTS: [&str; 5] = ["web", "system", "files", "gui", "done"];

static ARRAY_RE: OnceLock<Regex> = OnceLock::new();
static OBJECT_RE: OnceLock<Regex> = OnceLock::new();

/// 计划从哪个解析阶段得到
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    Structured,
    Extracted,
    Synthesized,
}

#[derive(Debug, Clone)]
pub struct ParsedPlan {
    pub steps: Vec<Step>,
    pub source: PlanSource,
}

/// supervisor 每轮给出的路由决策；agent 可能不在词表内，由 router 兜底
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub agent: String,
    pub task: String,
    pub params: Params,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingSource {
    Structured,
    Extracted,
    Keyword,
    Synthesized,
}

#[derive(Debug, Clone)]
pub struct ParsedRouting {
    pub decision: RoutingDecision,
    pub source: RoutingSource,
}

/// 按字符截断（不会切断 UTF-8）
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 去掉 ```json ... ``` 代码围栏
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let rest = &trimmed[start + 3..];
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    match rest.find("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

fn steps_from_array(items: &[Value]) -> Option<Vec<Step>> {
    items.iter().map(Step::from_value).collect()
}

fn steps_from_value(value: &Value) -> Option<Vec<Step>> {
    match value {
        Value::Array(items) => steps_from_array(items),
        Value::Object(obj) => {
            for key in WRAPPER_KEYS {
                if let Some(Value::Array(items)) = obj.get(key) {
                    return steps_from_array(items);
                }
            }
            if obj.contains_key("action") {
                return Step::from_value(value).map(|s| vec![s]);
            }
            None
        }
        _ => None,
    }
}

pub fn parse_steps(raw: &str) -> ParsedPlan {
    let body = strip_fences(raw);

    if let Some(steps) = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(steps_from_value)
    {
        return ParsedPlan {
            steps,
            source: PlanSource::Structured,
        };
    }

    let re = ARRAY_RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").unwrap());
    if let Some(m) = re.find(raw) {
        if let Some(steps) = serde_json::from_str::<Value>(m.as_str())
            .ok()
            .as_ref()
            .and_then(|v| v.as_array().and_then(|items| steps_from_array(items)))
        {
            return ParsedPlan {
                steps,
                source: PlanSource::Extracted,
            };
        }
    }

    let excerpt = truncate_chars(raw.trim(), EXCERPT_CHARS);
    ParsedPlan {
        steps: vec![Step::done(format!("Could not plan: {}", excerpt))],
        source: PlanSource::Synthesized,
    }
}

fn routing_from_value(value: &Value) -> Option<RoutingDecision> {
    let obj = value.as_object()?;
    let agent = obj.get("agent")?.as_str()?.trim().to_string();
    let task = obj
        .get("task")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let params = match obj.get("params") {
        Some(Value::Object(map)) => Params::from_map(map.clone()),
        _ => Params::new(),
    };
    Some(RoutingDecision {
        agent,
        task,
        params,
    })
}

pub fn parse_routing(raw: &str) -> ParsedRouting {
    let body = strip_fences(raw);

    if let Some(decision) = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(routing_from_value)
    {
        return ParsedRouting {
            decision,
            source: RoutingSource::Structured,
        };
    }

    let re = OBJECT_RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap());
    if let Some(m) = re.find(raw) {
        if let Some(decision) = serde_json::from_str::<Value>(m.as_str())
            .ok()
            .as_ref()
            .and_then(routing_from_value)
        {
            return ParsedRouting {
                decision,
                source: RoutingSource::Extracted,
            };
        }
    }

    let lower = raw.to_lowercase();
    if let Some(agent) = KEYWORD_AGENTS.iter().find(|a| lower.contains(*a)) {
        return ParsedRouting {
            decision: RoutingDecision {
                agent: agent.to_string(),
                task: raw.trim().to_string(),
                params: Params::new(),
            },
            source: RoutingSource::Keyword,
        };
    }

    let mut params = Params::new();
    params.insert(
        "message",
        format!("Could not parse: {}", truncate_chars(raw.trim(), EXCERPT_CHARS)),
    );
    ParsedRouting {
        decision: RoutingDecision {
            agent: "done".to_string(),
            task: String::new(),
            params,
        },
        source: RoutingSource::Synthesized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::Action;

    #[test]
    fn test_parse_plain_array() {
        let parsed = parse_steps(
            r#"[{"action":"open_app","params":{"name":"Notes"}},{"action":"done","params":{"message":"Opened Notes"}}]"#,
        );
        assert_eq!(parsed.source, PlanSource::Structured);
        assert_eq!(parsed.steps.len(), 2);
        assert_eq!(parsed.steps[0].action, Action::OpenApp);
        assert_eq!(parsed.steps[1].done_message(), "Opened Notes");
    }

    #[test]
    fn test_parse_empty_array_is_structured() {
        let parsed = parse_steps("[]");
        assert_eq!(parsed.source, PlanSource::Structured);
        assert!(parsed.steps.is_empty());
    }

    #[test]
    fn test_parse_wrapped_and_single_object() {
        let parsed = parse_steps(r#"{"plan": [{"action": "wait", "params": {"seconds": 1}}]}"#);
        assert_eq!(parsed.steps.len(), 1);
        assert_eq!(parsed.steps[0].action, Action::Wait);

        let parsed = parse_steps(r#"{"action": "open_url", "params": {"url": "https://example.com"}}"#);
        assert_eq!(parsed.source, PlanSource::Structured);
        assert_eq!(parsed.steps[0].action, Action::OpenUrl);
    }

    #[test]
    fn test_parse_fenced_block() {
        let raw = "Here you go:\n```json\n[{\"action\":\"done\",\"params\":{}}]\n```";
        let parsed = parse_steps(raw);
        assert_eq!(parsed.source, PlanSource::Structured);
        assert_eq!(parsed.steps[0].action, Action::Done);
    }

    #[test]
    fn test_parse_embedded_array() {
        let raw = r#"Sure! The plan is [{"action":"key_press","params":{"key":"return"}}] and that's it."#;
        let parsed = parse_steps(raw);
        assert_eq!(parsed.source, PlanSource::Extracted);
        assert_eq!(parsed.steps[0].action, Action::KeyPress);
    }

    #[test]
    fn test_unparsable_synthesizes_truncated_done() {
        let raw = "x".repeat(500);
        let parsed = parse_steps(&raw);
        assert_eq!(parsed.source, PlanSource::Synthesized);
        assert_eq!(parsed.steps.len(), 1);
        let message = parsed.steps[0].done_message();
        assert!(message.starts_with("Could not plan: "));
        assert_eq!(message.chars().count(), "Could not plan: ".len() + EXCERPT_CHARS);
    }

    #[test]
    fn test_truncate_chars_respects_utf8() {
        assert_eq!(truncate_chars("幽灵助手", 2), "幽灵");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[test]
    fn test_routing_strict_and_extracted() {
        let parsed = parse_routing(r#"{"agent":"web","task":"search cats","params":{"query":"cats"}}"#);
        assert_eq!(parsed.source, RoutingSource::Structured);
        assert_eq!(parsed.decision.agent, "web");
        assert_eq!(parsed.decision.params.text("query"), Some("cats"));

        let parsed = parse_routing(r#"Routing: {"agent":"gui","task":"type hi"} ok"#);
        assert_eq!(parsed.source, RoutingSource::Extracted);
        assert_eq!(parsed.decision.agent, "gui");
    }

    #[test]
    fn test_routing_keyword_fallback() {
        let parsed = parse_routing("I think the files agent should handle this");
        assert_eq!(parsed.source, RoutingSource::Keyword);
        assert_eq!(parsed.decision.agent, "files");
    }

    #[test]
    fn test_routing_synthesized_done() {
        let parsed = parse_routing("¯\\_(ツ)_/¯");
        assert_eq!(parsed.source, RoutingSource::Synthesized);
        assert_eq!(parsed.decision.agent, "done");
        assert!(parsed
            .decision
            .params
            .text("message")
            .unwrap()
            .starts_with("Could not parse: "));
    }
}
