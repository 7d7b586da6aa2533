//! 端到端场景：脚本化 LLM + 记录型桌面，走完整的 Orchestrator::run

use std::sync::Arc;
use std::time::Duration;

use ghosty::actions::{AllowlistShell, RecordingDesktop, Toolbox};
use ghosty::config::{AppConfig, RunMode};
use ghosty::core::{MemoryPublisher, ProcessLauncher, ProcessRegistry, StatusPhase, StatusSnapshot};
use ghosty::llm::{LlmError, ScriptedLlmClient};
use ghosty::memory::{JsonFilePreferenceStore, NoopPreferenceStore, PreferenceStore};
use ghosty::{Orchestrator, OrchestratorBuilder, RunStatus};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Harness {
    desktop: Arc<RecordingDesktop>,
    llm: Arc<ScriptedLlmClient>,
    publisher: Arc<MemoryPublisher>,
    orchestrator: Orchestrator,
}

fn quick_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.safety.step_pacing_ms = 0;
    config
}

fn builder(
    config: AppConfig,
    desktop: RecordingDesktop,
    replies: Vec<Result<String, LlmError>>,
) -> (OrchestratorBuilder, Arc<RecordingDesktop>, Arc<ScriptedLlmClient>, Arc<MemoryPublisher>) {
    let desktop = Arc::new(desktop);
    let llm = Arc::new(ScriptedLlmClient::new(replies));
    let publisher = Arc::new(MemoryPublisher::new());
    let builder = OrchestratorBuilder::new(config)
        .with_llm(llm.clone())
        .with_toolbox(Toolbox::recording(desktop.clone()))
        .with_publisher(publisher.clone())
        .with_preference_store(Arc::new(NoopPreferenceStore));
    (builder, desktop, llm, publisher)
}

fn harness(config: AppConfig, desktop: RecordingDesktop, replies: &[&str]) -> Harness {
    let replies = replies.iter().map(|r| Ok(r.to_string())).collect();
    let (builder, desktop, llm, publisher) = builder(config, desktop, replies);
    Harness {
        desktop,
        llm,
        publisher,
        orchestrator: builder.build(),
    }
}

#[tokio::test]
async fn test_open_app_then_done() {
    let h = harness(
        quick_config(),
        RecordingDesktop::new(),
        &[r#"[{"action":"open_app","params":{"name":"Notes"}},{"action":"done","params":{"message":"Opened Notes"}}]"#],
    );
    let outcome = h.orchestrator.run("open notes").await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.message, "Opened Notes");
    assert_eq!(outcome.record.len(), 1);
    assert_eq!(h.desktop.calls(), vec!["open_app Notes"]);
    assert_eq!(
        h.publisher.last().unwrap(),
        StatusSnapshot::complete("Opened Notes")
    );
}

#[tokio::test]
async fn test_empty_plan_reports_no_steps() {
    let h = harness(quick_config(), RecordingDesktop::new(), &["[]"]);
    let outcome = h.orchestrator.run("do nothing").await;

    assert_eq!(outcome.status, RunStatus::NoSteps);
    assert_eq!(outcome.message, "No steps planned.");
    assert!(h.desktop.calls().is_empty());
}

#[tokio::test]
async fn test_failed_step_is_replanned() {
    let h = harness(
        quick_config(),
        RecordingDesktop::new().failing_once("type_text", "boom"),
        &[
            r#"[{"action":"open_app","params":{"name":"TextEdit"}},{"action":"type_text","params":{"text":"hello"}},{"action":"key_press","params":{"key":"return"}}]"#,
            r#"[{"action":"done","params":{"message":"Recovered"}}]"#,
        ],
    );
    let outcome = h.orchestrator.run("write hello in textedit").await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.message, "Recovered");
    // 记录只含已执行的步骤 1：失败的步骤不记，恢复计划里的 done 只结束运行、不入记录
    assert_eq!(outcome.record.summaries(), vec!["Opened TextEdit"]);
    // 失败步骤之后的旧步骤被丢弃
    assert_eq!(h.desktop.count("key_press"), 0);

    let requests = h.llm.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1]
        .user_message
        .contains("The next step failed with error: boom"));
    assert!(requests[1].user_message.contains("Opened TextEdit"));
}

#[tokio::test]
async fn test_replan_failure_ends_run() {
    // 脚本只有初始计划，重新规划时 LLM 报错
    let h = harness(
        quick_config(),
        RecordingDesktop::new().failing_once("type_text", "boom"),
        &[r#"[{"action":"open_app","params":{"name":"TextEdit"}},{"action":"type_text","params":{"text":"hello"}}]"#],
    );
    let outcome = h.orchestrator.run("write hello").await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.message, "Failed at step 2: boom");
    assert_eq!(
        h.publisher.last().unwrap(),
        StatusSnapshot::complete("Failed at step 2: boom")
    );
}

#[tokio::test]
async fn test_wall_clock_limit_stops_long_plan() {
    let mut config = quick_config();
    config.safety.max_duration_secs = 2;
    let steps: Vec<String> = (0..10)
        .map(|i| format!(r#"{{"action":"type_text","params":{{"text":"line {}"}}}}"#, i))
        .collect();
    let plan = format!("[{}]", steps.join(","));
    let h = harness(
        config,
        RecordingDesktop::new().with_delay(Duration::from_millis(600)),
        &[plan.as_str()],
    );
    let outcome = h.orchestrator.run("type ten lines").await;

    assert_eq!(outcome.status, RunStatus::TimedOut);
    assert_eq!(outcome.message, "Timed out.");
    assert_eq!(h.desktop.count("type_text"), 4);
    assert_eq!(outcome.record.len(), 4);
}

#[tokio::test]
async fn test_unparsable_reply_becomes_done() {
    let h = harness(
        quick_config(),
        RecordingDesktop::new(),
        &["Sorry, I cannot control that application."],
    );
    let outcome = h.orchestrator.run("launch the rocket").await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        outcome.message,
        "Could not plan: Sorry, I cannot control that application."
    );
    assert!(outcome.record.is_empty());
}

#[tokio::test]
async fn test_unknown_action_is_skipped() {
    let h = harness(
        quick_config(),
        RecordingDesktop::new(),
        &[r#"[{"action":"teleport","params":{"to":"mars"}},{"action":"done","params":{"message":"ok"}}]"#],
    );
    let outcome = h.orchestrator.run("go to mars").await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        outcome.record.summaries(),
        vec!["Skipped unknown action 'teleport'"]
    );
    assert!(h.desktop.calls().is_empty());
}

#[tokio::test]
async fn test_oversized_plan_hits_step_ceiling() {
    let mut config = quick_config();
    config.safety.max_steps = 3;
    let h = harness(
        config,
        RecordingDesktop::new(),
        &[r#"[{"action":"key_press","params":{"key":"a"}},{"action":"key_press","params":{"key":"b"}},{"action":"key_press","params":{"key":"c"}},{"action":"key_press","params":{"key":"d"}},{"action":"key_press","params":{"key":"e"}}]"#],
    );
    let outcome = h.orchestrator.run("press keys").await;

    assert_eq!(outcome.status, RunStatus::TooManySteps);
    assert_eq!(outcome.message, "Too many steps.");
    assert_eq!(h.desktop.count("key_press"), 3);
}

#[tokio::test]
async fn test_supervisor_mode_routes_to_agents() {
    let mut config = quick_config();
    config.app.mode = RunMode::Supervisor;
    let h = harness(
        config,
        RecordingDesktop::new(),
        &[
            r#"{"agent":"gui","task":"open notes","params":{"app":"Notes"}}"#,
            r#"{"agent":"system","task":"mute","params":{"volume":0}}"#,
            r#"{"agent":"done","params":{"message":"Notes open and muted"}}"#,
        ],
    );
    assert_eq!(h.orchestrator.mode(), RunMode::Supervisor);
    let outcome = h.orchestrator.run("open notes and mute").await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.message, "Notes open and muted");
    assert_eq!(
        outcome.record.summaries(),
        vec!["Switched to Notes", "Volume muted"]
    );
    let snapshots = h.publisher.snapshots();
    assert!(snapshots
        .iter()
        .any(|s| s.message.as_deref() == Some("[gui] open notes")));
}

#[tokio::test]
async fn test_learned_browser_preference_is_saved_and_applied() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("preferences.json");
    let done = r#"[{"action":"done","params":{"message":"ok"}}]"#;

    let (first, _, _, _) = builder(quick_config(), RecordingDesktop::new(), vec![Ok(done.to_string())]);
    first
        .with_preference_store(Arc::new(JsonFilePreferenceStore::new(&path)))
        .build()
        .run("use arc as my browser")
        .await;

    let saved = JsonFilePreferenceStore::new(&path).load("").await.unwrap();
    assert_eq!(saved.get("preferred_browser").map(String::as_str), Some("Arc"));

    let (second, desktop, llm, _) =
        builder(quick_config(), RecordingDesktop::new(), vec![Ok(done.to_string())]);
    second
        .with_preference_store(Arc::new(JsonFilePreferenceStore::new(&path)))
        .build()
        .run("open github")
        .await;

    assert_eq!(desktop.calls(), vec!["preferred_browser Arc"]);
    assert!(llm.requests()[0].user_message.contains("Arc"));
}

#[tokio::test]
async fn test_cancelled_run_leaves_idle_status() {
    let cancel = CancellationToken::new();
    let (builder, desktop, _, publisher) = builder(
        quick_config(),
        RecordingDesktop::new(),
        vec![Ok(r#"[{"action":"open_app","params":{"name":"Notes"}}]"#.to_string())],
    );
    let orchestrator = builder.with_cancel_token(cancel.clone()).build();
    cancel.cancel();

    let outcome = orchestrator.run("open notes").await;

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.message, "Cancelled.");
    assert!(desktop.calls().is_empty());
    assert_eq!(publisher.last().unwrap().phase, StatusPhase::Idle);
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancel_during_running_command_terminates_child() {
    let registry = ProcessRegistry::new();
    let desktop = Arc::new(RecordingDesktop::new());
    let mut toolbox = Toolbox::recording(desktop.clone());
    toolbox.shell = Arc::new(AllowlistShell::new(
        ProcessLauncher::new(registry.clone()),
        vec!["sleep".to_string()],
        60,
    ));
    let publisher = Arc::new(MemoryPublisher::new());
    let cancel = CancellationToken::new();

    let mut config = quick_config();
    config.app.mode = RunMode::Supervisor;
    let orchestrator = OrchestratorBuilder::new(config)
        .with_llm(Arc::new(ScriptedLlmClient::replying([
            r#"{"agent":"system","task":"wait a while","params":{"command":"sleep 30"}}"#,
        ])))
        .with_toolbox(toolbox)
        .with_publisher(publisher.clone())
        .with_preference_store(Arc::new(NoopPreferenceStore))
        .with_process_registry(registry.clone())
        .with_cancel_token(cancel.clone())
        .build();

    // 等子进程登记后再取消
    let watcher = {
        let registry = registry.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let pids = registry.pids();
                if !pids.is_empty() {
                    cancel.cancel();
                    return pids;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
    };

    let outcome = tokio::time::timeout(Duration::from_secs(10), orchestrator.run("wait a while"))
        .await
        .expect("run should stop soon after cancellation");
    let in_flight = watcher.await.unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(in_flight.len(), 1);
    // 登记表只在清理阶段发出 SIGTERM 后才清空
    assert!(registry.is_empty());
    assert_eq!(publisher.last().unwrap().phase, StatusPhase::Idle);
    assert!(outcome.record.is_empty());
}
