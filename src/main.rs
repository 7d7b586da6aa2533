//! Ghosty 命令行入口
//!
//! `ghosty [--config PATH] [--mode plan|supervisor] <intent...>`：运行一次意图，把最终消息打印到 stdout。
//! 意图为空时打印用法并以 1 退出；其余任何结局（包括失败、超时、取消）都以 0 退出。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use ghosty::config::{load_config, AppConfig, RunMode};
use ghosty::core::{read_state, Orchestrator, SafetyGovernor, ShutdownManager};

#[derive(Parser, Debug)]
#[command(name = "ghosty", version, about = "Plan and execute a desktop task from a natural-language request")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 编排形态
    #[arg(long, value_enum)]
    mode: Option<RunMode>,

    /// 打印当前状态文件后退出
    #[arg(long)]
    status: bool,

    /// 用户请求
    intent: Vec<String>,
}

fn load(path: Option<PathBuf>) -> AppConfig {
    match load_config(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "invalid configuration, using defaults");
            AppConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    ghosty::observability::init();
    let cli = Cli::parse();

    let mut config = load(cli.config);
    if let Some(mode) = cli.mode {
        config.app.mode = mode;
    }

    if cli.status {
        let state = read_state(&config.app.state_file()).unwrap_or_default();
        println!("{}", serde_json::to_string(&state)?);
        return Ok(ExitCode::SUCCESS);
    }

    let intent = cli.intent.join(" ");
    if intent.trim().is_empty() {
        eprintln!("Usage: ghosty [--config PATH] [--mode plan|supervisor] <intent>");
        return Ok(ExitCode::from(1));
    }

    SafetyGovernor::adopt_process_group();
    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let orchestrator = Orchestrator::from_config(config, shutdown.token());
    let outcome = orchestrator.run(&intent).await;
    println!("{}", outcome.message);

    Ok(ExitCode::SUCCESS)
}
