//! Shell 执行器：白名单命令，禁止危险操作
//!
//! 仅允许配置中的命令名（首词，如 ls、mdfind、open）；禁止 rm -rf、chmod 777 等子串；
//! 不经过 sh，直接以参数数组启动，带超时。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::actions::ShellControl;
use crate::core::{ActionError, ProcessLauncher};

/// 禁止的子串（即使命令名在白名单中也不允许）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "curl | sh",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:", // fork bomb
];

/// 按空白拆分命令行，支持单引号与双引号包裹的参数
pub fn split_command(raw: &str) -> Result<Vec<String>, ActionError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in raw.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    parts.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err(ActionError::invalid("run_command", "command", "unterminated quote"));
    }
    if in_word {
        parts.push(current);
    }
    Ok(parts)
}

/// 白名单 Shell
pub struct AllowlistShell {
    launcher: ProcessLauncher,
    allowed_commands: HashSet<String>,
    timeout: Duration,
}

impl AllowlistShell {
    pub fn new(launcher: ProcessLauncher, allowed_commands: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            launcher,
            allowed_commands: allowed_commands.into_iter().collect(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 校验后返回 (程序, 参数)
    pub fn check(&self, raw: &str) -> Result<(String, Vec<String>), ActionError> {
        let raw_lower = raw.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if raw_lower.contains(forbidden) {
                return Err(ActionError::Forbidden(forbidden.to_string()));
            }
        }
        let mut parts = split_command(raw)?.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| ActionError::missing("run_command", "command"))?;
        if !self.allowed_commands.contains(&program) {
            return Err(ActionError::NotAllowed(program));
        }
        Ok((program, parts.collect()))
    }
}

#[async_trait]
impl ShellControl for AllowlistShell {
    async fn run_command(&self, command: &str) -> Result<String, ActionError> {
        let (program, args) = self.check(command.trim())?;
        tracing::info!(command = %command, "shell execute");

        let out = self.launcher.output(&program, &args, self.timeout).await?;
        if !out.success {
            return Err(ActionError::Command(format!(
                "Command failed (exit {}): {}",
                out.code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()),
                out.stderr.trim()
            )));
        }
        Ok(out.stdout.trim().to_string())
    }
}
