//! Pre-build and post-build hook execution: ordered shell command lines
//! run with a per-hook timeout, stdout/stderr captured to the log.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::config::HookSettings;

#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub command: String,
    pub success: bool,
    pub detail: String,
    pub timed_out: bool,
    pub timeout_secs: u64,
}

impl HookOutcome {
    /// The stable error this outcome corresponds to, or `None` on success.
    pub fn as_error(&self) -> Option<crate::error::HotsiteError> {
        if self.success {
            return None;
        }
        if self.timed_out {
            Some(crate::error::HotsiteError::HookTimedOut {
                command: self.command.clone(),
                timeout_secs: self.timeout_secs,
            })
        } else {
            Some(crate::error::HotsiteError::HookFailed {
                command: self.command.clone(),
                detail: self.detail.clone(),
            })
        }
    }
}

/// Runs `hooks` in order. Pre-build hooks stop at the first failure;
/// post-build hooks run all of them regardless and only log failures.
pub async fn run_hooks(hooks: &[HookSettings], site_root: &PathBuf, stop_on_failure: bool) -> Vec<HookOutcome> {
    let mut outcomes = Vec::with_capacity(hooks.len());

    for hook in hooks {
        let outcome = run_one(hook, site_root).await;
        let failed = !outcome.success;
        outcomes.push(outcome);
        if failed && stop_on_failure {
            break;
        }
    }

    outcomes
}

async fn run_one(hook: &HookSettings, site_root: &PathBuf) -> HookOutcome {
    let cwd = hook.cwd.clone().unwrap_or_else(|| site_root.clone());
    let timeout_duration = Duration::from_secs(hook.timeout_secs);

    let mut command = shell_command(&hook.command);
    command.current_dir(&cwd);

    let run = async {
        let output = command.output().await?;
        Ok::<_, std::io::Error>(output)
    };

    match timeout(timeout_duration, run).await {
        Ok(Ok(output)) if output.status.success() => HookOutcome {
            command: hook.command.clone(),
            success: true,
            detail: String::from_utf8_lossy(&output.stdout).into_owned(),
            timed_out: false,
            timeout_secs: hook.timeout_secs,
        },
        Ok(Ok(output)) => HookOutcome {
            command: hook.command.clone(),
            success: false,
            detail: format!(
                "exit {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ),
            timed_out: false,
            timeout_secs: hook.timeout_secs,
        },
        Ok(Err(err)) => HookOutcome {
            command: hook.command.clone(),
            success: false,
            detail: format!("failed to run: {err}"),
            timed_out: false,
            timeout_secs: hook.timeout_secs,
        },
        Err(_) => HookOutcome {
            command: hook.command.clone(),
            success: false,
            detail: format!("timed out after {}s", hook.timeout_secs),
            timed_out: true,
            timeout_secs: hook.timeout_secs,
        },
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(not(unix))]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_hook_reports_success() {
        let hook = HookSettings {
            command: "echo hi".to_string(),
            cwd: None,
            timeout_secs: 5,
        };
        let outcomes = run_hooks(&[hook], &PathBuf::from("."), true).await;
        assert!(outcomes[0].success);
    }

    #[tokio::test]
    async fn failing_hook_stops_subsequent_hooks() {
        let failing = HookSettings {
            command: "exit 1".to_string(),
            cwd: None,
            timeout_secs: 5,
        };
        let never_run = HookSettings {
            command: "echo should-not-run".to_string(),
            cwd: None,
            timeout_secs: 5,
        };
        let outcomes = run_hooks(&[failing, never_run], &PathBuf::from("."), true).await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
    }

    #[tokio::test]
    async fn timeout_is_reported_as_failure() {
        let hook = HookSettings {
            command: "sleep 2".to_string(),
            cwd: None,
            timeout_secs: 0,
        };
        let outcomes = run_hooks(std::slice::from_ref(&hook), &PathBuf::from("."), false).await;
        assert!(!outcomes[0].success);
        assert!(outcomes[0].detail.contains("timed out"));
    }
}
