/// External agent-management tool: argument lists for each call it supports,
/// and the runners that execute them.
use crate::spawn::SpawnRequest;
use std::process::Stdio;
use tokio::process::Command;

/// One call against the external tool, as the argument list after the program name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
}

impl Invocation {
    fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `subagents --json`
    pub fn listing() -> Self {
        Self::new(["subagents", "--json"])
    }

    /// `subagents spawn --task .. --label .. --model .. --timeout ..`
    pub fn spawn(request: &SpawnRequest) -> Self {
        Self::new([
            "subagents".to_string(),
            "spawn".to_string(),
            "--task".to_string(),
            request.task.clone(),
            "--label".to_string(),
            request.label.clone(),
            "--model".to_string(),
            request.model.clone(),
            "--timeout".to_string(),
            request.timeout_secs.to_string(),
        ])
    }

    /// `subagents kill --session <key>`
    pub fn kill(session_key: &str) -> Self {
        Self::new(["subagents", "kill", "--session", session_key])
    }

    /// `cron add --name .. --schedule .. --payload .. --session ..`
    pub fn cron_add(name: &str, schedule: &str, payload: &str, session: &str) -> Self {
        Self::new([
            "cron",
            "add",
            "--name",
            name,
            "--schedule",
            schedule,
            "--payload",
            payload,
            "--session",
            session,
        ])
    }

    /// Render as a shell-like command line for logs and dry runs.
    pub fn command_line(&self, program: &str) -> String {
        let mut line = program.to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                line.push_str(&format!("{arg:?}"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Captured result of a call whose stdout we need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Process exit code (None if killed by signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
}

/// Errors from invoking the external tool.
#[derive(Debug)]
pub enum ToolError {
    /// The program could not be started at all.
    Unreachable {
        program: String,
        source: std::io::Error,
    },
    /// The program ran but exited unsuccessfully.
    Failed {
        command: String,
        exit_code: Option<i32>,
    },
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::Unreachable { program, source } => {
                write!(f, "failed to run {}: {}", program, source)
            }
            ToolError::Failed {
                command,
                exit_code: Some(code),
            } => write!(f, "`{}` exited with code {}", command, code),
            ToolError::Failed {
                command,
                exit_code: None,
            } => write!(f, "`{}` was terminated by a signal", command),
        }
    }
}

impl std::error::Error for ToolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ToolError::Unreachable { source, .. } => Some(source),
            ToolError::Failed { .. } => None,
        }
    }
}

/// Turn a finished call's exit code into an error unless it is 0.
pub fn ensure_success(
    program: &str,
    invocation: &Invocation,
    exit_code: Option<i32>,
) -> Result<(), ToolError> {
    if exit_code == Some(0) {
        Ok(())
    } else {
        Err(ToolError::Failed {
            command: invocation.command_line(program),
            exit_code,
        })
    }
}

/// Executes invocations against the external tool.
///
/// Each call is awaited to completion before the caller moves on; nothing
/// here runs concurrently.
pub trait ToolRunner {
    /// Program name, for messages.
    fn program(&self) -> &str;

    /// Run and capture stdout.
    async fn capture(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;

    /// Run with inherited stdio and return the exit code.
    async fn run(&self, invocation: &Invocation) -> Result<Option<i32>, ToolError>;
}

/// Runs the real external program as a child process.
pub struct ProcessRunner {
    program: String,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn unreachable(&self, source: std::io::Error) -> ToolError {
        ToolError::Unreachable {
            program: self.program.clone(),
            source,
        }
    }
}

impl ToolRunner for ProcessRunner {
    fn program(&self) -> &str {
        &self.program
    }

    async fn capture(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        tracing::debug!(
            program = %self.program,
            args = ?invocation.args,
            "capturing tool output"
        );

        let output = Command::new(&self.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.unreachable(e))?;

        let exit_code = output.status.code();
        tracing::debug!(exit_code = ?exit_code, stdout_bytes = output.stdout.len(), "tool exited");

        Ok(ToolOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    async fn run(&self, invocation: &Invocation) -> Result<Option<i32>, ToolError> {
        tracing::info!(
            program = %self.program,
            args = ?invocation.args,
            "running tool"
        );

        let status = Command::new(&self.program)
            .args(&invocation.args)
            .status()
            .await
            .map_err(|e| self.unreachable(e))?;

        let exit_code = status.code();
        tracing::info!(exit_code = ?exit_code, "tool exited");
        Ok(exit_code)
    }
}

/// Prints each command instead of running it; every call "succeeds" with no output.
pub struct DryRunRunner {
    program: String,
}

impl DryRunRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ToolRunner for DryRunRunner {
    fn program(&self) -> &str {
        &self.program
    }

    async fn capture(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        eprintln!("[dry-run] {}", invocation.command_line(&self.program));
        Ok(ToolOutput {
            exit_code: Some(0),
            stdout: String::new(),
        })
    }

    async fn run(&self, invocation: &Invocation) -> Result<Option<i32>, ToolError> {
        eprintln!("[dry-run] {}", invocation.command_line(&self.program));
        Ok(Some(0))
    }
}
