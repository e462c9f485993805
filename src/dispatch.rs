/// Command-line dispatch: validate the flags each action needs, then run it.
use crate::config::CheckConfig;
use crate::kill::kill_subagent;
use crate::lookup::{get_status, LookupError};
use crate::spawn::{spawn_with_check, SpawnRequest};
use crate::tool::{ToolError, ToolRunner};
use chrono::Utc;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Action {
    /// Check whether a subagent is still running
    #[default]
    Status,
    /// Spawn a subagent with an automatic check-in cron
    Spawn,
    /// Kill a stuck subagent
    Kill,
}

/// Resolved inputs for one run, after config defaults are applied.
#[derive(Debug, Clone)]
pub struct ActionArgs {
    pub action: Action,
    pub label: Option<String>,
    pub task: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

/// Errors that end a run abnormally.
#[derive(Debug)]
pub enum DispatchError {
    /// A flag the action needs is missing.
    Usage(&'static str),
    Lookup(LookupError),
    Tool(ToolError),
    /// Writing to stdout failed.
    Output(std::io::Error),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Usage(msg) => write!(f, "❌ {msg}"),
            DispatchError::Lookup(e) => write!(f, "{e}"),
            DispatchError::Tool(e) => write!(f, "{e}"),
            DispatchError::Output(e) => write!(f, "failed to write output: {e}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Usage(_) => None,
            DispatchError::Lookup(e) => Some(e),
            DispatchError::Tool(e) => Some(e),
            DispatchError::Output(e) => Some(e),
        }
    }
}

impl From<LookupError> for DispatchError {
    fn from(e: LookupError) -> Self {
        DispatchError::Lookup(e)
    }
}

impl From<ToolError> for DispatchError {
    fn from(e: ToolError) -> Self {
        DispatchError::Tool(e)
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(e: std::io::Error) -> Self {
        DispatchError::Output(e)
    }
}

/// A flag value counts as given only if it has non-whitespace content; an
/// empty label would otherwise match every agent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Run the selected action. Usage errors are returned before any tool call.
pub async fn dispatch<R: ToolRunner>(
    args: &ActionArgs,
    runner: &R,
    check: &CheckConfig,
    strict: bool,
    out: &mut impl Write,
) -> Result<(), DispatchError> {
    tracing::debug!(action = ?args.action, label = ?args.label, strict, "dispatching");

    match args.action {
        Action::Status => {
            let label = present(&args.label)
                .ok_or(DispatchError::Usage("--label required for status check"))?;
            let report = get_status(runner, label, strict).await?;
            let json = report.to_json()?;
            writeln!(out, "{json}")?;
        }
        Action::Spawn => {
            let (Some(label), Some(task)) = (present(&args.label), present(&args.task)) else {
                return Err(DispatchError::Usage("--label and --task required for spawn"));
            };
            let request = SpawnRequest {
                task: task.to_string(),
                label: label.to_string(),
                model: args.model.clone(),
                timeout_secs: args.timeout_secs,
            };
            spawn_with_check(runner, &request, check, Utc::now(), strict, out).await?;
        }
        Action::Kill => {
            let label = present(&args.label)
                .ok_or(DispatchError::Usage("--label required for kill"))?;
            kill_subagent(runner, label, strict, out).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::testing::RecordingRunner;
    use crate::tool::Invocation;
    use chrono::{DateTime, TimeDelta};

    const BUILD_AGENT: &str = r#"{"recent":[{"label":"build-agent-7","status":"running","runtime":"12m","totalTokens":4821,"sessionKey":"sess-1"}]}"#;

    fn args(action: Action, label: Option<&str>, task: Option<&str>) -> ActionArgs {
        ActionArgs {
            action,
            label: label.map(str::to_string),
            task: task.map(str::to_string),
            model: "openrouter/xiaomi/mimo-v2-flash".to_string(),
            timeout_secs: 300,
        }
    }

    async fn run(
        args: &ActionArgs,
        runner: &RecordingRunner,
    ) -> (Result<(), DispatchError>, String) {
        let mut out = Vec::new();
        let result = dispatch(args, runner, &CheckConfig::default(), false, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn status_is_the_default_action() {
        assert_eq!(Action::default(), Action::Status);
    }

    #[tokio::test]
    async fn status_prints_indented_report() {
        let runner = RecordingRunner::with_listing(BUILD_AGENT);
        let (result, out) = run(&args(Action::Status, Some("build-agent"), None), &runner).await;
        result.unwrap();
        assert_eq!(
            out,
            "{\n  \"status\": \"running\",\n  \"runtime\": \"12m\",\n  \"tokens\": 4821\n}\n"
        );
    }

    #[tokio::test]
    async fn status_miss_prints_not_found() {
        let runner = RecordingRunner::with_listing(BUILD_AGENT);
        let (result, out) = run(&args(Action::Status, Some("ghost"), None), &runner).await;
        result.unwrap();
        assert_eq!(out, "{\n  \"status\": \"not_found\"\n}\n");
    }

    #[tokio::test]
    async fn status_without_label_is_usage_error() {
        let runner = RecordingRunner::with_listing(BUILD_AGENT);
        let (result, out) = run(&args(Action::Status, None, None), &runner).await;
        let err = result.unwrap_err();
        assert!(matches!(err, DispatchError::Usage(_)));
        assert_eq!(err.to_string(), "❌ --label required for status check");
        assert!(out.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn spawn_requires_label_and_task() {
        let runner = RecordingRunner::with_listing("");
        for (label, task) in [(Some("x"), None), (None, Some("t")), (None, None)] {
            let (result, _) = run(&args(Action::Spawn, label, task), &runner).await;
            let err = result.unwrap_err();
            assert_eq!(err.to_string(), "❌ --label and --task required for spawn");
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn kill_without_label_is_usage_error() {
        let runner = RecordingRunner::with_listing(BUILD_AGENT);
        let (result, _) = run(&args(Action::Kill, None, None), &runner).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "❌ --label required for kill"
        );
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn kill_with_empty_label_is_usage_error() {
        let runner =
            RecordingRunner::with_listing(r#"{"recent":[{"label":"prod-agent","sessionKey":"sess-prod"}]}"#);
        for label in ["", "   "] {
            let (result, out) = run(&args(Action::Kill, Some(label), None), &runner).await;
            assert!(matches!(result, Err(DispatchError::Usage(_))));
            assert!(out.is_empty());
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn status_with_empty_label_is_usage_error() {
        let runner = RecordingRunner::with_listing(BUILD_AGENT);
        let (result, out) = run(&args(Action::Status, Some(""), None), &runner).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "❌ --label required for status check"
        );
        assert!(out.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn spawn_with_empty_task_is_usage_error() {
        let runner = RecordingRunner::with_listing("");
        for (label, task) in [("builder", ""), ("", "compile it"), ("builder", "\t")] {
            let (result, _) = run(&args(Action::Spawn, Some(label), Some(task)), &runner).await;
            assert_eq!(
                result.unwrap_err().to_string(),
                "❌ --label and --task required for spawn"
            );
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn status_output_is_ascii_escaped() {
        let runner = RecordingRunner::with_listing(
            r#"{"recent":[{"label":"übersetzer","status":"läuft","runtime":null}]}"#,
        );
        let (result, out) = run(&args(Action::Status, Some("über"), None), &runner).await;
        result.unwrap();
        assert_eq!(
            out,
            "{\n  \"status\": \"l\\u00e4uft\",\n  \"runtime\": null,\n  \"tokens\": 0\n}\n"
        );
    }

    #[tokio::test]
    async fn spawn_schedules_check_one_minute_after_start() {
        let runner = RecordingRunner::with_listing("");
        let mut spawn_args = args(Action::Spawn, Some("builder"), Some("compile it"));
        spawn_args.model = "anthropic/claude".to_string();
        spawn_args.timeout_secs = 45;

        let before = Utc::now();
        let (result, _) = run(&spawn_args, &runner).await;
        let after = Utc::now();
        result.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].args.contains(&"anthropic/claude".to_string()));
        assert!(calls[0].args.contains(&"45".to_string()));

        let schedule = &calls[1].args[5];
        let at = schedule.strip_prefix("at:").unwrap();
        let at: DateTime<Utc> = DateTime::parse_from_rfc3339(at).unwrap().into();
        let lower = before + TimeDelta::seconds(59);
        let upper = after + TimeDelta::seconds(60);
        assert!(at >= lower && at <= upper, "{at} not within [{lower}, {upper}]");
    }

    #[tokio::test]
    async fn kill_ghost_warns_without_kill_call() {
        let runner = RecordingRunner::with_listing(BUILD_AGENT);
        let (result, out) = run(&args(Action::Kill, Some("ghost"), None), &runner).await;
        result.unwrap();
        assert!(out.contains("No subagent found with label: ghost"));
        assert_eq!(runner.calls(), vec![Invocation::listing()]);
    }

    #[tokio::test]
    async fn strict_status_propagates_lookup_error() {
        let runner = RecordingRunner::unreachable();
        let mut out = Vec::new();
        let err = dispatch(
            &args(Action::Status, Some("x"), None),
            &runner,
            &CheckConfig::default(),
            true,
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DispatchError::Lookup(_)));
        assert!(out.is_empty());
    }
}
