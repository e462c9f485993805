/// Spawn a subagent, then register a one-shot check-in on the tool's cron.
use crate::config::CheckConfig;
use crate::dispatch::DispatchError;
use crate::tool::{ensure_success, Invocation, ToolRunner};
use chrono::{DateTime, TimeDelta, Utc};
use std::io::Write;

/// Caller-supplied parameters for `subagents spawn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub task: String,
    pub label: String,
    pub model: String,
    pub timeout_secs: u64,
}

/// The cron entry that follows a spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub name: String,
    /// UTC, second precision, `YYYY-MM-DDTHH:MM:SSZ`.
    pub at: String,
    pub payload: String,
}

impl CheckIn {
    pub fn for_label(label: &str, started: DateTime<Utc>, delay_secs: u32) -> Self {
        let at = started + TimeDelta::seconds(i64::from(delay_secs));
        Self {
            name: format!("check-{label}"),
            at: at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            payload: format!("CHECK_PROGRESS:{label}"),
        }
    }

    pub fn invocation(&self, session: &str) -> Invocation {
        Invocation::cron_add(
            &self.name,
            &format!("at:{}", self.at),
            &self.payload,
            session,
        )
    }
}

/// Spawn the subagent and schedule its check-in `check.delay_secs` after `started`.
///
/// Outside strict mode neither call's outcome is inspected: both are always
/// attempted and the success line is always printed.
pub async fn spawn_with_check<R: ToolRunner>(
    runner: &R,
    request: &SpawnRequest,
    check: &CheckConfig,
    started: DateTime<Utc>,
    strict: bool,
    out: &mut impl Write,
) -> Result<(), DispatchError> {
    writeln!(out, "✅ Spawning subagent: {}", request.label)?;
    out.flush()?;
    let spawn = Invocation::spawn(request);
    let result = runner
        .run(&spawn)
        .await
        .and_then(|code| ensure_success(runner.program(), &spawn, code));
    if let Err(e) = result {
        if strict {
            return Err(e.into());
        }
        tracing::warn!(error = %e, label = %request.label, "spawn call failed, scheduling check anyway");
    }

    let check_in = CheckIn::for_label(&request.label, started, check.delay_secs);
    writeln!(out, "⏰ Created check cron for {}", check_in.at)?;
    out.flush()?;
    let cron = check_in.invocation(&check.session);
    let result = runner
        .run(&cron)
        .await
        .and_then(|code| ensure_success(runner.program(), &cron, code));
    if let Err(e) = result {
        if strict {
            return Err(e.into());
        }
        tracing::warn!(error = %e, name = %check_in.name, "cron add failed");
    }

    writeln!(
        out,
        "✅ Subagent + cron check scheduled for '{}'",
        request.label
    )?;
    Ok(())
}
