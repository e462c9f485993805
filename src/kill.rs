use crate::dispatch::DispatchError;
use crate::lookup::{absorb, find_agent, LookupError, LookupOutcome};
use crate::tool::{ensure_success, Invocation, ToolRunner};
use serde_json::Value;
use std::io::Write;

/// Kill the first subagent whose label contains `label`.
///
/// A miss prints a warning and calls nothing. Outside strict mode the kill
/// call's outcome is not inspected.
pub async fn kill_subagent<R: ToolRunner>(
    runner: &R,
    label: &str,
    strict: bool,
    out: &mut impl Write,
) -> Result<(), DispatchError> {
    let agent = match absorb(find_agent(runner, label).await, strict)? {
        LookupOutcome::Found(agent) => agent,
        LookupOutcome::NoMatch => {
            writeln!(out, "⚠️ No subagent found with label: {label}")?;
            return Ok(());
        }
    };

    let session_key = match agent.session_key {
        None => String::new(),
        Some(Value::String(key)) => key,
        Some(other) => {
            let err = LookupError::InvalidSessionKey { label: agent.label };
            if strict {
                return Err(err.into());
            }
            tracing::warn!(error = %err, session_key = %other, "not killing");
            writeln!(out, "⚠️ No subagent found with label: {label}")?;
            return Ok(());
        }
    };
    writeln!(out, "🛑 Killing subagent: {session_key}")?;
    out.flush()?;

    let kill = Invocation::kill(&session_key);
    let result = runner
        .run(&kill)
        .await
        .and_then(|code| ensure_success(runner.program(), &kill, code));
    match result {
        Err(e) if strict => Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, session_key = %session_key, "kill call failed");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}
