/// Agent lookup: fetch the external tool's listing and find the first
/// entry whose label contains a given substring.
use crate::tool::{Invocation, ToolError, ToolRunner};
use serde::{Deserialize, Serialize};
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::{Map, Value};
use std::io;

/// The matched entry of the listing's `recent` array. Owned by the external tool.
///
/// Fields other than `label` are kept as raw JSON: `None` means the key was
/// absent, `Some(Value::Null)` means it was present as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AgentRecord {
    pub label: String,
    pub status: Option<Value>,
    pub runtime: Option<Value>,
    pub total_tokens: Option<Value>,
    pub session_key: Option<Value>,
}

impl AgentRecord {
    fn from_fields(label: &str, fields: &Map<String, Value>) -> Self {
        Self {
            label: label.to_string(),
            status: fields.get("status").cloned(),
            runtime: fields.get("runtime").cloned(),
            total_tokens: fields.get("totalTokens").cloned(),
            session_key: fields.get("sessionKey").cloned(),
        }
    }
}

/// Parsed output of `subagents --json`. An absent `recent` key is an empty list.
///
/// Entries stay untyped until one matches, so a loosely typed neighbour
/// never spoils the lookup.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Listing {
    pub recent: Vec<Value>,
}

impl Listing {
    /// First record, in listing order, whose label contains `label` (case-sensitive).
    ///
    /// An entry without a `label` key never matches. An entry scanned before
    /// the match that is not an object, or whose label is not a string, ends
    /// the scan with an error.
    pub fn first_match(&self, label: &str) -> Result<Option<AgentRecord>, LookupError> {
        for (index, entry) in self.recent.iter().enumerate() {
            let fields = entry.as_object().ok_or(LookupError::Malformed {
                index,
                reason: "entry is not an object",
            })?;
            let agent_label = match fields.get("label") {
                None => continue,
                Some(Value::String(s)) => s,
                Some(_) => {
                    return Err(LookupError::Malformed {
                        index,
                        reason: "label is not a string",
                    })
                }
            };
            if agent_label.contains(label) {
                return Ok(Some(AgentRecord::from_fields(agent_label, fields)));
            }
        }
        Ok(None)
    }
}

/// Result of a lookup that reached the tool and understood its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(AgentRecord),
    NoMatch,
}

/// Why a lookup could not produce an answer.
#[derive(Debug)]
pub enum LookupError {
    /// The listing command could not be run.
    Tool(ToolError),
    /// The listing output was not the expected JSON document.
    Parse(serde_json::Error),
    /// A listing entry did not have the expected shape.
    Malformed { index: usize, reason: &'static str },
    /// The matched entry's `sessionKey` is present but not a string.
    InvalidSessionKey { label: String },
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupError::Tool(e) => write!(f, "agent listing unavailable: {e}"),
            LookupError::Parse(e) => write!(f, "agent listing is not valid JSON: {e}"),
            LookupError::Malformed { index, reason } => {
                write!(f, "agent listing entry {index} is malformed: {reason}")
            }
            LookupError::InvalidSessionKey { label } => {
                write!(f, "subagent '{label}' has a non-string sessionKey")
            }
        }
    }
}

impl std::error::Error for LookupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LookupError::Tool(e) => Some(e),
            LookupError::Parse(e) => Some(e),
            LookupError::Malformed { .. } | LookupError::InvalidSessionKey { .. } => None,
        }
    }
}

impl From<ToolError> for LookupError {
    fn from(e: ToolError) -> Self {
        LookupError::Tool(e)
    }
}

pub fn parse_listing(stdout: &str) -> Result<Listing, serde_json::Error> {
    serde_json::from_str(stdout)
}

/// Run the listing command and scan it for `label`.
///
/// The listing's exit code is not consulted; whatever reached stdout is parsed.
pub async fn find_agent<R: ToolRunner>(
    runner: &R,
    label: &str,
) -> Result<LookupOutcome, LookupError> {
    let output = runner.capture(&Invocation::listing()).await?;
    if output.exit_code != Some(0) {
        tracing::warn!(exit_code = ?output.exit_code, "agent listing exited unsuccessfully");
    }

    let listing = parse_listing(&output.stdout).map_err(LookupError::Parse)?;
    tracing::debug!(entries = listing.recent.len(), label, "scanning agent listing");

    Ok(match listing.first_match(label)? {
        Some(agent) => LookupOutcome::Found(agent),
        None => LookupOutcome::NoMatch,
    })
}

/// Collapse a lookup failure into a miss unless `strict` is set.
pub fn absorb(
    result: Result<LookupOutcome, LookupError>,
    strict: bool,
) -> Result<LookupOutcome, LookupError> {
    match result {
        Err(e) if !strict => {
            tracing::warn!(error = %e, "agent lookup failed, treating as not found");
            Ok(LookupOutcome::NoMatch)
        }
        other => other,
    }
}

/// The JSON object printed by the `status` action.
///
/// Values are copied from the matched entry as-is, so an explicit `null`
/// stays `null`; defaults apply only to absent keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Value>,
}

impl StatusReport {
    pub fn not_found() -> Self {
        Self {
            status: Value::from("not_found"),
            runtime: None,
            tokens: None,
        }
    }

    pub fn from_record(agent: &AgentRecord) -> Self {
        Self {
            status: agent
                .status
                .clone()
                .unwrap_or_else(|| Value::from("unknown")),
            runtime: Some(agent.runtime.clone().unwrap_or_else(|| Value::from("0m"))),
            tokens: Some(agent.total_tokens.clone().unwrap_or_else(|| Value::from(0))),
        }
    }

    pub fn from_outcome(outcome: &LookupOutcome) -> Self {
        match outcome {
            LookupOutcome::Found(agent) => Self::from_record(agent),
            LookupOutcome::NoMatch => Self::not_found(),
        }
    }

    /// Two-space indented JSON with every non-ASCII character `\uXXXX`-escaped.
    pub fn to_json(&self) -> io::Result<String> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, AsciiPretty::new());
        self.serialize(&mut ser)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Pretty formatter that keeps string output pure ASCII.
struct AsciiPretty<'a> {
    inner: PrettyFormatter<'a>,
}

impl AsciiPretty<'_> {
    fn new() -> Self {
        Self {
            inner: PrettyFormatter::with_indent(b"  "),
        }
    }
}

impl Formatter for AsciiPretty<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Look up `label` and build its status report.
pub async fn get_status<R: ToolRunner>(
    runner: &R,
    label: &str,
    strict: bool,
) -> Result<StatusReport, LookupError> {
    let outcome = absorb(find_agent(runner, label).await, strict)?;
    Ok(StatusReport::from_outcome(&outcome))
}
