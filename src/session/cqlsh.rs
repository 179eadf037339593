//! [`Session`] over `ccm <node> cqlsh -x`.
//!
//! Each statement is one cqlsh process: the script sets the consistency level
//! and the current keyspace, then runs the statement. Plain `SELECT`s are sent
//! as `SELECT JSON` so every row comes back as one typed JSON object; other
//! tables are split on the column boundaries of cqlsh's separator line.
//! Server errors are read from stderr.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use crate::NodeHandle;
use crate::ParseError;
use crate::QueryError;
use crate::RejectionKind;
use crate::Result;
use crate::Row;
use crate::Rows;
use crate::Session;
use crate::Statement;
use crate::Value;

/// Column header cqlsh prints for `SELECT JSON`
const JSON_HEADER: &str = "[json]";

/// Error markers cqlsh prints, most specific first
const ERROR_KINDS: [(&str, ErrorClass); 12] = [
    ("InvalidRequest", ErrorClass::Rejected(RejectionKind::InvalidRequest)),
    ("SyntaxException", ErrorClass::Rejected(RejectionKind::Syntax)),
    ("ConfigurationException", ErrorClass::Rejected(RejectionKind::Configuration)),
    ("AlreadyExists", ErrorClass::Rejected(RejectionKind::Configuration)),
    ("Unauthorized", ErrorClass::Rejected(RejectionKind::Unauthorized)),
    ("Unavailable", ErrorClass::Unavailable),
    ("ReadTimeout", ErrorClass::Timeout),
    ("WriteTimeout", ErrorClass::Timeout),
    ("OperationTimedOut", ErrorClass::Timeout),
    ("NoHostAvailable", ErrorClass::Connection),
    ("Connection error", ErrorClass::Connection),
    ("Unable to connect", ErrorClass::Connection),
];

#[derive(Debug, Clone, Copy)]
enum ErrorClass {
    Rejected(RejectionKind),
    Unavailable,
    Timeout,
    Connection,
}

/// Query session pinned to one node.
#[derive(Debug)]
pub struct CqlshSession {
    node: Arc<NodeHandle>,
    keyspace: Mutex<Option<String>>,
}

impl CqlshSession {
    pub fn new(node: Arc<NodeHandle>) -> Self {
        Self {
            node,
            keyspace: Mutex::new(None),
        }
    }

    pub fn node(&self) -> &NodeHandle {
        &self.node
    }

    pub fn keyspace(&self) -> Option<String> {
        self.keyspace.lock().clone()
    }

    pub fn set_keyspace(
        &self,
        keyspace: impl Into<String>,
    ) {
        *self.keyspace.lock() = Some(keyspace.into());
    }

    /// Full cqlsh script for `statement` in the current session state.
    pub fn script(
        &self,
        statement: &Statement,
    ) -> String {
        let mut script = String::new();
        if let Some(cl) = statement.consistency {
            script.push_str(&format!("CONSISTENCY {cl};\n"));
        }
        if let Some(ks) = self.keyspace.lock().as_deref() {
            script.push_str(&format!("USE {ks};\n"));
        }
        let query = statement.query.trim().trim_end_matches(';');
        match json_select(query) {
            Some(query) => script.push_str(&query),
            None => script.push_str(query),
        }
        script.push(';');
        script
    }
}

#[async_trait]
impl Session for CqlshSession {
    async fn execute(
        &self,
        statement: Statement,
    ) -> Result<Rows> {
        let script = self.script(&statement);
        trace!(node = %self.node.name(), %script, "cqlsh");
        let output = self.node.cqlsh(&script).await?;

        if let Some(e) = classify_error(&output.stderr) {
            debug!(node = %self.node.name(), %statement, "statement failed: {:?}", e);
            return Err(e.into());
        }
        if !output.success() {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim()
            } else {
                output.stderr.trim()
            };
            return Err(QueryError::Server(detail.to_string()).into());
        }

        if let Some(ks) = use_target(&statement.query) {
            self.set_keyspace(ks);
        }
        parse_rows(&output.stdout)
    }
}

/// `SELECT ...` as `SELECT JSON ...`; `None` for anything else.
fn json_select(query: &str) -> Option<String> {
    let (verb, rest) = query.trim_start().split_once(char::is_whitespace)?;
    if !verb.eq_ignore_ascii_case("select") {
        return None;
    }
    let rest = rest.trim_start();
    let next = rest.split(char::is_whitespace).next().unwrap_or_default();
    if next.eq_ignore_ascii_case("json") {
        return None;
    }
    Some(format!("SELECT JSON {rest}"))
}

/// Keyspace named by a `USE` statement.
fn use_target(query: &str) -> Option<String> {
    let query = query.trim().trim_end_matches(';').trim();
    let (verb, rest) = query.split_once(char::is_whitespace)?;
    if !verb.eq_ignore_ascii_case("use") {
        return None;
    }
    let ks = rest.trim();
    (!ks.is_empty()).then(|| ks.to_string())
}

/// Maps the first recognized server or driver error in `stderr`.
pub fn classify_error(stderr: &str) -> Option<QueryError> {
    let line = stderr
        .lines()
        .find(|l| ERROR_KINDS.iter().any(|(marker, _)| l.contains(marker)))?;
    let (_, class) = ERROR_KINDS.iter().find(|(marker, _)| line.contains(marker))?;
    let message = error_message(line);

    Some(match *class {
        ErrorClass::Rejected(kind) => QueryError::Rejected { kind, message },
        ErrorClass::Unavailable => QueryError::Unavailable(message),
        ErrorClass::Timeout => QueryError::Timeout(message),
        ErrorClass::Connection => QueryError::Connection(message),
    })
}

/// `message="..."` when the server sent one, else the line without the
/// `<stdin>:N:` location prefix.
fn error_message(line: &str) -> String {
    if let Some(start) = line.find("message=\"") {
        let rest = &line[start + "message=\"".len()..];
        let end = rest.rfind('"').unwrap_or(rest.len());
        return rest[..end].to_string();
    }
    let line = line.trim();
    match line.strip_prefix("<stdin>:") {
        Some(rest) => rest.split_once(':').map_or(rest, |(_, r)| r).trim().to_string(),
        None => line.to_string(),
    }
}

fn is_separator(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.contains('-') && line.chars().all(|c| c == '-' || c == '+')
}

/// Rows of the last table cqlsh printed; empty for writes and DDL.
pub fn parse_rows(stdout: &str) -> Result<Rows> {
    let lines: Vec<&str> = stdout.lines().collect();
    let Some(separator) = lines.iter().rposition(|l| is_separator(l)) else {
        return Ok(vec![]);
    };
    let json = separator > 0 && lines[separator - 1].trim() == JSON_HEADER;
    let boundaries = column_boundaries(lines[separator]);

    lines[separator + 1..]
        .iter()
        .take_while(|l| !l.trim().is_empty() && !l.trim_start().starts_with('('))
        .map(|l| {
            if json {
                parse_json_row(l)
            } else {
                Ok(parse_row(l, &boundaries))
            }
        })
        .collect()
}

/// Character offsets of the `+` marks; cqlsh pads every cell to its column
/// width, so the `|` of each row sits at the same offsets.
fn column_boundaries(separator: &str) -> Vec<usize> {
    separator
        .chars()
        .enumerate()
        .filter_map(|(i, c)| (c == '+').then_some(i))
        .collect()
}

fn parse_row(
    line: &str,
    boundaries: &[usize],
) -> Row {
    let chars: Vec<char> = line.chars().collect();
    let mut row = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;
    for &boundary in boundaries {
        let end = boundary.min(chars.len());
        row.push(cell(&chars[start.min(end)..end]));
        start = boundary + 1;
    }
    row.push(cell(&chars[start.min(chars.len())..]));
    row
}

fn cell(chars: &[char]) -> Value {
    Value::parse_cell(&chars.iter().collect::<String>())
}

/// One `SELECT JSON` row, columns in selection order.
///
/// cqlsh doubles every backslash of a text cell, JSON escapes included.
fn parse_json_row(line: &str) -> Result<Row> {
    let text = line.trim().replace("\\\\", "\\");
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)
        .map_err(|e| ParseError::MalformedOutput(format!("JSON row `{text}`: {e}")))?;
    Ok(object.into_iter().map(|(_, v)| Value::from(v)).collect())
}
