//! SQL safety validator
//!
//! Heuristic, not a parser: a statement is rejected when it matches a
//! deny-list pattern or carries more than one statement, and is otherwise
//! classified by its leading keyword. Classification drives the permission
//! check in [`crate::permissions`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::config::SecurityConfig;
use crate::db::SqlParam;
use crate::error::GateError;
use crate::identifier;

// ============================================================================
// Classification
// ============================================================================

const READ_KEYWORDS: &[&str] = &["select", "show", "describe", "desc", "explain"];
const WRITE_KEYWORDS: &[&str] = &["insert", "update", "delete", "replace"];
const DDL_KEYWORDS: &[&str] = &["create", "alter", "drop", "truncate", "rename"];
const PROCEDURE_KEYWORDS: &[&str] = &["call", "execute"];
const TRANSACTION_KEYWORDS: &[&str] = &["begin", "start", "commit", "rollback", "savepoint"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlClass {
    Read,
    Write,
    Ddl,
    Procedure,
    Transaction,
    Unknown,
}

impl SqlClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlClass::Read => "read",
            SqlClass::Write => "write",
            SqlClass::Ddl => "ddl",
            SqlClass::Procedure => "procedure",
            SqlClass::Transaction => "transaction",
            SqlClass::Unknown => "unknown",
        }
    }

    pub fn requires_privilege(&self) -> bool {
        matches!(
            self,
            SqlClass::Write | SqlClass::Ddl | SqlClass::Procedure | SqlClass::Transaction
        )
    }
}

impl fmt::Display for SqlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a statement by its first keyword
///
/// Statements opening with `WITH` or `(` are reads, unless a `WITH` statement
/// has a data-modifying keyword outside its parenthesized CTE bodies.
pub fn classify(sql: &str) -> SqlClass {
    let lowered = sql.trim().to_lowercase();
    let first: String = lowered
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    let keyword = first.as_str();
    if READ_KEYWORDS.contains(&keyword) {
        SqlClass::Read
    } else if WRITE_KEYWORDS.contains(&keyword) {
        SqlClass::Write
    } else if DDL_KEYWORDS.contains(&keyword) {
        SqlClass::Ddl
    } else if PROCEDURE_KEYWORDS.contains(&keyword) {
        SqlClass::Procedure
    } else if TRANSACTION_KEYWORDS.contains(&keyword) {
        SqlClass::Transaction
    } else if keyword == "with" {
        if has_top_level_write(&strip_literals_and_comments(&lowered)) {
            SqlClass::Write
        } else {
            SqlClass::Read
        }
    } else if lowered.starts_with('(') {
        SqlClass::Read
    } else {
        SqlClass::Unknown
    }
}

/// True when a write keyword appears outside parentheses and is not a
/// function call such as `REPLACE(...)` or `INSERT(...)`
///
/// Expects code with literals and comments already stripped. `FOR UPDATE`
/// locking reads count as writes.
fn has_top_level_write(code: &str) -> bool {
    let is_write = |word: &str| WRITE_KEYWORDS.contains(&word);
    let mut depth = 0usize;
    let mut word = String::new();
    // last top-level word, held until the next non-space character
    let mut pending: Option<String> = None;

    for c in code.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
            if pending.take().is_some_and(|w| is_write(w.as_str())) {
                return true;
            }
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            let done = std::mem::take(&mut word);
            if depth == 0 {
                pending = Some(done);
            }
        }
        if c.is_whitespace() {
            continue;
        }
        if pending.take().is_some_and(|w| c != '(' && is_write(w.as_str())) {
            return true;
        }
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    let last = if word.is_empty() { pending } else { Some(word).filter(|_| depth == 0) };
    last.is_some_and(|w| is_write(w.as_str()))
}

// ============================================================================
// Validation
// ============================================================================

/// Built-in deny-list, matched case-insensitive and multiline
const DENY_PATTERNS: &[&str] = &[
    // statement chaining into destructive commands
    r";\s*(drop|delete|truncate|alter)\s+",
    // always-true delete
    r";\s*delete\s+.*\s+where\s+1\s*=\s*1",
    r"\bdelete\s+from\s+.*\bwhere\s+1\s*=\s*1\b",
    // comment smuggling
    r"--.*drop\s+",
    r"/\*.*\*/\s*;\s*drop",
    // system schemas and privilege tables
    r"\b(mysql|information_schema|performance_schema|sys)\s*\.\s*`?(user|db|tables_priv|columns_priv)\b",
    // file I/O
    r"\binto\s+(outfile|dumpfile)\b|\bload_file\s*\(|\bload\s+data\b",
    // privilege management
    r"\b(grant|revoke)\b",
    r"\b(create|drop|alter|rename)\s+user\b",
];

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
    pub operation_type: Option<SqlClass>,
    pub requires_privilege: bool,
}

impl ValidationResult {
    fn valid(class: SqlClass) -> Self {
        Self {
            is_valid: true,
            error: None,
            operation_type: Some(class),
            requires_privilege: class.requires_privilege(),
        }
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            operation_type: None,
            requires_privilege: false,
        }
    }

    pub fn into_result(self) -> Result<SqlClass, GateError> {
        match (self.is_valid, self.operation_type) {
            (true, Some(class)) => Ok(class),
            _ => Err(GateError::Validation(format!(
                "Invalid SQL query: {}",
                self.error.unwrap_or_else(|| "validation failed".to_string())
            ))),
        }
    }
}

/// Routine kinds whose definitions can be created through the tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Procedure,
    Function,
    Trigger,
}

impl RoutineKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            RoutineKind::Procedure => "PROCEDURE",
            RoutineKind::Function => "FUNCTION",
            RoutineKind::Trigger => "TRIGGER",
        }
    }
}

/// Deny-list validator
#[derive(Clone)]
pub struct SqlValidator {
    deny_patterns: Vec<Regex>,
}

impl SqlValidator {
    /// Compile the built-in deny-list plus any configured extras
    pub fn new(config: &SecurityConfig) -> Result<Self, GateError> {
        let deny_patterns = DENY_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .chain(config.extra_deny_patterns.iter().cloned())
            .map(|p| {
                Regex::new(&format!("(?im){}", p)).map_err(|e| {
                    GateError::Config(format!("Invalid deny pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { deny_patterns })
    }

    /// Validate a single free-form statement
    pub fn validate(&self, sql: &str) -> ValidationResult {
        let sql = sql.trim();
        if sql.is_empty() {
            return ValidationResult::invalid("SQL query cannot be empty");
        }

        if let Some(pattern) = self.dangerous_pattern(sql) {
            tracing::warn!(
                pattern = pattern.as_str(),
                sql_preview = %preview(sql),
                "Dangerous SQL pattern detected"
            );
            return ValidationResult::invalid("SQL contains potentially dangerous pattern");
        }

        if has_executable_comment(sql) {
            tracing::warn!(sql_preview = %preview(sql), "Executable comment rejected");
            return ValidationResult::invalid("Executable comments (/*! ... */) are not allowed");
        }

        if has_multiple_statements(sql) {
            tracing::warn!(sql_preview = %preview(sql), "Multiple statements rejected");
            return ValidationResult::invalid("Multiple SQL statements are not allowed");
        }

        ValidationResult::valid(classify(sql))
    }

    /// Validate a CREATE PROCEDURE / FUNCTION / TRIGGER definition
    ///
    /// Bodies may contain internal semicolons, so only the deny-list applies,
    /// plus a header check that the definition creates `name` of `kind`.
    pub fn validate_routine_definition(
        &self,
        kind: RoutineKind,
        name: &str,
        definition: &str,
    ) -> Result<(), GateError> {
        let name = identifier::sanitize(name)?;
        let definition = definition.trim();
        if definition.is_empty() {
            return Err(GateError::Validation("Definition cannot be empty".to_string()));
        }

        if let Some(pattern) = self.dangerous_pattern(definition) {
            tracing::warn!(
                pattern = pattern.as_str(),
                routine = %name,
                "Dangerous pattern in routine definition"
            );
            return Err(GateError::Validation(
                "Definition contains potentially dangerous pattern".to_string(),
            ));
        }

        if has_executable_comment(definition) {
            return Err(GateError::Validation(
                "Executable comments (/*! ... */) are not allowed in definitions".to_string(),
            ));
        }

        let header = Regex::new(&format!(
            r"(?is)^create\s+(?:definer\s*=\s*\S+\s+)?(?:aggregate\s+)?{}\s+(?:if\s+not\s+exists\s+)?`?([A-Za-z_][A-Za-z0-9_]*)`?",
            kind.keyword()
        ))
        .map_err(|e| GateError::Validation(e.to_string()))?;

        match header.captures(definition) {
            Some(caps) if caps[1].eq_ignore_ascii_case(&name) => Ok(()),
            _ => Err(GateError::Validation(format!(
                "Definition must start with CREATE {} {}",
                kind.keyword(),
                name
            ))),
        }
    }

    fn dangerous_pattern(&self, sql: &str) -> Option<&Regex> {
        self.deny_patterns.iter().find(|p| p.is_match(sql))
    }
}

/// Restrict bound parameters to scalar JSON values
pub fn validate_params(params: &[Value]) -> Result<Vec<SqlParam>, GateError> {
    params
        .iter()
        .enumerate()
        .map(|(i, value)| {
            SqlParam::from_json(value).ok_or_else(|| {
                GateError::Validation(format!(
                    "Invalid parameters: Parameter at index {} has invalid type: {}",
                    i,
                    json_type_name(value)
                ))
            })
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:from|join|update|into)\s+`?([A-Za-z_][A-Za-z0-9_]*)`?")
        .expect("Invalid table reference regex")
});

/// Best-effort table names referenced by a statement, for logging
pub fn extract_table_names(sql: &str) -> Vec<String> {
    TABLE_REFERENCE
        .captures_iter(sql)
        .map(|caps| caps[1].to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// First 100 characters of a statement, for logs
pub fn preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}

// ============================================================================
// Statement boundaries
// ============================================================================

#[derive(Clone, Copy, PartialEq)]
enum ScanState {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

struct Scanned {
    code: String,
    /// A `/*!` or `/*M!` comment, whose body MySQL/MariaDB run as code
    executable_comment: bool,
}

/// Replace string literals with `?`, quoted identifiers with ` _ ` and
/// comments with whitespace, keeping only code
fn strip_literals_and_comments(sql: &str) -> String {
    scan(sql).code
}

fn has_executable_comment(sql: &str) -> bool {
    scan(sql).executable_comment
}

fn scan(sql: &str) -> Scanned {
    let mut out = String::with_capacity(sql.len());
    let mut executable_comment = false;
    let mut state = ScanState::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            ScanState::Code => match c {
                '\'' | '"' => {
                    out.push('?');
                    state = ScanState::Quoted(c);
                }
                '`' => {
                    out.push_str(" _ ");
                    state = ScanState::Quoted(c);
                }
                '#' => state = ScanState::LineComment,
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    match chars.peek() {
                        None => {}
                        Some(n) if n.is_whitespace() => state = ScanState::LineComment,
                        Some(_) => out.push_str("--"),
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut ahead = chars.clone();
                    match ahead.next() {
                        Some('!') => executable_comment = true,
                        Some('M' | 'm') if ahead.next() == Some('!') => executable_comment = true,
                        _ => {}
                    }
                    out.push(' ');
                    state = ScanState::BlockComment;
                }
                _ => out.push(c),
            },
            ScanState::Quoted(q) => {
                if c == '\\' && q != '`' {
                    chars.next();
                } else if c == q {
                    if chars.peek() == Some(&q) {
                        chars.next();
                    } else {
                        state = ScanState::Code;
                    }
                }
            }
            ScanState::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = ScanState::Code;
                }
            }
            ScanState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = ScanState::Code;
                }
            }
        }
    }
    Scanned {
        code: out,
        executable_comment,
    }
}

/// True when a `;` outside literals and comments is followed by more code
fn has_multiple_statements(sql: &str) -> bool {
    let code = strip_literals_and_comments(sql);
    let body = code.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    body.contains(';')
}
