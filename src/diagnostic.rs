use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Mutex;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const E_UNCLOSED_FRONTMATTER: u16 = 1001;
pub const E_UNCLOSED_SECTION: u16 = 1002;
pub const E_DUPLICATE_SECTION: u16 = 1003;
pub const E_UNTERMINATED_EXPRESSION: u16 = 1004;
pub const E_UNTERMINATED_TAG: u16 = 1005;
pub const E_INVALID_JAVASCRIPT: u16 = 1006;

pub const E_UNTERMINATED_BLOCK: u16 = 2001;
pub const E_UNEXPECTED_CLOSE: u16 = 2002;
pub const E_MISMATCHED_CLOSE: u16 = 2003;
pub const E_BRANCH_OUTSIDE_IF: u16 = 2004;
pub const E_BRANCH_AFTER_ELSE: u16 = 2005;
pub const E_MALFORMED_LOOP: u16 = 2006;
pub const E_MISSING_CONDITION: u16 = 2007;
pub const E_UNKNOWN_DIRECTIVE: u16 = 2008;

pub const E_MISSING_REQUIRED_PROP: u16 = 3001;
pub const E_INVALID_PROP_TYPE: u16 = 3002;
pub const E_UNDECLARED_EVENT: u16 = 3003;
pub const E_INVALID_SLOT: u16 = 3004;
pub const E_INVALID_BINDING: u16 = 3005;

pub const E_UNBALANCED_STYLE: u16 = 4001;
pub const E_UNDEFINED_STYLE_VARIABLE: u16 = 4002;
pub const E_UNTERMINATED_STYLE_COMMENT: u16 = 4003;

/// Error family, mirroring the thousands digit of the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Syntax,
    Directive,
    Component,
    Style,
}

impl ErrorKind {
    pub fn from_code(code: u16) -> Self {
        match code / 1000 {
            1 => ErrorKind::Syntax,
            2 => ErrorKind::Directive,
            3 => ErrorKind::Component,
            _ => ErrorKind::Style,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::Directive => "directive",
            ErrorKind::Component => "component",
            ErrorKind::Style => "style",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SUGGESTIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn default_suggestion(code: u16) -> &'static str {
    match code {
        E_UNCLOSED_FRONTMATTER => "close the script section with a line containing only ---",
        E_UNCLOSED_SECTION => "add the matching closing tag for this section",
        E_DUPLICATE_SECTION => "merge the duplicate sections into one",
        E_UNTERMINATED_EXPRESSION => "close the expression with }",
        E_UNTERMINATED_TAG => "close the tag with >",
        E_INVALID_JAVASCRIPT => "fix the JavaScript syntax of this expression or script",
        E_UNTERMINATED_BLOCK => "add the matching closing marker for this block",
        E_UNEXPECTED_CLOSE => "remove the closing marker or add the block that opens it",
        E_MISMATCHED_CLOSE => "close inner blocks before closing the outer block",
        E_BRANCH_OUTSIDE_IF => "{:else} and {:else if} are only valid inside {#if}...{/if}",
        E_BRANCH_AFTER_ELSE => "{:else} must be the last branch of an {#if} block",
        E_MALFORMED_LOOP => {
            "use {#for item[, index] in items} or {#each items as item[, index]}"
        }
        E_MISSING_CONDITION => "provide a condition, e.g. {#if visible}",
        E_UNKNOWN_DIRECTIVE => "supported blocks are {#if}, {#for} and {#each}",
        E_MISSING_REQUIRED_PROP => "pass the prop or give it a default",
        E_INVALID_PROP_TYPE => "pass a value of the declared type",
        E_UNDECLARED_EVENT => "add the event name to the emits list",
        E_INVALID_SLOT => "give every <slot> a non-empty name",
        E_INVALID_BINDING => "#bind must name a state declared with $state(...)",
        E_UNBALANCED_STYLE => "check that every { in the stylesheet has a matching }",
        E_UNDEFINED_STYLE_VARIABLE => "declare the variable before use, e.g. $primary: #333;",
        E_UNTERMINATED_STYLE_COMMENT => "close the comment with */",
        _ => "",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("[E{code}] {message} ({file}:{line}:{column})")]
pub struct CompilerError {
    pub kind: ErrorKind,
    pub code: u16,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
    pub suggestion: Option<String>,
    pub note: Option<String>,
}

impl CompilerError {
    pub fn new(code: u16, message: &str, file: &str, line: u32, column: u32) -> Self {
        let suggestion = default_suggestion(code);
        CompilerError {
            kind: ErrorKind::from_code(code),
            code,
            message: message.to_string(),
            file: file.to_string(),
            line,
            column,
            context: None,
            suggestion: if suggestion.is_empty() {
                None
            } else {
                Some(suggestion.to_string())
            },
            note: None,
        }
    }

    /// Build an error located at a byte offset of `source`, with the source
    /// context already rendered.
    pub fn at(code: u16, message: &str, file: &str, source: &str, offset: usize) -> Self {
        let index = LineIndex::new(source);
        let (line, column) = index.position(offset);
        let mut err = Self::new(code, message, file, line, column);
        err.context = Some(index.context(line, column));
        err
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn code_str(&self) -> String {
        format!("E{:04}", self.code)
    }

    /// Human readable, multi-line rendering with a caret under the column.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} error[{}]: {}", self.kind.as_str(), self.code_str(), self.message);
        let _ = writeln!(out, "  --> {}:{}:{}", self.file, self.line, self.column);
        if let Some(context) = &self.context {
            out.push_str(context);
        }
        if let Some(suggestion) = &self.suggestion {
            let _ = writeln!(out, "   = help: {}", suggestion);
        }
        if let Some(note) = &self.note {
            let _ = writeln!(out, "   = note: {}", note);
        }
        out
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Maps byte offsets to 1-based line/column pairs. Columns count characters.
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex {
            source,
            line_starts,
        }
    }

    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line];
        let column = self
            .source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start);
        (line as u32 + 1, column as u32 + 1)
    }

    pub fn line_text(&self, line: u32) -> &'a str {
        let idx = (line as usize).saturating_sub(1);
        let Some(&start) = self.line_starts.get(idx) else {
            return "";
        };
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|e| e - 1)
            .unwrap_or(self.source.len());
        self.source[start..end].trim_end_matches('\r')
    }

    pub fn context(&self, line: u32, column: u32) -> String {
        let gutter = line.to_string().len();
        let pad = " ".repeat(gutter);
        let mut out = String::new();
        let _ = writeln!(out, " {} |", pad);
        let _ = writeln!(out, " {} | {}", line, self.line_text(line));
        let _ = writeln!(
            out,
            " {} | {}^",
            pad,
            " ".repeat(column.saturating_sub(1) as usize)
        );
        out
    }
}

/// Builds errors for offsets relative to one section of a source file.
#[derive(Debug, Clone, Copy)]
pub struct Locator<'a> {
    pub file: &'a str,
    pub source: &'a str,
    /// Byte offset of the section inside `source`.
    pub base: usize,
}

impl<'a> Locator<'a> {
    pub fn new(file: &'a str, source: &'a str, base: usize) -> Self {
        Locator { file, source, base }
    }

    pub fn error(&self, code: u16, message: &str, offset: usize) -> CompilerError {
        CompilerError::at(code, message, self.file, self.source, self.base + offset)
    }

    pub fn position(&self, offset: usize) -> (u32, u32) {
        LineIndex::new(self.source).position(self.base + offset)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC SINKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Receives the formatted rendering of a diagnostic before it is returned to
/// the caller of `compile`.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, error: &CompilerError);
}

/// Default sink: forwards to the `log` facade.
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&self, error: &CompilerError) {
        log::error!("[aspc] {}", error.render());
    }
}

/// Collects rendered diagnostics in memory.
#[derive(Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, error: &CompilerError) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(error.render());
        }
    }
}
