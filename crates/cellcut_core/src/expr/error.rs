//! Expression errors and non-fatal evaluation warnings.

use crate::expr::ast::Span;
use crate::session::job::JobInterrupt;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ExprResult<T> = Result<T, ExprError>;

const SNIPPET_CONTEXT_CHARS: usize = 12;
const MAX_WARNING_SAMPLES: usize = 10;

/// Fatal expression failure. Parse-time variants carry a char position and
/// a snippet of the offending text.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    /// Text does not match the grammar.
    Syntax {
        position: usize,
        message: String,
        snippet: String,
    },
    /// Text uses a construct outside the allow-listed grammar.
    SecurityRejection {
        position: usize,
        message: String,
        snippet: String,
    },
    /// Operand kinds do not fit the operator (e.g. `area AND 3`).
    Type {
        position: usize,
        message: String,
        snippet: String,
    },
    /// Referenced column is missing from the dataset schema.
    UnknownColumn {
        column: String,
        position: usize,
        snippet: String,
    },
    /// Dataset column shorter than the dataset record count.
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },
    /// Function argument outside its valid range, e.g. `percentile(x, 120)`.
    InvalidArgument {
        function: &'static str,
        message: String,
    },
    /// Too many records were invalidated by numeric failures.
    TooManyInvalidRecords {
        invalid: usize,
        total: usize,
        max_ratio: f64,
    },
    Interrupted(JobInterrupt),
}

impl ExprError {
    pub(crate) fn syntax(source: &str, span: Span, message: impl Into<String>) -> Self {
        Self::Syntax {
            position: span.start,
            message: message.into(),
            snippet: snippet(source, span),
        }
    }

    pub(crate) fn security(source: &str, span: Span, message: impl Into<String>) -> Self {
        Self::SecurityRejection {
            position: span.start,
            message: message.into(),
            snippet: snippet(source, span),
        }
    }

    pub(crate) fn type_mismatch(source: &str, span: Span, message: impl Into<String>) -> Self {
        Self::Type {
            position: span.start,
            message: message.into(),
            snippet: snippet(source, span),
        }
    }

    /// Char position of the failure, when it is tied to the source text.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Syntax { position, .. }
            | Self::SecurityRejection { position, .. }
            | Self::Type { position, .. }
            | Self::UnknownColumn { position, .. } => Some(*position),
            _ => None,
        }
    }

    pub fn is_security_rejection(&self) -> bool {
        matches!(self, Self::SecurityRejection { .. })
    }
}

impl Display for ExprError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax {
                position,
                message,
                snippet,
            } => write!(f, "syntax error at position {position}: {message} (near `{snippet}`)"),
            Self::SecurityRejection {
                position,
                message,
                snippet,
            } => write!(
                f,
                "expression rejected at position {position}: {message} (near `{snippet}`)"
            ),
            Self::Type {
                position,
                message,
                snippet,
            } => write!(f, "type error at position {position}: {message} (near `{snippet}`)"),
            Self::UnknownColumn {
                column,
                position,
                snippet,
            } => write!(
                f,
                "unknown column `{column}` at position {position} (near `{snippet}`)"
            ),
            Self::ColumnLength {
                column,
                expected,
                actual,
            } => write!(
                f,
                "column `{column}` has {actual} values but the dataset has {expected} records"
            ),
            Self::InvalidArgument { function, message } => {
                write!(f, "invalid argument to {function}(): {message}")
            }
            Self::TooManyInvalidRecords {
                invalid,
                total,
                max_ratio,
            } => write!(
                f,
                "{invalid} of {total} records could not be evaluated (limit {:.1}%)",
                max_ratio * 100.0
            ),
            Self::Interrupted(reason) => write!(f, "evaluation stopped: {reason}"),
        }
    }
}

impl Error for ExprError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Interrupted(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<JobInterrupt> for ExprError {
    fn from(value: JobInterrupt) -> Self {
        Self::Interrupted(value)
    }
}

/// Category of a non-fatal numeric issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Division by zero. Affected records evaluate to `false`.
    DivisionByZero,
    /// `sqrt`/`log`/`**` outside the real domain; result is NaN.
    DomainError,
    /// Statistic over a column with no finite values; result is NaN.
    EmptyStatistic,
}

/// Aggregated non-fatal issue for one operator or call site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationWarning {
    pub kind: WarningKind,
    pub position: usize,
    pub snippet: String,
    pub record_count: usize,
    /// First affected record indices, capped.
    pub sample_indices: Vec<usize>,
}

impl Display for EvaluationWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let what = match self.kind {
            WarningKind::DivisionByZero => "division by zero",
            WarningKind::DomainError => "value outside function domain",
            WarningKind::EmptyStatistic => "statistic over no finite values",
        };
        write!(
            f,
            "{what} at position {} (`{}`) affected {} record(s)",
            self.position, self.snippet, self.record_count
        )
    }
}

/// Collects warnings keyed by kind and full source span.
///
/// Nested operators can share a start position (`a / b / c`), so the whole
/// span identifies a site.
#[derive(Debug, Default)]
pub(crate) struct WarningCollector {
    warnings: Vec<EvaluationWarning>,
    sites: Vec<(WarningKind, Span)>,
}

impl WarningCollector {
    pub(crate) fn record(
        &mut self,
        source: &str,
        kind: WarningKind,
        span: Span,
        indices: impl IntoIterator<Item = usize>,
    ) {
        let position = self
            .sites
            .iter()
            .position(|site| *site == (kind, span));
        let warning = match position {
            Some(found) => &mut self.warnings[found],
            None => {
                self.warnings.push(EvaluationWarning {
                    kind,
                    position: span.start,
                    snippet: snippet(source, span),
                    record_count: 0,
                    sample_indices: Vec::new(),
                });
                self.sites.push((kind, span));
                let last = self.warnings.len() - 1;
                &mut self.warnings[last]
            }
        };
        for index in indices {
            warning.record_count += 1;
            if warning.sample_indices.len() < MAX_WARNING_SAMPLES {
                warning.sample_indices.push(index);
            }
        }
    }

    pub(crate) fn into_warnings(self) -> Vec<EvaluationWarning> {
        self.warnings
    }
}

/// Text covered by `span`, widened by a few chars of context on each side.
pub(crate) fn snippet(source: &str, span: Span) -> String {
    let chars: Vec<char> = source.chars().collect();
    let start = span.start.saturating_sub(SNIPPET_CONTEXT_CHARS);
    let end = (span.end + SNIPPET_CONTEXT_CHARS).min(chars.len());
    if start >= end {
        return String::new();
    }
    chars[start..end].iter().collect::<String>().trim().to_string()
}
