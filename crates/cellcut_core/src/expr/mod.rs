//! Restricted filter-expression engine.
//!
//! # Responsibility
//! - Turn user text into a closed syntax tree (`parse`).
//! - Check column dependencies against a dataset schema (`dependencies`).
//! - Evaluate the tree into a boolean mask over all records (`evaluate`).
//!
//! # Invariants
//! - Anything outside the grammar is rejected at parse time, before any
//!   evaluation, with a position and snippet.
//! - Evaluation is structural recursion over `ast::Expr`; there is no
//!   general code-execution path.
//! - Unknown columns are rejected before evaluation starts.

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

use crate::model::cell::CellDataset;
use crate::session::job::JobControl;
use ast::Expr;
use error::{snippet, ExprError, ExprResult};
use eval::{EvaluationOutcome, Evaluator};
use log::{debug, warn};
use std::collections::BTreeSet;

/// Validated expression plus its source text, kept for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    source: String,
    root: Expr,
}

impl ParsedExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// All referenced column names, without schema validation.
    pub fn columns(&self) -> BTreeSet<String> {
        let mut columns = BTreeSet::new();
        self.root.for_each_column(&mut |name, _| {
            columns.insert(name.to_string());
        });
        columns
    }
}

/// Parses and statically validates `text`.
///
/// # Errors
/// - `SecurityRejection` for constructs outside the grammar (attribute
///   access, assignment, subscripts, non-allow-listed calls, ...).
/// - `Syntax` for malformed input and `Type` for ill-typed operands.
pub fn parse(text: &str) -> ExprResult<ParsedExpression> {
    match parser::parse_tree(text) {
        Ok(root) => {
            debug!(
                "event=expr_parsed module=expr status=ok chars={}",
                text.chars().count()
            );
            Ok(ParsedExpression {
                source: text.to_string(),
                root,
            })
        }
        Err(err) => {
            warn!(
                "event=expr_parsed module=expr status=error security={} position={}",
                err.is_security_rejection(),
                err.position().unwrap_or_default()
            );
            Err(err)
        }
    }
}

/// Returns the referenced columns, failing on the first one missing from
/// `dataset` (in source order).
pub fn dependencies<D: CellDataset + ?Sized>(
    parsed: &ParsedExpression,
    dataset: &D,
) -> ExprResult<BTreeSet<String>> {
    let mut columns = BTreeSet::new();
    let mut missing = None;
    parsed.root.for_each_column(&mut |name, span| {
        if missing.is_some() {
            return;
        }
        if dataset.has_column(name) {
            columns.insert(name.to_string());
        } else {
            missing = Some(ExprError::UnknownColumn {
                column: name.to_string(),
                position: span.start,
                snippet: snippet(&parsed.source, span),
            });
        }
    });
    match missing {
        Some(err) => Err(err),
        None => Ok(columns),
    }
}

/// Evaluates with default settings and no cancellation.
pub fn evaluate<D: CellDataset + ?Sized>(
    parsed: &ParsedExpression,
    dataset: &D,
) -> ExprResult<EvaluationOutcome> {
    Evaluator::default().evaluate(parsed, dataset, &JobControl::new())
}
