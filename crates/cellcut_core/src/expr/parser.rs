//! Recursive-descent parser and static validation.
//!
//! Precedence, lowest first:
//! `OR` < `AND` < `NOT` < comparison < `+ -` < `* /` < unary `-` < `**`.
//! `**` is right-associative and binds tighter than unary minus, so
//! `-x ** 2` is `-(x ** 2)`.

use crate::expr::ast::{BinaryOperator, Expr, Function, Literal, Span, UnaryOperator};
use crate::expr::error::{ExprError, ExprResult};
use crate::expr::lexer::{tokenize, Token, TokenKind};

/// Maximum tree depth accepted by the parser. Every binary operator in a
/// chain adds a level, as do parentheses, unary operators and calls.
const MAX_DEPTH: usize = 128;

/// Static kind of a sub-expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Boolean,
}

/// Whether a sub-expression varies per record or is one scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    PerRecord,
}

pub(crate) fn parse_tree(source: &str) -> ExprResult<Expr> {
    if source.trim().is_empty() {
        return Err(ExprError::syntax(source, Span::new(0, 0), "expression is empty"));
    }
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(ExprError::syntax(
            source,
            trailing.span,
            "unexpected token after end of expression",
        ));
    }
    let (kind, _) = check(source, &expr)?;
    if kind != ValueKind::Boolean {
        return Err(ExprError::type_mismatch(
            source,
            expr.span(),
            "expression must be a condition (e.g. `area > 100`), not a number",
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn descend(&mut self, span: Span) -> ExprResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::syntax(
                self.source,
                span,
                "expression is too long or nested too deeply",
            ));
        }
        Ok(())
    }

    /// Each fold deepens the left-leaning tree by one level.
    fn fold(&mut self, folds: &mut usize) -> ExprResult<()> {
        let span = self.advance().span;
        *folds += 1;
        self.descend(span)
    }

    fn parse_or(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_and()?;
        let mut folds = 0;
        while self.peek().kind == TokenKind::Or {
            self.fold(&mut folds)?;
            let right = self.parse_and()?;
            left = binary(BinaryOperator::Or, left, right);
        }
        self.depth -= folds;
        Ok(left)
    }

    fn parse_and(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_not()?;
        let mut folds = 0;
        while self.peek().kind == TokenKind::And {
            self.fold(&mut folds)?;
            let right = self.parse_not()?;
            left = binary(BinaryOperator::And, left, right);
        }
        self.depth -= folds;
        Ok(left)
    }

    fn parse_not(&mut self) -> ExprResult<Expr> {
        if self.peek().kind == TokenKind::Not {
            let token = self.advance();
            self.descend(token.span)?;
            let operand = self.parse_not()?;
            self.depth -= 1;
            let span = token.span.join(operand.span());
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ExprResult<Expr> {
        let left = self.parse_additive()?;
        let Some(op) = comparison_operator(&self.peek().kind) else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_additive()?;
        if let Some(chained) = comparison_operator(&self.peek().kind) {
            return Err(ExprError::syntax(
                self.source,
                self.peek().span,
                format!(
                    "chained comparison `{}` is not supported; combine comparisons with AND",
                    chained.symbol()
                ),
            ));
        }
        Ok(binary(op, left, right))
    }

    fn parse_additive(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        let mut folds = 0;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.fold(&mut folds)?;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        self.depth -= folds;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_unary()?;
        let mut folds = 0;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                _ => break,
            };
            self.fold(&mut folds)?;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        self.depth -= folds;
        Ok(left)
    }

    fn parse_unary(&mut self) -> ExprResult<Expr> {
        match self.peek().kind {
            TokenKind::Minus => {
                let token = self.advance();
                self.descend(token.span)?;
                let operand = self.parse_unary()?;
                self.depth -= 1;
                let span = token.span.join(operand.span());
                Ok(Expr::UnaryOp {
                    op: UnaryOperator::Neg,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Plus => {
                let token = self.advance();
                self.descend(token.span)?;
                let operand = self.parse_unary()?;
                self.depth -= 1;
                Ok(operand)
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> ExprResult<Expr> {
        let base = self.parse_primary()?;
        if self.peek().kind == TokenKind::StarStar {
            let token = self.advance();
            self.descend(token.span)?;
            let exponent = self.parse_unary()?;
            self.depth -= 1;
            return Ok(binary(BinaryOperator::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Literal {
                value: Literal::Number(value),
                span: token.span,
            }),
            TokenKind::True => Ok(Expr::Literal {
                value: Literal::Bool(true),
                span: token.span,
            }),
            TokenKind::False => Ok(Expr::Literal {
                value: Literal::Bool(false),
                span: token.span,
            }),
            TokenKind::QuotedIdent(name) => Ok(Expr::ColumnRef {
                name,
                span: token.span,
            }),
            TokenKind::Ident(name) => {
                if self.peek().kind == TokenKind::LParen {
                    return self.parse_call(name, token.span);
                }
                Ok(Expr::ColumnRef {
                    name,
                    span: token.span,
                })
            }
            TokenKind::LParen => {
                self.descend(token.span)?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                let close = self.peek().clone();
                if !self.eat(&TokenKind::RParen) {
                    return Err(ExprError::syntax(
                        self.source,
                        close.span,
                        "expected `)` to close `(`",
                    ));
                }
                Ok(inner)
            }
            TokenKind::Eof => Err(ExprError::syntax(
                self.source,
                token.span,
                "unexpected end of expression",
            )),
            _ => Err(ExprError::syntax(
                self.source,
                token.span,
                "expected a number, column or function call",
            )),
        }
    }

    fn parse_call(&mut self, name: String, name_span: Span) -> ExprResult<Expr> {
        let Some(function) = Function::from_name(&name) else {
            return Err(ExprError::security(
                self.source,
                name_span,
                format!(
                    "function `{name}` is not allowed (allowed: {})",
                    Function::all()
                        .iter()
                        .map(|function| function.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        };
        self.advance();
        self.descend(name_span)?;

        let mut args = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                args.push(self.parse_or()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.depth -= 1;

        let close = self.peek().clone();
        if !self.eat(&TokenKind::RParen) {
            return Err(ExprError::syntax(
                self.source,
                close.span,
                format!("expected `)` to close call to {}()", function.name()),
            ));
        }
        let span = name_span.join(close.span);
        if args.len() != function.arity() {
            return Err(ExprError::syntax(
                self.source,
                span,
                format!(
                    "{}() takes {} argument(s), got {}",
                    function.name(),
                    function.arity(),
                    args.len()
                ),
            ));
        }
        Ok(Expr::Call {
            function,
            args,
            span,
        })
    }
}

fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    let span = left.span().join(right.span());
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    }
}

fn comparison_operator(kind: &TokenKind) -> Option<BinaryOperator> {
    match kind {
        TokenKind::Lt => Some(BinaryOperator::Lt),
        TokenKind::Le => Some(BinaryOperator::Le),
        TokenKind::Gt => Some(BinaryOperator::Gt),
        TokenKind::Ge => Some(BinaryOperator::Ge),
        TokenKind::EqEq => Some(BinaryOperator::Eq),
        TokenKind::NotEq => Some(BinaryOperator::Ne),
        _ => None,
    }
}

/// Static kind/shape check over the whole tree.
pub(crate) fn check(source: &str, expr: &Expr) -> ExprResult<(ValueKind, Shape)> {
    match expr {
        Expr::Literal { value, .. } => Ok(match value {
            Literal::Number(_) => (ValueKind::Number, Shape::Scalar),
            Literal::Bool(_) => (ValueKind::Boolean, Shape::Scalar),
        }),
        Expr::ColumnRef { .. } => Ok((ValueKind::Number, Shape::PerRecord)),
        Expr::UnaryOp { op, operand, span } => {
            let (kind, shape) = check(source, operand)?;
            let expected = match op {
                UnaryOperator::Neg => ValueKind::Number,
                UnaryOperator::Not => ValueKind::Boolean,
            };
            if kind != expected {
                let message = match op {
                    UnaryOperator::Neg => "unary `-` needs a number",
                    UnaryOperator::Not => "NOT needs a condition",
                };
                return Err(ExprError::type_mismatch(source, *span, message));
            }
            Ok((kind, shape))
        }
        Expr::BinaryOp {
            op,
            left,
            right,
            span,
        } => {
            let (left_kind, left_shape) = check(source, left)?;
            let (right_kind, right_shape) = check(source, right)?;
            let shape = if left_shape == Shape::PerRecord || right_shape == Shape::PerRecord {
                Shape::PerRecord
            } else {
                Shape::Scalar
            };
            let operand_kind = if matches!(op, BinaryOperator::And | BinaryOperator::Or) {
                ValueKind::Boolean
            } else {
                ValueKind::Number
            };
            if left_kind != operand_kind || right_kind != operand_kind {
                let expected = match operand_kind {
                    ValueKind::Number => "numbers",
                    ValueKind::Boolean => "conditions",
                };
                return Err(ExprError::type_mismatch(
                    source,
                    *span,
                    format!("`{}` needs {expected} on both sides", op.symbol()),
                ));
            }
            let kind = if op.is_arithmetic() {
                ValueKind::Number
            } else {
                ValueKind::Boolean
            };
            Ok((kind, shape))
        }
        Expr::Call { function, args, .. } => {
            let mut shape = Shape::Scalar;
            for (position, arg) in args.iter().enumerate() {
                let (kind, arg_shape) = check(source, arg)?;
                if kind != ValueKind::Number {
                    return Err(ExprError::type_mismatch(
                        source,
                        arg.span(),
                        format!("{}() needs numeric arguments", function.name()),
                    ));
                }
                if *function == Function::Percentile && position == 1 && arg_shape != Shape::Scalar
                {
                    return Err(ExprError::type_mismatch(
                        source,
                        arg.span(),
                        "percentile rank must be a constant or a statistic",
                    ));
                }
                if arg_shape == Shape::PerRecord {
                    shape = Shape::PerRecord;
                }
            }
            if function.is_aggregate() {
                return Ok((ValueKind::Number, Shape::Scalar));
            }
            Ok((ValueKind::Number, shape))
        }
    }
}
