//! Closed syntax tree for filter expressions.
//!
//! # Invariants
//! - The tree can only represent literals, column references, arithmetic,
//!   comparisons, boolean connectives and calls to allow-listed functions.
//!   There is no node for attribute access, subscripts, assignment or
//!   arbitrary calls.

/// Half-open char range `[start, end)` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Number(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Pow
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Not,
}

/// Allow-listed functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Mean,
    Std,
    Var,
    Min,
    Max,
    Median,
    Percentile,
    Count,
    Sum,
    Abs,
    Sqrt,
    Log,
    Log10,
}

const ALLOWED_FUNCTIONS: [Function; 13] = [
    Function::Mean,
    Function::Std,
    Function::Var,
    Function::Min,
    Function::Max,
    Function::Median,
    Function::Percentile,
    Function::Count,
    Function::Sum,
    Function::Abs,
    Function::Sqrt,
    Function::Log,
    Function::Log10,
];

impl Function {
    /// Looks up an allow-listed function by its (case-insensitive) name.
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.to_ascii_lowercase();
        ALLOWED_FUNCTIONS
            .iter()
            .copied()
            .find(|function| function.name() == lowered)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Std => "std",
            Self::Var => "var",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Percentile => "percentile",
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Log => "log",
            Self::Log10 => "log10",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Self::Percentile => 2,
            _ => 1,
        }
    }

    /// Aggregates reduce a column to one scalar over the full dataset.
    pub fn is_aggregate(self) -> bool {
        !matches!(self, Self::Abs | Self::Sqrt | Self::Log | Self::Log10)
    }

    pub fn all() -> &'static [Function] {
        &ALLOWED_FUNCTIONS
    }
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
        span: Span,
    },
    ColumnRef {
        name: String,
        span: Span,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
        span: Span,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Self::Literal { span, .. }
            | Self::ColumnRef { span, .. }
            | Self::BinaryOp { span, .. }
            | Self::UnaryOp { span, .. }
            | Self::Call { span, .. } => *span,
        }
    }

    /// Visits every column reference with its span, in source order.
    pub fn for_each_column<'a>(&'a self, visit: &mut impl FnMut(&'a str, Span)) {
        match self {
            Self::Literal { .. } => {}
            Self::ColumnRef { name, span } => visit(name.as_str(), *span),
            Self::BinaryOp { left, right, .. } => {
                left.for_each_column(visit);
                right.for_each_column(visit);
            }
            Self::UnaryOp { operand, .. } => operand.for_each_column(visit),
            Self::Call { args, .. } => {
                for arg in args {
                    arg.for_each_column(visit);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Function;

    #[test]
    fn function_lookup_is_case_insensitive_and_closed() {
        assert_eq!(Function::from_name("MEAN"), Some(Function::Mean));
        assert_eq!(Function::from_name("log10"), Some(Function::Log10));
        assert_eq!(Function::from_name("eval"), None);
        assert_eq!(Function::from_name("__import__"), None);
    }

    #[test]
    fn percentile_takes_two_arguments() {
        assert_eq!(Function::Percentile.arity(), 2);
        assert!(Function::Percentile.is_aggregate());
        assert!(!Function::Sqrt.is_aggregate());
    }
}
