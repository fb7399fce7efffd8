//! Stochastic expressions.
//!
//! Resource demands, loop counts, branch guards and variable characterisations
//! are all written in a small expression language mixing arithmetic, boolean
//! logic and probability distributions (`IntPMF[(1;0.4)(2;0.6)]`,
//! `Exp(2.0)`, ...). This module parses those specifications once when the
//! model is built and evaluates them against an explicit [`Scope`] every time
//! an action needs a value.

/// Evaluation of parsed expressions.
pub mod eval;
/// Hand-written recursive-descent parser.
pub mod parser;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use eval::{Scope, ScopeEntry, evaluate, evaluate_bool, evaluate_f64, evaluate_i64};
pub use parser::parse_expression;

/// Convenience result alias for expression operations.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors surfaced while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The specification text is not a valid expression.
    #[error("invalid expression syntax: {message} at byte {offset}")]
    Syntax {
        /// Description of the problem.
        message: String,
        /// Byte offset where parsing stopped.
        offset: usize,
    },

    /// A referenced variable is not bound in the evaluation scope.
    #[error("variable '{0}' is not bound in the current frame")]
    UnknownVariable(String),

    /// The expression produced a value of the wrong type.
    #[error("expression '{expression}' did not evaluate to {expected} (found {found})")]
    TypeMismatch {
        /// Source text of the offending expression.
        expression: String,
        /// Type requested by the caller.
        expected: ExpectedType,
        /// Type actually produced.
        found: &'static str,
    },

    /// An operator was applied to operands it does not support.
    #[error("operator '{operator}' cannot be applied to {operands}")]
    InvalidOperands {
        /// Operator symbol.
        operator: &'static str,
        /// Operand type description.
        operands: String,
    },

    /// A probability mass/density literal is malformed.
    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),

    /// A function call named an unknown function or used the wrong arity.
    #[error("invalid function call: {0}")]
    InvalidCall(String),

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// Convert a whole double to `i64`, `None` outside the representable range.
pub(crate) fn integral(num: f64) -> Option<i64> {
    // 2^63 itself is out of range; `i64::MIN` is exactly -2^63.
    if num.is_finite() && num >= i64::MIN as f64 && num < -(i64::MIN as f64) {
        Some(num as i64)
    } else {
        None
    }
}

/// Runtime value produced by evaluating an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer.
    Int(i64),
    /// Double-precision floating point number.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// Enumeration literal (string-valued).
    Enum(String),
}

impl Value {
    /// Human readable type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Double(_) => "double",
            Value::Bool(_) => "boolean",
            Value::Enum(_) => "enum",
        }
    }

    /// Numeric view of the value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(num) => Some(*num as f64),
            Value::Double(num) => Some(*num),
            _ => None,
        }
    }

    /// Integer view of the value; doubles are accepted only when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(num) => Some(*num),
            Value::Double(num) if num.fract() == 0.0 => integral(*num),
            _ => None,
        }
    }

    /// Boolean view of the value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(num) => write!(f, "{}", num),
            Value::Double(num) => write!(f, "{}", num),
            Value::Bool(flag) => write!(f, "{}", flag),
            Value::Enum(text) => write!(f, "\"{}\"", text),
        }
    }
}

/// Type requested by the caller of [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedType {
    /// Accept whatever the expression produces.
    Any,
    /// Integer (integral doubles are converted).
    Integer,
    /// Double (integers are widened).
    Double,
    /// Boolean.
    Boolean,
}

impl fmt::Display for ExpectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExpectedType::Any => "any value",
            ExpectedType::Integer => "an integer",
            ExpectedType::Double => "a double",
            ExpectedType::Boolean => "a boolean",
        };
        f.write_str(name)
    }
}

/// Binary operators, in no particular order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `^`
    Pow,
    /// `==`
    Eq,
    /// `<>` or `!=`
    NotEq,
    /// `<`
    Less,
    /// `<=`
    LessEq,
    /// `>`
    Greater,
    /// `>=`
    GreaterEq,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `XOR`
    Xor,
}

impl BinaryOp {
    /// Operator symbol as written in specifications.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "<>",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Xor => "XOR",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Boolean `NOT`.
    Not,
}

/// Kind of a probability mass function literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmfKind {
    /// `IntPMF`
    Int,
    /// `DoublePMF`
    Double,
    /// `BoolPMF`
    Bool,
    /// `EnumPMF`
    Enum,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Literal(Value),
    /// Dotted variable reference, e.g. `files.NUMBER_OF_ELEMENTS`.
    Variable(String),
    /// Unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `condition ? then : otherwise`
    Conditional {
        /// Boolean condition.
        condition: Box<Expr>,
        /// Value when the condition holds.
        then: Box<Expr>,
        /// Value otherwise.
        otherwise: Box<Expr>,
    },
    /// Built-in function call.
    Call {
        /// Function name.
        function: String,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// Probability mass function over discrete samples.
    Pmf {
        /// Sample type.
        kind: PmfKind,
        /// `(value, probability)` pairs.
        samples: Vec<(Value, f64)>,
    },
    /// Boxed probability density: `(upper bound, probability)` pairs, the
    /// first box starting at zero.
    Pdf(Vec<(f64, f64)>),
}

/// A parsed stochastic expression together with its source text.
///
/// Serialized as the source string; deserialization parses it, so a model
/// containing a malformed specification fails to load.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoEx {
    source: Arc<str>,
    expr: Arc<Expr>,
}

impl StoEx {
    /// Parse a specification string.
    pub fn parse(source: &str) -> Result<Self> {
        let expr = parse_expression(source)?;
        Ok(Self {
            source: Arc::from(source.trim()),
            expr: Arc::new(expr),
        })
    }

    /// Build an expression that reads a single variable.
    pub fn variable(name: &str) -> Self {
        Self {
            source: Arc::from(name),
            expr: Arc::new(Expr::Variable(name.to_string())),
        }
    }

    /// Original specification text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed expression tree.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl PartialEq for StoEx {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for StoEx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoEx({:?})", &*self.source)
    }
}

impl fmt::Display for StoEx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl TryFrom<String> for StoEx {
    type Error = EvalError;

    fn try_from(source: String) -> Result<Self> {
        StoEx::parse(&source)
    }
}

impl From<StoEx> for String {
    fn from(stoex: StoEx) -> String {
        stoex.source.to_string()
    }
}

impl std::str::FromStr for StoEx {
    type Err = EvalError;

    fn from_str(source: &str) -> Result<Self> {
        StoEx::parse(source)
    }
}
