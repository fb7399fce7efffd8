use rand::Rng;
use std::f64::consts::PI;

use super::{BinaryOp, EvalError, ExpectedType, Expr, Result, StoEx, UnaryOp, Value, integral};

/// Probability mass that may be missing (or surplus) in a distribution literal.
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-6;

/// What a scope knows about a variable name.
pub enum ScopeEntry<'a> {
    /// Concrete value.
    Value(&'a Value),
    /// Expression evaluated on read against the scope it was declared in.
    Late {
        /// Expression to evaluate.
        expression: &'a StoEx,
        /// Scope the expression was bound in.
        origin: &'a dyn Scope,
    },
}

/// Variable lookup used by the evaluator.
pub trait Scope {
    /// Resolve `name`, innermost binding first.
    fn entry(&self, name: &str) -> Option<ScopeEntry<'_>>;
}

/// Evaluate `stoex` against `scope`, converting the result to `expected`.
pub fn evaluate<R: Rng + ?Sized>(
    stoex: &StoEx,
    scope: &dyn Scope,
    expected: ExpectedType,
    rng: &mut R,
) -> Result<Value> {
    let value = eval_expr(stoex.expr(), scope, rng)?;
    coerce(value, expected, stoex.source())
}

/// Evaluate to a double.
pub fn evaluate_f64<R: Rng + ?Sized>(stoex: &StoEx, scope: &dyn Scope, rng: &mut R) -> Result<f64> {
    let value = eval_expr(stoex.expr(), scope, rng)?;
    value
        .as_f64()
        .ok_or_else(|| mismatch(stoex, ExpectedType::Double, &value))
}

/// Evaluate to an integer. Integral doubles are accepted.
pub fn evaluate_i64<R: Rng + ?Sized>(stoex: &StoEx, scope: &dyn Scope, rng: &mut R) -> Result<i64> {
    let value = eval_expr(stoex.expr(), scope, rng)?;
    value
        .as_i64()
        .ok_or_else(|| mismatch(stoex, ExpectedType::Integer, &value))
}

/// Evaluate to a boolean.
pub fn evaluate_bool<R: Rng + ?Sized>(stoex: &StoEx, scope: &dyn Scope, rng: &mut R) -> Result<bool> {
    let value = eval_expr(stoex.expr(), scope, rng)?;
    value
        .as_bool()
        .ok_or_else(|| mismatch(stoex, ExpectedType::Boolean, &value))
}

fn mismatch(stoex: &StoEx, expected: ExpectedType, found: &Value) -> EvalError {
    EvalError::TypeMismatch {
        expression: stoex.source().to_string(),
        expected,
        found: found.type_name(),
    }
}

fn coerce(value: Value, expected: ExpectedType, source: &str) -> Result<Value> {
    let converted = match expected {
        ExpectedType::Any => Some(value.clone()),
        ExpectedType::Integer => value.as_i64().map(Value::Int),
        ExpectedType::Double => value.as_f64().map(Value::Double),
        ExpectedType::Boolean => value.as_bool().map(Value::Bool),
    };
    converted.ok_or_else(|| EvalError::TypeMismatch {
        expression: source.to_string(),
        expected,
        found: value.type_name(),
    })
}

fn eval_expr<R: Rng + ?Sized>(expr: &Expr, scope: &dyn Scope, rng: &mut R) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name) => match scope.entry(name) {
            Some(ScopeEntry::Value(value)) => Ok(value.clone()),
            Some(ScopeEntry::Late { expression, origin }) => {
                eval_expr(expression.expr(), origin, rng)
            }
            None => Err(EvalError::UnknownVariable(name.clone())),
        },
        Expr::Unary(op, operand) => {
            let value = eval_expr(operand, scope, rng)?;
            eval_unary(*op, value)
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            if !expect_bool(eval_expr(lhs, scope, rng)?, BinaryOp::And)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(expect_bool(eval_expr(rhs, scope, rng)?, BinaryOp::And)?))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            if expect_bool(eval_expr(lhs, scope, rng)?, BinaryOp::Or)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(expect_bool(eval_expr(rhs, scope, rng)?, BinaryOp::Or)?))
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval_expr(lhs, scope, rng)?;
            let rhs = eval_expr(rhs, scope, rng)?;
            eval_binary(*op, lhs, rhs)
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => match eval_expr(condition, scope, rng)? {
            Value::Bool(true) => eval_expr(then, scope, rng),
            Value::Bool(false) => eval_expr(otherwise, scope, rng),
            other => Err(EvalError::InvalidOperands {
                operator: "?:",
                operands: other.type_name().to_string(),
            }),
        },
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|arg| eval_expr(arg, scope, rng))
                .collect::<Result<Vec<_>>>()?;
            call_function(function, &values, rng)
        }
        Expr::Pmf { samples, .. } => sample_pmf(samples, rng),
        Expr::Pdf(boxes) => sample_pdf(boxes, rng),
    }
}

fn expect_bool(value: Value, op: BinaryOp) -> Result<bool> {
    value.as_bool().ok_or_else(|| EvalError::InvalidOperands {
        operator: op.symbol(),
        operands: value.type_name().to_string(),
    })
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(num)) => num
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| overflow("-")),
        (UnaryOp::Neg, Value::Double(num)) => Ok(Value::Double(-num)),
        (UnaryOp::Not, Value::Bool(flag)) => Ok(Value::Bool(!flag)),
        (op, other) => Err(EvalError::InvalidOperands {
            operator: if op == UnaryOp::Neg { "-" } else { "NOT" },
            operands: other.type_name().to_string(),
        }),
    }
}

fn eval_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    use BinaryOp::{
        Add, And, Div, Eq, Greater, GreaterEq, Less, LessEq, Mod, Mul, NotEq, Or, Pow, Sub, Xor,
    };

    let invalid = |lhs: &Value, rhs: &Value| EvalError::InvalidOperands {
        operator: op.symbol(),
        operands: format!("{} and {}", lhs.type_name(), rhs.type_name()),
    };

    match op {
        Add | Sub | Mul | Mod | Pow => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b),
            _ => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => double_arithmetic(op, a, b),
                _ => Err(invalid(&lhs, &rhs)),
            },
        },
        Div => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(_), Some(b)) if b == 0.0 => Err(EvalError::DivisionByZero),
            (Some(a), Some(b)) => Ok(Value::Double(a / b)),
            _ => Err(invalid(&lhs, &rhs)),
        },
        Eq | NotEq => {
            let equal = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => match (&lhs, &rhs) {
                    (Value::Bool(a), Value::Bool(b)) => a == b,
                    (Value::Enum(a), Value::Enum(b)) => a == b,
                    _ => return Err(invalid(&lhs, &rhs)),
                },
            };
            Ok(Value::Bool(if op == Eq { equal } else { !equal }))
        }
        Less | LessEq | Greater | GreaterEq => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Bool(match op {
                Less => a < b,
                LessEq => a <= b,
                Greater => a > b,
                _ => a >= b,
            })),
            _ => Err(invalid(&lhs, &rhs)),
        },
        Xor => match (&lhs, &rhs) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a ^ b)),
            _ => Err(invalid(&lhs, &rhs)),
        },
        And | Or => unreachable!("short-circuit operators are handled by eval_expr"),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Mod => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_rem(b)
        }
        BinaryOp::Pow => {
            if b < 0 {
                return Ok(Value::Double((a as f64).powf(b as f64)));
            }
            u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp))
        }
        _ => None,
    };
    result.map(Value::Int).ok_or_else(|| overflow(op.symbol()))
}

fn double_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a % b
        }
        BinaryOp::Pow => a.powf(b),
        _ => {
            return Err(EvalError::InvalidOperands {
                operator: op.symbol(),
                operands: "doubles".to_string(),
            });
        }
    };
    Ok(Value::Double(result))
}

fn overflow(operator: &'static str) -> EvalError {
    EvalError::InvalidOperands {
        operator,
        operands: "integers (overflow)".to_string(),
    }
}

fn call_function<R: Rng + ?Sized>(name: &str, args: &[Value], rng: &mut R) -> Result<Value> {
    match (name, args) {
        ("Exp", [rate]) => {
            let rate = numeric(name, rate)?;
            if rate <= 0.0 {
                return Err(EvalError::InvalidDistribution(format!(
                    "Exp rate must be positive, got {}",
                    rate
                )));
            }
            let u: f64 = rng.r#gen();
            Ok(Value::Double(-(1.0 - u).ln() / rate))
        }
        ("Norm", [mu, sigma]) => {
            let (mu, sigma) = (numeric(name, mu)?, numeric(name, sigma)?);
            Ok(Value::Double(mu + sigma * standard_normal(rng)))
        }
        ("Lognorm", [mu, sigma]) => {
            let (mu, sigma) = (numeric(name, mu)?, numeric(name, sigma)?);
            Ok(Value::Double((mu + sigma * standard_normal(rng)).exp()))
        }
        ("UniDouble", [low, high]) => {
            let (low, high) = (numeric(name, low)?, numeric(name, high)?);
            if low > high {
                return Err(EvalError::InvalidDistribution(format!(
                    "UniDouble bounds out of order: {} > {}",
                    low, high
                )));
            }
            let u: f64 = rng.r#gen();
            Ok(Value::Double(low + (high - low) * u))
        }
        ("UniInt", [low, high]) => match (low.as_i64(), high.as_i64()) {
            (Some(low), Some(high)) if low <= high => Ok(Value::Int(rng.gen_range(low..=high))),
            _ => Err(EvalError::InvalidDistribution(
                "UniInt expects ordered integer bounds".to_string(),
            )),
        },
        ("Trunc" | "Round", [value]) => {
            let num = numeric(name, value)?;
            let whole = if name == "Trunc" { num.trunc() } else { num.round() };
            integral(whole).map(Value::Int).ok_or_else(|| EvalError::InvalidOperands {
                operator: if name == "Trunc" { "Trunc" } else { "Round" },
                operands: format!("{} (outside the integer range)", num),
            })
        }
        ("Abs", [Value::Int(num)]) => num.checked_abs().map(Value::Int).ok_or_else(|| overflow("Abs")),
        ("Abs", [value]) => Ok(Value::Double(numeric(name, value)?.abs())),
        ("Min" | "Max", [Value::Int(a), Value::Int(b)]) => Ok(Value::Int(if name == "Min" {
            *a.min(b)
        } else {
            *a.max(b)
        })),
        ("Min" | "Max", [a, b]) => {
            let (a, b) = (numeric(name, a)?, numeric(name, b)?);
            Ok(Value::Double(if name == "Min" { a.min(b) } else { a.max(b) }))
        }
        _ => Err(EvalError::InvalidCall(format!(
            "{}/{} is not a known function",
            name,
            args.len()
        ))),
    }
}

fn numeric(function: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        EvalError::InvalidCall(format!(
            "{} expects numeric arguments, got {}",
            function,
            value.type_name()
        ))
    })
}

/// Box-Muller transform.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn check_probabilities<'a>(probabilities: impl Iterator<Item = &'a f64>) -> Result<()> {
    let mut total = 0.0;
    for p in probabilities {
        if !p.is_finite() || *p < 0.0 {
            return Err(EvalError::InvalidDistribution(format!(
                "probability {} is not in [0, 1]",
                p
            )));
        }
        total += p;
    }
    if (total - 1.0).abs() > DISTRIBUTION_TOLERANCE {
        return Err(EvalError::InvalidDistribution(format!(
            "probabilities sum to {} instead of 1",
            total
        )));
    }
    Ok(())
}

fn sample_pmf<R: Rng + ?Sized>(samples: &[(Value, f64)], rng: &mut R) -> Result<Value> {
    check_probabilities(samples.iter().map(|(_, p)| p))?;
    let u: f64 = rng.r#gen();
    let mut cumulative = 0.0;
    for (value, probability) in samples {
        cumulative += probability;
        if u < cumulative {
            return Ok(value.clone());
        }
    }
    // Rounding slack: the last sample with non-zero mass absorbs it.
    samples
        .iter()
        .rev()
        .find(|(_, p)| *p > 0.0)
        .map(|(value, _)| value.clone())
        .ok_or_else(|| EvalError::InvalidDistribution("empty distribution".to_string()))
}

fn sample_pdf<R: Rng + ?Sized>(boxes: &[(f64, f64)], rng: &mut R) -> Result<Value> {
    check_probabilities(boxes.iter().map(|(_, p)| p))?;
    let mut lower = 0.0;
    for (upper, _) in boxes {
        if *upper <= lower {
            return Err(EvalError::InvalidDistribution(format!(
                "density bounds must increase from 0, found {} after {}",
                upper, lower
            )));
        }
        lower = *upper;
    }

    let u: f64 = rng.r#gen();
    let mut cumulative = 0.0;
    let mut lower = 0.0;
    for (upper, probability) in boxes {
        if *probability > 0.0 && u < cumulative + probability {
            let within = (u - cumulative) / probability;
            return Ok(Value::Double(lower + (upper - lower) * within));
        }
        cumulative += probability;
        lower = *upper;
    }
    Ok(Value::Double(lower))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    struct MapScope(HashMap<String, Value>);

    impl Scope for MapScope {
        fn entry(&self, name: &str) -> Option<ScopeEntry<'_>> {
            self.0.get(name).map(ScopeEntry::Value)
        }
    }

    fn scope(entries: &[(&str, Value)]) -> MapScope {
        MapScope(
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    fn eval(source: &str, scope: &MapScope, expected: ExpectedType) -> Result<Value> {
        let mut rng = StdRng::seed_from_u64(7);
        evaluate(&StoEx::parse(source)?, scope, expected, &mut rng)
    }

    #[test]
    fn evaluates_arithmetic_with_variables() {
        let vars = scope(&[("n.VALUE", Value::Int(4))]);
        assert_eq!(
            eval("n.VALUE * 2 + 1", &vars, ExpectedType::Any).unwrap(),
            Value::Int(9)
        );
        assert_eq!(
            eval("n.VALUE / 8", &vars, ExpectedType::Double).unwrap(),
            Value::Double(0.5)
        );
        assert_eq!(
            eval("2 ^ 10", &vars, ExpectedType::Integer).unwrap(),
            Value::Int(1024)
        );
    }

    #[test]
    fn converts_to_expected_type() {
        let vars = scope(&[]);
        assert_eq!(
            eval("3", &vars, ExpectedType::Double).unwrap(),
            Value::Double(3.0)
        );
        assert_eq!(
            eval("4.0", &vars, ExpectedType::Integer).unwrap(),
            Value::Int(4)
        );
        let err = eval("4.5", &vars, ExpectedType::Integer).unwrap_err();
        assert_eq!(
            err,
            EvalError::TypeMismatch {
                expression: "4.5".to_string(),
                expected: ExpectedType::Integer,
                found: "double",
            }
        );
    }

    #[test]
    fn reports_unknown_variables() {
        let vars = scope(&[]);
        assert_eq!(
            eval("missing.VALUE", &vars, ExpectedType::Any).unwrap_err(),
            EvalError::UnknownVariable("missing.VALUE".to_string())
        );
    }

    #[test]
    fn evaluates_boolean_guards() {
        let vars = scope(&[
            ("size.VALUE", Value::Int(10)),
            ("mode.VALUE", Value::Enum("fast".to_string())),
        ]);
        assert_eq!(
            eval(
                "size.VALUE >= 10 AND mode.VALUE == \"fast\"",
                &vars,
                ExpectedType::Boolean
            )
            .unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval("NOT size.VALUE < 3 XOR true", &vars, ExpectedType::Boolean).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval("size.VALUE > 3 ? 1 : 2", &vars, ExpectedType::Integer).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let vars = scope(&[]);
        assert_eq!(
            eval("1 / 0", &vars, ExpectedType::Any).unwrap_err(),
            EvalError::DivisionByZero
        );
        assert_eq!(
            eval("1 % 0", &vars, ExpectedType::Any).unwrap_err(),
            EvalError::DivisionByZero
        );
    }

    #[test]
    fn abs_of_smallest_integer_overflows() {
        let vars = scope(&[]);
        assert_eq!(
            eval("Abs(0 - 9223372036854775807 - 1)", &vars, ExpectedType::Any).unwrap_err(),
            overflow("Abs")
        );
        assert_eq!(
            eval("Abs(0 - 5)", &vars, ExpectedType::Any).unwrap(),
            Value::Int(5)
        );
    }

    #[test]
    fn out_of_range_doubles_are_not_integers() {
        let vars = scope(&[]);
        let mut rng = StdRng::seed_from_u64(1);
        let huge = StoEx::parse("1e300").unwrap();
        assert!(matches!(
            evaluate_i64(&huge, &vars, &mut rng),
            Err(EvalError::TypeMismatch { .. })
        ));
        let two_pow_63 = StoEx::parse("9223372036854775808.0").unwrap();
        assert!(evaluate_i64(&two_pow_63, &vars, &mut rng).is_err());
        assert!(matches!(
            eval("Trunc(1e300)", &vars, ExpectedType::Any),
            Err(EvalError::InvalidOperands { operator: "Trunc", .. })
        ));
        assert!(matches!(
            eval("Round(0 - 1e300)", &vars, ExpectedType::Any),
            Err(EvalError::InvalidOperands { operator: "Round", .. })
        ));
        assert_eq!(
            eval("Round(2.5)", &vars, ExpectedType::Any).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn samples_pmf_within_support() {
        let vars = scope(&[]);
        let stoex = StoEx::parse("IntPMF[(1;0.5)(3;0.5)]").unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let value = evaluate(&stoex, &vars, ExpectedType::Integer, &mut rng).unwrap();
            assert!(value == Value::Int(1) || value == Value::Int(3));
        }
    }

    #[test]
    fn rejects_pmf_not_summing_to_one() {
        let vars = scope(&[]);
        let err = eval("IntPMF[(1;0.5)(3;0.2)]", &vars, ExpectedType::Any).unwrap_err();
        assert!(matches!(err, EvalError::InvalidDistribution(_)));
    }

    #[test]
    fn samples_pdf_within_bounds() {
        let vars = scope(&[]);
        let stoex = StoEx::parse("DoublePDF[(1.0;0.5)(4.0;0.5)]").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let value = evaluate(&stoex, &vars, ExpectedType::Double, &mut rng)
                .unwrap()
                .as_f64()
                .unwrap();
            assert!((0.0..=4.0).contains(&value));
        }
    }

    #[test]
    fn exponential_samples_are_positive() {
        let vars = scope(&[]);
        let stoex = StoEx::parse("Exp(2.0)").unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mean = (0..5000)
            .map(|_| {
                evaluate(&stoex, &vars, ExpectedType::Double, &mut rng)
                    .unwrap()
                    .as_f64()
                    .unwrap()
            })
            .inspect(|sample| assert!(*sample >= 0.0))
            .sum::<f64>()
            / 5000.0;
        assert!((mean - 0.5).abs() < 0.05, "mean was {}", mean);
    }

    #[test]
    fn unknown_functions_are_rejected() {
        let vars = scope(&[]);
        assert!(matches!(
            eval("Gamma(1, 2)", &vars, ExpectedType::Any).unwrap_err(),
            EvalError::InvalidCall(_)
        ));
    }

    #[test]
    fn late_entries_evaluate_against_their_origin() {
        struct Layered {
            expression: StoEx,
            origin: MapScope,
        }

        impl Scope for Layered {
            fn entry(&self, name: &str) -> Option<ScopeEntry<'_>> {
                (name == "late.VALUE").then_some(ScopeEntry::Late {
                    expression: &self.expression,
                    origin: &self.origin,
                })
            }
        }

        let layered = Layered {
            expression: StoEx::parse("base.VALUE + 1").unwrap(),
            origin: scope(&[("base.VALUE", Value::Int(41))]),
        };
        let mut rng = StdRng::seed_from_u64(1);
        let value = evaluate(
            &StoEx::variable("late.VALUE"),
            &layered,
            ExpectedType::Integer,
            &mut rng,
        )
        .unwrap();
        assert_eq!(value, Value::Int(42));
    }
}
