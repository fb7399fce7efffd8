use super::{BinaryOp, EvalError, Expr, PmfKind, Result, UnaryOp, Value};

/// Parse specification text into an [`Expr`].
pub fn parse_expression(source: &str) -> Result<Expr> {
    let mut parser = Parser::new(source);
    parser.skip_ws();
    if parser.eof() {
        return Err(parser.error("empty expression"));
    }
    let expr = parser.parse_ternary()?;
    parser.skip_ws();
    if !parser.eof() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

const KEYWORDS: &[&str] = &["AND", "OR", "XOR", "NOT", "true", "false"];

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: 0,
        }
    }

    fn eof(&self) -> bool {
        self.index >= self.bytes.len()
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn advance(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Consume `symbol` if it is next in the input.
    fn eat(&mut self, symbol: &str) -> bool {
        self.skip_ws();
        if self.src[self.index..].starts_with(symbol) {
            self.index += symbol.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, symbol: &str) -> Result<()> {
        if self.eat(symbol) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", symbol)))
        }
    }

    /// Consume a whole-word keyword.
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        let rest = &self.src[self.index..];
        if !rest.starts_with(keyword) {
            return false;
        }
        let boundary = rest.as_bytes().get(keyword.len()).copied();
        if boundary.map(is_ident_char).unwrap_or(false) {
            return false;
        }
        self.index += keyword.len();
        true
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let condition = self.parse_or()?;
        if self.eat("?") {
            let then = self.parse_ternary()?;
            self.expect(":")?;
            let otherwise = self.parse_ternary()?;
            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(condition)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            let op = if self.eat_keyword("OR") {
                BinaryOp::Or
            } else if self.eat_keyword("XOR") {
                BinaryOp::Xor
            } else {
                break;
            };
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("AND") {
            let rhs = self.parse_not()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword("NOT") {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_additive()?;
        // Two-character operators must be tried before their prefixes.
        let op = if self.eat("==") {
            BinaryOp::Eq
        } else if self.eat("<>") || self.eat("!=") {
            BinaryOp::NotEq
        } else if self.eat("<=") {
            BinaryOp::LessEq
        } else if self.eat(">=") {
            BinaryOp::GreaterEq
        } else if self.eat("<") {
            BinaryOp::Less
        } else if self.eat(">") {
            BinaryOp::Greater
        } else {
            return Ok(lhs);
        };
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.eat("+") {
                BinaryOp::Add
            } else if self.eat("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_power()?;
        loop {
            let op = if self.eat("*") {
                BinaryOp::Mul
            } else if self.eat("/") {
                BinaryOp::Div
            } else if self.eat("%") {
                BinaryOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_power()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_unary()?;
        if self.eat("^") {
            let exponent = self.parse_power()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat("-") {
            let operand = self.parse_unary()?;
            return Ok(match operand {
                Expr::Literal(Value::Int(num)) => Expr::Literal(Value::Int(-num)),
                Expr::Literal(Value::Double(num)) => Expr::Literal(Value::Double(-num)),
                other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
            });
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        self.skip_ws();
        let ch = self
            .current()
            .ok_or_else(|| self.error("unexpected end of input"))?;
        match ch {
            b'(' => {
                self.advance();
                let inner = self.parse_ternary()?;
                self.expect(")")?;
                Ok(inner)
            }
            b'"' => Ok(Expr::Literal(Value::Enum(self.parse_string()?))),
            b'0'..=b'9' => Ok(Expr::Literal(self.parse_number()?)),
            c if is_ident_start(c) => self.parse_identifier_form(),
            _ => Err(self.error("unexpected character")),
        }
    }

    fn parse_identifier_form(&mut self) -> Result<Expr> {
        let name = self.parse_identifier()?;
        match name.as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            kw if KEYWORDS.contains(&kw) => {
                return Err(self.error(&format!("unexpected keyword '{}'", kw)));
            }
            _ => {}
        }

        let pmf_kind = match name.as_str() {
            "IntPMF" => Some(PmfKind::Int),
            "DoublePMF" => Some(PmfKind::Double),
            "BoolPMF" => Some(PmfKind::Bool),
            "EnumPMF" => Some(PmfKind::Enum),
            _ => None,
        };
        if let Some(kind) = pmf_kind {
            return self.parse_pmf(kind);
        }
        if name == "DoublePDF" {
            return self.parse_pdf();
        }

        self.skip_ws();
        if self.current() == Some(b'(') {
            self.advance();
            let mut args = Vec::new();
            if !self.eat(")") {
                loop {
                    args.push(self.parse_ternary()?);
                    if self.eat(")") {
                        break;
                    }
                    self.expect(",")?;
                }
            }
            return Ok(Expr::Call {
                function: name,
                args,
            });
        }

        Ok(Expr::Variable(name))
    }

    fn parse_pmf(&mut self, kind: PmfKind) -> Result<Expr> {
        self.expect("[")?;
        let mut samples = Vec::new();
        while !self.eat("]") {
            self.expect("(")?;
            self.skip_ws();
            let value = match kind {
                PmfKind::Int => match self.parse_signed_number()? {
                    Value::Int(num) => Value::Int(num),
                    _ => return Err(self.error("IntPMF samples must be integers")),
                },
                PmfKind::Double => match self.parse_signed_number()? {
                    Value::Int(num) => Value::Double(num as f64),
                    other => other,
                },
                PmfKind::Bool => {
                    if self.eat_keyword("true") {
                        Value::Bool(true)
                    } else if self.eat_keyword("false") {
                        Value::Bool(false)
                    } else {
                        return Err(self.error("BoolPMF samples must be true or false"));
                    }
                }
                PmfKind::Enum => Value::Enum(self.parse_string()?),
            };
            self.expect(";")?;
            let probability = self.parse_probability()?;
            self.expect(")")?;
            samples.push((value, probability));
        }
        if samples.is_empty() {
            return Err(self.error("distribution requires at least one sample"));
        }
        Ok(Expr::Pmf { kind, samples })
    }

    fn parse_pdf(&mut self) -> Result<Expr> {
        self.expect("[")?;
        let mut boxes = Vec::new();
        while !self.eat("]") {
            self.expect("(")?;
            let bound = self
                .parse_signed_number()?
                .as_f64()
                .ok_or_else(|| self.error("density bound must be numeric"))?;
            self.expect(";")?;
            let probability = self.parse_probability()?;
            self.expect(")")?;
            boxes.push((bound, probability));
        }
        if boxes.is_empty() {
            return Err(self.error("density requires at least one interval"));
        }
        Ok(Expr::Pdf(boxes))
    }

    fn parse_probability(&mut self) -> Result<f64> {
        self.parse_signed_number()?
            .as_f64()
            .ok_or_else(|| self.error("probability must be numeric"))
    }

    fn parse_signed_number(&mut self) -> Result<Value> {
        let negative = self.eat("-");
        self.skip_ws();
        match self.parse_number()? {
            Value::Int(num) if negative => Ok(Value::Int(-num)),
            Value::Double(num) if negative => Ok(Value::Double(-num)),
            other => Ok(other),
        }
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.index;
        let mut is_float = false;
        self.consume_digits();
        if self.current() == Some(b'.') && self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            self.consume_digits();
        }
        if matches!(self.current(), Some(b'e') | Some(b'E')) {
            let mark = self.index;
            self.advance();
            if matches!(self.current(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            if self.current().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.consume_digits();
            } else {
                self.index = mark;
            }
        }
        if start == self.index {
            return Err(self.error("expected a number"));
        }

        let text = &self.src[start..self.index];
        if is_float {
            text.parse::<f64>()
                .map(Value::Double)
                .map_err(|_| self.error("invalid double literal"))
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.error("invalid integer literal"))
        }
    }

    fn consume_digits(&mut self) {
        while self.current().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        self.skip_ws();
        if self.current() != Some(b'"') {
            return Err(self.error("expected string literal"));
        }
        self.advance();
        let start = self.index;
        while let Some(ch) = self.current() {
            if ch == b'"' {
                let text = self.src[start..self.index].to_string();
                self.advance();
                return Ok(text);
            }
            self.advance();
        }
        Err(self.error("unterminated string literal"))
    }

    fn parse_identifier(&mut self) -> Result<String> {
        let start = self.index;
        while let Some(ch) = self.current() {
            if is_ident_char(ch) {
                self.advance();
            } else if ch == b'.' && self.peek_char().is_some_and(is_ident_start) {
                // Dotted references: `list.INNER.VALUE`.
                self.advance();
            } else {
                break;
            }
        }
        if start == self.index {
            return Err(self.error("expected identifier"));
        }
        Ok(self.src[start..self.index].to_string())
    }

    fn error(&self, message: &str) -> EvalError {
        EvalError::Syntax {
            message: message.to_string(),
            offset: self.index,
        }
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals() {
        assert_eq!(
            parse_expression("2.0").unwrap(),
            Expr::Literal(Value::Double(2.0))
        );
        assert_eq!(parse_expression(" 42 ").unwrap(), Expr::Literal(Value::Int(42)));
        assert_eq!(
            parse_expression("-3").unwrap(),
            Expr::Literal(Value::Int(-3))
        );
        assert_eq!(
            parse_expression("1e3").unwrap(),
            Expr::Literal(Value::Double(1000.0))
        );
        assert_eq!(
            parse_expression("true").unwrap(),
            Expr::Literal(Value::Bool(true))
        );
    }

    #[test]
    fn parses_dotted_variables() {
        assert_eq!(
            parse_expression("files.INNER.BYTESIZE").unwrap(),
            Expr::Variable("files.INNER.BYTESIZE".to_string())
        );
    }

    #[test]
    fn respects_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Add, lhs, rhs) => {
                assert_eq!(*lhs, Expr::Literal(Value::Int(1)));
                assert!(matches!(*rhs, Expr::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn power_is_right_associative() {
        let expr = parse_expression("2 ^ 3 ^ 2").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Pow, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(BinaryOp::Pow, _, _)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn parses_boolean_logic_and_comparisons() {
        let expr = parse_expression("NOT a.VALUE > 3 AND b.VALUE <> 2 OR c.VALUE").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::Or, _, _)));
    }

    #[test]
    fn parses_distributions() {
        let expr = parse_expression("IntPMF[(1;0.25)(2;0.75)]").unwrap();
        assert_eq!(
            expr,
            Expr::Pmf {
                kind: PmfKind::Int,
                samples: vec![(Value::Int(1), 0.25), (Value::Int(2), 0.75)],
            }
        );

        let expr = parse_expression("EnumPMF[(\"read\";0.5)(\"write\";0.5)]").unwrap();
        assert!(matches!(expr, Expr::Pmf { kind: PmfKind::Enum, .. }));

        let expr = parse_expression("DoublePDF[(1.0;0.3)(2.0;0.7)]").unwrap();
        assert_eq!(expr, Expr::Pdf(vec![(1.0, 0.3), (2.0, 0.7)]));
    }

    #[test]
    fn parses_function_calls_and_conditionals() {
        let expr = parse_expression("x.VALUE > 2 ? Exp(0.5) : Max(1, 2)").unwrap();
        match expr {
            Expr::Conditional { then, otherwise, .. } => {
                assert!(matches!(*then, Expr::Call { ref function, .. } if function == "Exp"));
                assert!(
                    matches!(*otherwise, Expr::Call { ref args, .. } if args.len() == 2)
                );
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("(1").is_err());
        assert!(parse_expression("IntPMF[]").is_err());
        assert!(parse_expression("AND").is_err());
        assert!(matches!(
            parse_expression("1 2"),
            Err(EvalError::Syntax { .. })
        ));
    }
}
