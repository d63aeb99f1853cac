//! Recursive-descent parser producing an [`Expr`] tree.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparison.
//!
//! Trees deeper than [`MAX_DEPTH`] are rejected so that neither parsing nor
//! evaluation can exhaust the stack.

use serde_json::Value;

use crate::lexer::{tokenize, Token};
use crate::ExpressionError;

/// Deepest expression tree [`parse`] accepts. Every `not`, `(`, `and` and
/// `or` counts one level.
pub const MAX_DEPTH: usize = 64;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Symbol(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

/// Parse `source` into an expression tree.
///
/// # Errors
/// Returns [`ExpressionError::Invalid`] for empty input, lexical errors,
/// unbalanced parentheses, trailing tokens, or nesting beyond [`MAX_DEPTH`].
pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ExpressionError::invalid(source, "expression is empty"));
    }

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;

    if let Some(token) = parser.peek() {
        return Err(ExpressionError::invalid(
            source,
            format!("unexpected trailing token {token:?}"),
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
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, reason: impl Into<String>) -> ExpressionError {
        ExpressionError::invalid(self.source, reason)
    }

    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            // chains build left-deep trees
            self.descend()?;
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.not()?;
        while self.eat(&Token::And) {
            self.descend()?;
            let right = self.not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.primary()?;

        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;

        let right = self.primary()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Number(n)) => serde_json::Number::from_f64(n)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| self.error(format!("number {n} is not finite"))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Symbol(name)),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.or()?;
                if !self.eat(&Token::RParen) {
                    return Err(self.error("missing closing parenthesis"));
                }
                self.depth -= 1;
                Ok(inner)
            }
            Some(other) => Err(self.error(format!("unexpected token {other:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sym(name: &str) -> Box<Expr> {
        Box::new(Expr::Symbol(name.into()))
    }

    fn lit(value: Value) -> Box<Expr> {
        Box::new(Expr::Literal(value))
    }

    #[test]
    fn parses_simple_comparison() {
        let expr = parse(r#"status == "sent""#).unwrap();
        assert_eq!(expr, Expr::Compare(CompareOp::Eq, sym("status"), lit(json!("sent"))));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // a or (b and c)
        let expr = parse("a or b and c").unwrap();
        assert_eq!(
            expr,
            Expr::Or(sym("a"), Box::new(Expr::And(sym("b"), sym("c"))))
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse("(a or b) and c").unwrap();
        assert_eq!(
            expr,
            Expr::And(Box::new(Expr::Or(sym("a"), sym("b"))), sym("c"))
        );
    }

    #[test]
    fn not_applies_to_comparison() {
        let expr = parse(r#"not status == "sent""#).unwrap();
        assert_eq!(
            expr,
            Expr::Not(Box::new(Expr::Compare(
                CompareOp::Eq,
                sym("status"),
                lit(json!("sent"))
            )))
        );
    }

    #[test]
    fn empty_expression_is_invalid() {
        assert!(matches!(parse("   "), Err(ExpressionError::Invalid { .. })));
    }

    #[test]
    fn unbalanced_parenthesis_is_invalid() {
        assert!(matches!(parse("(a == 1"), Err(ExpressionError::Invalid { .. })));
    }

    #[test]
    fn trailing_tokens_are_invalid() {
        assert!(matches!(parse("a == 1 b"), Err(ExpressionError::Invalid { .. })));
    }

    #[test]
    fn deep_not_chain_is_rejected() {
        let source = format!("{}true", "not ".repeat(20_000));
        let err = parse(&source).unwrap_err();
        assert!(
            matches!(&err, ExpressionError::Invalid { reason, .. } if reason.contains("nested too deeply")),
            "{err:?}"
        );
    }

    #[test]
    fn deep_parentheses_and_long_chains_are_rejected() {
        let parens = format!("{}a{}", "(".repeat(20_000), ")".repeat(20_000));
        assert!(matches!(parse(&parens), Err(ExpressionError::Invalid { .. })));

        let chain = vec!["a"; 20_000].join(" or ");
        assert!(matches!(parse(&chain), Err(ExpressionError::Invalid { .. })));
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        let source = format!("{}true", "not ".repeat(MAX_DEPTH));
        assert!(parse(&source).is_ok());
        let source = format!("{}true", "not ".repeat(MAX_DEPTH + 1));
        assert!(parse(&source).is_err());
    }

    #[test]
    fn dangling_operator_is_invalid() {
        assert!(matches!(parse("status =="), Err(ExpressionError::Invalid { .. })));
    }
}
