//! Recursive-descent parser for expression text.
//!
//! Precedence, lowest first:
//!
//! ```text
//! expr       := or
//! or         := and ("or" and)*
//! and        := unary ("and" unary)*
//! unary      := "!" unary | comparison
//! comparison := arith (OP arith)?
//! arith      := term (("+" | "-") term)*
//! term       := factor (("*" | "/") factor)*
//! factor     := "-" factor | NUMBER | STRING | "(" expr ")"
//!             | path | path "(" [value ("," value)*] ")"
//! value      := path | STRING | NUMBER
//! path       := NAME ("." NAME)*
//! ```

use crate::{error::CompileError, value::Value};

use super::{
    ArithOp, Expr,
    lexer::{Token, TokenKind, tokenize},
};

pub struct ExprParser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    index: usize,
}

type ParseResult<T> = Result<T, CompileError>;

impl<'a> ExprParser<'a> {
    pub fn parse(source: &'a str) -> ParseResult<Expr> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(CompileError::new(source, 0, "empty expression"));
        }

        let mut parser = Self {
            source,
            tokens,
            index: 0,
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(parser.error_at(
                token.position,
                format!("unexpected {}", token.kind.describe()),
            ));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.consume(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.consume(&TokenKind::And) {
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.consume(&TokenKind::Bang) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let left = self.parse_arith()?;
        let Some(TokenKind::Compare(op)) = self.peek().map(|t| &t.kind) else {
            return Ok(left);
        };
        let op = *op;
        self.index += 1;
        let right = self.parse_arith()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_arith(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = if self.consume(&TokenKind::Plus) {
                ArithOp::Add
            } else if self.consume(&TokenKind::Minus) {
                ArithOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.parse_term()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = if self.consume(&TokenKind::Star) {
                ArithOp::Mul
            } else if self.consume(&TokenKind::Slash) {
                ArithOp::Div
            } else {
                return Ok(left);
            };
            let right = self.parse_factor()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        if self.consume(&TokenKind::Minus) {
            let inner = self.parse_factor()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        if self.consume(&TokenKind::LParen) {
            let inner = self.parse_or()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(inner);
        }

        let token = self.next_token("expected a value")?;
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Literal(value)),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            TokenKind::Name(first) => {
                let path = self.parse_path_tail(first)?;
                if self.consume(&TokenKind::LParen) {
                    self.parse_method(path, token.position)
                } else {
                    Ok(Expr::Attr(path))
                }
            }
            other => Err(self.error_at(
                token.position,
                format!("unexpected {}", other.describe()),
            )),
        }
    }

    fn parse_path_tail(&mut self, first: String) -> ParseResult<Vec<String>> {
        let mut path = vec![first];
        while self.consume(&TokenKind::Dot) {
            let token = self.next_token("expected a name after `.`")?;
            match token.kind {
                TokenKind::Name(name) => path.push(name),
                other => {
                    return Err(self.error_at(
                        token.position,
                        format!("expected a name, found {}", other.describe()),
                    ));
                }
            }
        }
        Ok(path)
    }

    /// Called after `(`; the last path segment names the method.
    fn parse_method(
        &mut self,
        mut path: Vec<String>,
        position: usize,
    ) -> ParseResult<Expr> {
        let Some(name) = path.pop() else {
            return Err(self.error_at(position, "missing method name"));
        };

        let mut args = Vec::new();
        if !self.consume(&TokenKind::RParen) {
            loop {
                args.push(self.parse_argument()?);
                if self.consume(&TokenKind::Comma) {
                    continue;
                }
                self.expect(&TokenKind::RParen)?;
                break;
            }
        }

        Ok(Expr::Method {
            receiver: path,
            name,
            args,
        })
    }

    fn parse_argument(&mut self) -> ParseResult<Expr> {
        let token = self.next_token("expected a method argument")?;
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Literal(value)),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            TokenKind::Name(first) => {
                Ok(Expr::Attr(self.parse_path_tail(first)?))
            }
            other => Err(self.error_at(
                token.position,
                format!(
                    "method arguments must be names, strings or numbers, \
                     found {}",
                    other.describe()
                ),
            )),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn next_token(&mut self, context: &str) -> ParseResult<Token> {
        let Some(token) = self.tokens.get(self.index).cloned() else {
            return Err(self.error_at(
                self.source.len(),
                format!("{context} but reached end of expression"),
            ));
        };
        self.index += 1;
        Ok(token)
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<()> {
        if self.consume(kind) {
            return Ok(());
        }
        let (position, found) = match self.peek() {
            Some(token) => (token.position, token.kind.describe()),
            None => (self.source.len(), "end of expression".to_string()),
        };
        Err(self.error_at(
            position,
            format!("expected {}, found {found}", kind.describe()),
        ))
    }

    fn error_at(
        &self,
        position: usize,
        message: impl Into<String>,
    ) -> CompileError {
        CompileError::new(self.source, position, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CompareOp;

    #[test]
    fn comparison_of_path_and_string() {
        let expr = ExprParser::parse("file.ext == \"md\"").unwrap();
        let Expr::Compare { op, left, right } = expr else {
            panic!("expected a comparison");
        };
        assert_eq!(op, CompareOp::Eq);
        assert!(matches!(*left, Expr::Attr(ref p) if p == &["file", "ext"]));
        assert!(matches!(
            *right,
            Expr::Literal(Value::Str(ref s)) if s == "md"
        ));
    }

    #[test]
    fn method_call_splits_receiver() {
        let expr =
            ExprParser::parse("file.tags.containsAny(\"a\", b.c, 3)").unwrap();
        let Expr::Method {
            receiver,
            name,
            args,
        } = expr
        else {
            panic!("expected a method call");
        };
        assert_eq!(receiver, vec!["file", "tags"]);
        assert_eq!(name, "containsAny");
        assert_eq!(args.len(), 3);
        assert!(matches!(args[1], Expr::Attr(ref p) if p == &["b", "c"]));
    }

    #[test]
    fn empty_argument_list() {
        let expr = ExprParser::parse("tags.isEmpty()").unwrap();
        assert!(matches!(
            expr,
            Expr::Method { ref args, .. } if args.is_empty()
        ));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = ExprParser::parse("a or b and c").unwrap();
        let Expr::Or(_, right) = expr else {
            panic!("expected `or` at the root");
        };
        assert!(matches!(*right, Expr::And(_, _)));
    }

    #[test]
    fn bang_binds_tighter_than_and() {
        let expr = ExprParser::parse("!a and b").unwrap();
        let Expr::And(left, _) = expr else {
            panic!("expected `and` at the root");
        };
        assert!(matches!(*left, Expr::Not(_)));
    }

    #[test]
    fn multiplication_binds_tighter() {
        let expr = ExprParser::parse("2+3*4").unwrap();
        let Expr::Arith { op, right, .. } = expr else {
            panic!("expected arithmetic");
        };
        assert_eq!(op, ArithOp::Add);
        assert!(matches!(*right, Expr::Arith { op: ArithOp::Mul, .. }));
    }

    #[test]
    fn unary_minus() {
        let Expr::Neg(inner) = ExprParser::parse("-5").unwrap() else {
            panic!("expected negation");
        };
        assert!(matches!(*inner, Expr::Literal(Value::Int(5))));
    }

    #[test]
    fn trailing_tokens_fail() {
        let err = ExprParser::parse("a b").unwrap_err();
        assert_eq!(err.position, 2);
    }

    #[test]
    fn comparisons_do_not_chain() {
        assert!(ExprParser::parse("1 < 2 < 3").is_err());
    }

    #[test]
    fn unbalanced_parenthesis_fails() {
        let err = ExprParser::parse("(a == b").unwrap_err();
        assert!(err.message.contains("expected `)`"));
    }

    #[test]
    fn empty_expression_fails() {
        assert!(ExprParser::parse("   ").is_err());
    }

    #[test]
    fn method_arguments_are_plain_values() {
        assert!(ExprParser::parse("a.contains(1 + 2)").is_err());
    }

    #[test]
    fn dangling_dot_fails() {
        assert!(ExprParser::parse("file.").is_err());
    }
}
