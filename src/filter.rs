//! Recursive-descent parser and evaluator for the `--filter` expression
//! language: `field op literal` combined with `&&`, `||`, `!`, and
//! parentheses, evaluated against an output field set.

use anyhow::{bail, Result};
use zscan_core::fieldset::{FieldSet, FieldValue};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(i64),
    Str(String),
    Bool(bool),
    Op(&'static str),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("<="));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op("<"));
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(">="));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(">"));
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    bail!("unterminated string literal");
                }
                i += 1;
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(text.parse()?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word),
                });
            }
            other => bail!("unexpected character '{other}' in filter expression"),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Literal {
    Number(i64),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare { field: String, op: &'static str, literal: Literal },
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => bail!("expected closing parenthesis"),
                }
            }
            Some(Token::Ident(name)) => {
                let field = name.clone();
                let op = match self.advance() {
                    Some(Token::Op(o)) => *o,
                    _ => bail!("expected comparison operator after field '{field}'"),
                };
                let literal = match self.advance() {
                    Some(Token::Number(n)) => Literal::Number(*n),
                    Some(Token::Str(s)) => Literal::Str(s.clone()),
                    Some(Token::Bool(b)) => Literal::Bool(*b),
                    _ => bail!("expected literal after operator for field '{field}'"),
                };
                Ok(Expr::Compare { field, op, literal })
            }
            other => bail!("unexpected token in filter expression: {other:?}"),
        }
    }
}

fn eval(expr: &Expr, fields: &FieldSet) -> bool {
    match expr {
        Expr::And(a, b) => eval(a, fields) && eval(b, fields),
        Expr::Or(a, b) => eval(a, fields) || eval(b, fields),
        Expr::Not(a) => !eval(a, fields),
        Expr::Compare { field, op, literal } => {
            let Some(value) = fields.get(field) else { return false };
            compare(value, *op, literal)
        }
    }
}

fn compare(value: &FieldValue, op: &str, literal: &Literal) -> bool {
    match (value, literal) {
        (FieldValue::Bool(v), Literal::Bool(l)) => match op {
            "==" => v == l,
            "!=" => v != l,
            _ => false,
        },
        (FieldValue::Str(v), Literal::Str(l)) => match op {
            "==" => v == l,
            "!=" => v != l,
            _ => false,
        },
        (v, Literal::Number(l)) => {
            let Some(n) = v.as_i64() else { return false };
            match op {
                "==" => n == *l,
                "!=" => n != *l,
                "<" => n < *l,
                "<=" => n <= *l,
                ">" => n > *l,
                ">=" => n >= *l,
                _ => false,
            }
        }
        _ => false,
    }
}

/// Parses `input` into a reusable predicate closure over a `FieldSet`.
pub fn compile(input: &str) -> Result<zscan_core::config::Filter> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != tokens.len() {
        bail!("trailing tokens after filter expression");
    }
    Ok(std::sync::Arc::new(move |fields: &FieldSet| eval(&expr, fields)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields_with(success: bool, ttl: i64) -> FieldSet {
        let mut fs = FieldSet::new();
        fs.push("success", FieldValue::Bool(success));
        fs.push("ttl", FieldValue::I64(ttl));
        fs
    }

    #[test]
    fn simple_bool_comparison() {
        let f = compile("success == true").unwrap();
        assert!(f(&fields_with(true, 64)));
        assert!(!f(&fields_with(false, 64)));
    }

    #[test]
    fn conjunction_and_numeric_range() {
        let f = compile("success == true && ttl > 32").unwrap();
        assert!(f(&fields_with(true, 64)));
        assert!(!f(&fields_with(true, 10)));
    }

    #[test]
    fn negation_and_parens() {
        let f = compile("!(success == false) && ttl >= 64").unwrap();
        assert!(f(&fields_with(true, 64)));
        assert!(!f(&fields_with(true, 10)));
    }

    #[test]
    fn missing_field_is_falsy() {
        let f = compile("nonexistent == true").unwrap();
        assert!(!f(&fields_with(true, 64)));
    }
}
