//! Recursive descent parser for script code
//!
//!     Precedence, loosest first:
//!
//!         or  →  and  →  not  →  comparison  →  additive  →  multiplicative  →  unary
//!             →  postfix (member access, indexing)  →  primary
//!
//!     Comparisons do not chain: `a < b < c` is a syntax error.

use std::ops::Range;

use serde_json::{Number, Value};

use super::ast::{BinaryOp, Expr, Statement, UnaryOp};
use super::lexer::{lex, ScriptToken};
use super::ScriptError;

type ParseResult<T> = Result<T, ScriptError>;

struct Parser {
    tokens: Vec<(ScriptToken, Range<usize>)>,
    pos: usize,
}

fn describe(token: Option<&ScriptToken>) -> String {
    match token {
        None => "end of input".to_string(),
        Some(ScriptToken::Ident(name)) => format!("'{}'", name),
        Some(ScriptToken::Str(text)) => format!("string {:?}", text),
        Some(ScriptToken::Int(n)) => n.to_string(),
        Some(ScriptToken::Float(n)) => n.to_string(),
        Some(other) => format!("{:?}", other),
    }
}

impl Parser {
    fn new(code: &str) -> ParseResult<Self> {
        Ok(Parser {
            tokens: lex(code)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&ScriptToken> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&ScriptToken> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<ScriptToken> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &ScriptToken) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected<T>(&self, wanted: &str) -> ParseResult<T> {
        Err(ScriptError::Parse(format!(
            "expected {}, found {}",
            wanted,
            describe(self.peek())
        )))
    }

    fn expect(&mut self, expected: ScriptToken, wanted: &str) -> ParseResult<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            self.unexpected(wanted)
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(ScriptToken::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => self.unexpected("a name"),
        }
    }

    /// Map keys and include locals accept bare names and strings.
    fn key(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(ScriptToken::Ident(name)) | Some(ScriptToken::Str(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => self.unexpected("a key"),
        }
    }

    fn finish(&self) -> ParseResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => self.unexpected("end of input"),
        }
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.or()
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut left = self.and()?;
        while self.eat(&ScriptToken::Or) {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut left = self.not()?;
        while self.eat(&ScriptToken::And) {
            let right = self.not()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> ParseResult<Expr> {
        if self.eat(&ScriptToken::Not) {
            let operand = self.not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(ScriptToken::EqEq) => BinaryOp::Eq,
            Some(ScriptToken::NotEq) => BinaryOp::Ne,
            Some(ScriptToken::Lt) => BinaryOp::Lt,
            Some(ScriptToken::LtEq) => BinaryOp::Le,
            Some(ScriptToken::Gt) => BinaryOp::Gt,
            Some(ScriptToken::GtEq) => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        if matches!(
            self.peek(),
            Some(
                ScriptToken::EqEq
                    | ScriptToken::NotEq
                    | ScriptToken::Lt
                    | ScriptToken::LtEq
                    | ScriptToken::Gt
                    | ScriptToken::GtEq
            )
        ) {
            return Err(ScriptError::Parse(
                "comparisons cannot be chained".to_string(),
            ));
        }
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(ScriptToken::Plus) => BinaryOp::Add,
                Some(ScriptToken::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(ScriptToken::Star) => BinaryOp::Mul,
                Some(ScriptToken::Slash) => BinaryOp::Div,
                Some(ScriptToken::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.eat(&ScriptToken::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&ScriptToken::Dot) {
                let member = self.expect_ident()?;
                expr = Expr::Member(Box::new(expr), member);
            } else if self.eat(&ScriptToken::LBracket) {
                let index = self.expression()?;
                self.expect(ScriptToken::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = match self.advance() {
            Some(token) => token,
            None => return Err(ScriptError::Parse("expected an expression".to_string())),
        };
        match token {
            ScriptToken::Nil => Ok(Expr::Literal(Value::Null)),
            ScriptToken::True => Ok(Expr::Literal(Value::Bool(true))),
            ScriptToken::False => Ok(Expr::Literal(Value::Bool(false))),
            ScriptToken::Int(n) => Ok(Expr::Literal(Value::from(n))),
            ScriptToken::Float(n) => Number::from_f64(n)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| ScriptError::Parse(format!("invalid number {}", n))),
            ScriptToken::Str(text) => Ok(Expr::Literal(Value::String(text))),
            ScriptToken::Ident(name) => {
                if !self.eat(&ScriptToken::LParen) {
                    return Ok(Expr::Variable(name));
                }
                let args = self.list(ScriptToken::RParen, "')'")?;
                Ok(Expr::Call(name, args))
            }
            ScriptToken::LParen => {
                let inner = self.expression()?;
                self.expect(ScriptToken::RParen, "')'")?;
                Ok(inner)
            }
            ScriptToken::LBracket => Ok(Expr::List(self.list(ScriptToken::RBracket, "']'")?)),
            ScriptToken::LBrace => {
                let mut entries = Vec::new();
                while !self.eat(&ScriptToken::RBrace) {
                    let key = self.key()?;
                    self.expect(ScriptToken::Colon, "':'")?;
                    entries.push((key, self.expression()?));
                    if !self.eat(&ScriptToken::Comma) {
                        self.expect(ScriptToken::RBrace, "'}'")?;
                        break;
                    }
                }
                Ok(Expr::Map(entries))
            }
            other => {
                self.pos -= 1;
                Err(ScriptError::Parse(format!(
                    "expected an expression, found {}",
                    describe(Some(&other))
                )))
            }
        }
    }

    /// Comma separated expressions up to `close`, trailing comma allowed.
    fn list(&mut self, close: ScriptToken, wanted: &str) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.eat(&close) {
            items.push(self.expression()?);
            if !self.eat(&ScriptToken::Comma) {
                self.expect(close.clone(), wanted)?;
                break;
            }
        }
        Ok(items)
    }

    fn statement(&mut self) -> ParseResult<Statement> {
        let statement = match self.peek().cloned() {
            None => Statement::Empty,
            Some(ScriptToken::If) => {
                self.pos += 1;
                Statement::If(self.expression()?)
            }
            Some(ScriptToken::Elsif) => {
                self.pos += 1;
                Statement::ElseIf(self.expression()?)
            }
            Some(ScriptToken::Else) => {
                self.pos += 1;
                // `else if` reads the same as `elsif`
                if self.eat(&ScriptToken::If) {
                    Statement::ElseIf(self.expression()?)
                } else {
                    Statement::Else
                }
            }
            Some(ScriptToken::End) => {
                self.pos += 1;
                Statement::End
            }
            Some(ScriptToken::For) => {
                self.pos += 1;
                let mut vars = vec![self.expect_ident()?];
                if self.eat(&ScriptToken::Comma) {
                    vars.push(self.expect_ident()?);
                }
                self.expect(ScriptToken::In, "'in'")?;
                Statement::For {
                    vars,
                    iterable: self.expression()?,
                }
            }
            Some(ScriptToken::Include) => {
                self.pos += 1;
                let name = self.expression()?;
                let mut locals = Vec::new();
                while self.eat(&ScriptToken::Comma) {
                    let key = self.key()?;
                    self.expect(ScriptToken::Colon, "':'")?;
                    locals.push((key, self.expression()?));
                }
                Statement::Include { name, locals }
            }
            Some(ScriptToken::Ident(name)) if self.peek_at(1) == Some(&ScriptToken::Assign) => {
                self.pos += 2;
                Statement::Assign {
                    name,
                    value: self.expression()?,
                }
            }
            Some(_) => Statement::Expr(self.expression()?),
        };
        self.finish()?;
        Ok(statement)
    }
}

/// Parse the body of an expression tag.
pub fn parse_expression(code: &str) -> Result<Expr, ScriptError> {
    let mut parser = Parser::new(code)?;
    if parser.peek().is_none() {
        return Ok(Expr::Literal(Value::Null));
    }
    let expr = parser.expression()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse the body of a statement tag.
pub fn parse_statement(code: &str) -> Result<Statement, ScriptError> {
    Parser::new(code)?.statement()
}
