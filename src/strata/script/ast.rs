//! Syntax tree for the embedded language

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    If(Expr),
    ElseIf(Expr),
    Else,
    End,
    /// One loop variable, or two for index/key and value
    For {
        vars: Vec<String>,
        iterable: Expr,
    },
    Assign {
        name: String,
        value: Expr,
    },
    Include {
        name: Expr,
        locals: Vec<(String, Expr)>,
    },
    Expr(Expr),
    Empty,
}
