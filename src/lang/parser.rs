//! Recursive descent over [`TokenSpan`]s.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparison, additive,
//! multiplicative, unary minus/`!`, call, primary.

use strum_macros::{Display, IntoStaticStr};

use super::token::{Delimiter, Keyword, Operator, Token, TokenSpan};
use super::{LangError, LangResult};
use crate::value::Value;

/// Parentheses, unary operators, call arguments and blocks.
const MAX_NESTING: usize = 64;
/// Height of one expression tree, operator chains included.
const MAX_EXPR_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "//")]
    FloorDivide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanEqual,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanEqual,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "not")]
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Tree height, walked without recursion.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((expr, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            match expr {
                Expr::Literal(_) | Expr::Name(_) => {}
                Expr::Unary { expr, .. } => pending.push((expr, depth + 1)),
                Expr::Binary { left, right, .. } => {
                    pending.push((left, depth + 1));
                    pending.push((right, depth + 1));
                }
                Expr::Call { args, .. } => {
                    pending.extend(args.iter().map(|arg| (arg, depth + 1)));
                }
            }
        }
        deepest
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `target = value`, or a compound assignment when `op` is set.
    Assign {
        target: String,
        op: Option<BinaryOp>,
        value: Expr,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

pub struct Parser {
    tokens: Vec<TokenSpan>,
    position: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<TokenSpan>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    pub fn parse_program(&mut self) -> LangResult<Program> {
        let statements = self.parse_statements(false)?;
        Ok(Program { statements })
    }

    pub fn parse_single_expression(&mut self) -> LangResult<Expr> {
        self.skip_newlines();
        let expr = self.parse_expression()?;
        self.skip_newlines();
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(self.error(format!("unexpected trailing {}", describe(token)))),
        }
    }

    // ---- statements ----

    fn parse_statements(&mut self, in_block: bool) -> LangResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None if in_block => return Err(self.error("expected `}`")),
                None => return Ok(statements),
                Some(Token::Delimiter(Delimiter::CloseBrace)) if in_block => {
                    self.advance();
                    return Ok(statements);
                }
                Some(_) => {
                    statements.push(self.parse_statement()?);
                    self.expect_statement_end()?;
                }
            }
        }
    }

    fn parse_statement(&mut self) -> LangResult<Stmt> {
        match self.peek() {
            Some(Token::Keyword(Keyword::If)) => {
                self.advance();
                self.parse_if()
            }
            Some(Token::Keyword(Keyword::While)) => {
                self.advance();
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;
                Ok(Stmt::While { condition, body })
            }
            Some(Token::Identifier(name)) => {
                let name = name.clone();
                let op = match self.peek_at(1) {
                    Some(Token::Operator(Operator::Assign)) => Some(None),
                    Some(Token::Operator(Operator::PlusAssign)) => Some(Some(BinaryOp::Add)),
                    Some(Token::Operator(Operator::MinusAssign)) => {
                        Some(Some(BinaryOp::Subtract))
                    }
                    Some(Token::Operator(Operator::MultiplyAssign)) => {
                        Some(Some(BinaryOp::Multiply))
                    }
                    Some(Token::Operator(Operator::DivideAssign)) => Some(Some(BinaryOp::Divide)),
                    _ => None,
                };
                match op {
                    Some(op) => {
                        self.advance();
                        self.advance();
                        let value = self.parse_expression()?;
                        Ok(Stmt::Assign {
                            target: name,
                            op,
                            value,
                        })
                    }
                    None => Ok(Stmt::Expr(self.parse_expression()?)),
                }
            }
            _ => Ok(Stmt::Expr(self.parse_expression()?)),
        }
    }

    fn parse_if(&mut self) -> LangResult<Stmt> {
        let mut branches = Vec::new();
        let condition = self.parse_expression()?;
        branches.push((condition, self.parse_block()?));

        let mut otherwise = None;
        loop {
            // `}` の後の改行を挟んだ elif/else も許す
            let checkpoint = self.position;
            self.skip_newlines();
            match self.peek() {
                Some(Token::Keyword(Keyword::Elif)) => {
                    self.advance();
                    let condition = self.parse_expression()?;
                    branches.push((condition, self.parse_block()?));
                }
                Some(Token::Keyword(Keyword::Else)) => {
                    self.advance();
                    if matches!(self.peek(), Some(Token::Keyword(Keyword::If))) {
                        self.advance();
                        let condition = self.parse_expression()?;
                        branches.push((condition, self.parse_block()?));
                    } else {
                        otherwise = Some(self.parse_block()?);
                        break;
                    }
                }
                _ => {
                    self.position = checkpoint;
                    break;
                }
            }
        }
        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }

    fn parse_block(&mut self) -> LangResult<Vec<Stmt>> {
        self.skip_newlines();
        self.expect_delimiter(Delimiter::OpenBrace)?;
        self.nested(|p| p.parse_statements(true))
    }

    fn expect_statement_end(&mut self) -> LangResult<()> {
        match self.peek() {
            None
            | Some(Token::Newline)
            | Some(Token::Delimiter(Delimiter::Semicolon))
            | Some(Token::Delimiter(Delimiter::CloseBrace)) => Ok(()),
            Some(token) => Err(self.error(format!("expected end of statement, found {}", describe(token)))),
        }
    }

    // ---- expressions ----

    fn parse_expression(&mut self) -> LangResult<Expr> {
        let expr = self.parse_or()?;
        if expr.depth() > MAX_EXPR_DEPTH {
            return Err(self.error(format!(
                "expression deeper than {} levels",
                MAX_EXPR_DEPTH
            )));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> LangResult<Expr> {
        let mut left = self.parse_and()?;
        while matches!(
            self.peek(),
            Some(Token::Keyword(Keyword::Or)) | Some(Token::Operator(Operator::Or))
        ) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> LangResult<Expr> {
        let mut left = self.parse_not()?;
        while matches!(
            self.peek(),
            Some(Token::Keyword(Keyword::And)) | Some(Token::Operator(Operator::And))
        ) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> LangResult<Expr> {
        if matches!(self.peek(), Some(Token::Keyword(Keyword::Not))) {
            self.advance();
            let expr = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> LangResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(Operator::EqualEqual)) => BinaryOp::Equal,
                Some(Token::Operator(Operator::NotEqual)) => BinaryOp::NotEqual,
                Some(Token::Operator(Operator::Less)) => BinaryOp::LessThan,
                Some(Token::Operator(Operator::LessEqual)) => BinaryOp::LessThanEqual,
                Some(Token::Operator(Operator::Greater)) => BinaryOp::GreaterThan,
                Some(Token::Operator(Operator::GreaterEqual)) => BinaryOp::GreaterThanEqual,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> LangResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(Operator::Plus)) => BinaryOp::Add,
                Some(Token::Operator(Operator::Minus)) => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> LangResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(Operator::Multiply)) => BinaryOp::Multiply,
                Some(Token::Operator(Operator::Divide)) => BinaryOp::Divide,
                Some(Token::Operator(Operator::FloorDivide)) => BinaryOp::FloorDivide,
                Some(Token::Operator(Operator::Modulo)) => BinaryOp::Modulo,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> LangResult<Expr> {
        let op = match self.peek() {
            Some(Token::Operator(Operator::Minus)) => UnaryOp::Negate,
            Some(Token::Operator(Operator::Not)) => UnaryOp::Not,
            Some(Token::Operator(Operator::Plus)) => {
                self.advance();
                return self.nested(Self::parse_unary);
            }
            _ => return self.parse_call(),
        };
        self.advance();
        let expr = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_call(&mut self) -> LangResult<Expr> {
        let primary = self.parse_primary()?;
        match primary {
            Expr::Name(function)
                if matches!(self.peek(), Some(Token::Delimiter(Delimiter::OpenParen))) =>
            {
                self.advance();
                let args = self.nested(Self::parse_arguments)?;
                Ok(Expr::Call { function, args })
            }
            other => Ok(other),
        }
    }

    fn parse_arguments(&mut self) -> LangResult<Vec<Expr>> {
        let mut args = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Some(Token::Delimiter(Delimiter::CloseParen))) {
                self.advance();
                return Ok(args);
            }
            args.push(self.parse_expression()?);
            self.skip_newlines();
            match self.peek() {
                Some(Token::Delimiter(Delimiter::Comma)) => {
                    self.advance();
                }
                Some(Token::Delimiter(Delimiter::CloseParen)) => {
                    self.advance();
                    return Ok(args);
                }
                _ => return Err(self.error("expected `,` or `)` in argument list")),
            }
        }
    }

    fn parse_primary(&mut self) -> LangResult<Expr> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.error("unexpected end of input")),
        };
        let expr = match token {
            Token::Integer(i) => Expr::Literal(Value::Integer(i)),
            Token::Float(f) => Expr::Literal(Value::Float(f)),
            Token::Str(s) => Expr::Literal(Value::String(s)),
            Token::Keyword(Keyword::True) => Expr::Literal(Value::Boolean(true)),
            Token::Keyword(Keyword::False) => Expr::Literal(Value::Boolean(false)),
            Token::Identifier(name) => Expr::Name(name),
            Token::Delimiter(Delimiter::OpenParen) => {
                self.advance();
                return self.nested(|p| {
                    p.skip_newlines();
                    let inner = p.parse_expression()?;
                    p.skip_newlines();
                    p.expect_delimiter(Delimiter::CloseParen)?;
                    Ok(inner)
                });
            }
            other => {
                return Err(self.error(format!("unexpected {}", describe(&other))));
            }
        };
        self.advance();
        Ok(expr)
    }

    // ---- helpers ----

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> LangResult<T>) -> LangResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {} levels", MAX_NESTING)));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset).map(|t| &t.token)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.peek(),
            Some(Token::Newline) | Some(Token::Delimiter(Delimiter::Semicolon))
        ) {
            self.advance();
        }
    }

    fn expect_delimiter(&mut self, expected: Delimiter) -> LangResult<()> {
        match self.peek() {
            Some(Token::Delimiter(d)) if *d == expected => {
                self.advance();
                Ok(())
            }
            Some(token) => {
                let found = describe(token);
                Err(self.error(format!("expected `{}`, found {}", expected, found)))
            }
            None => Err(self.error(format!("expected `{}`", expected))),
        }
    }

    fn current_line(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn error(&self, message: impl Into<String>) -> LangError {
        LangError::Parse {
            message: message.into(),
            line: self.current_line(),
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Integer(i) => format!("integer {}", i),
        Token::Float(f) => format!("float {}", f),
        Token::Str(s) => format!("string {:?}", s),
        Token::Identifier(name) => format!("`{}`", name),
        Token::Keyword(k) => format!("keyword `{}`", k),
        Token::Operator(op) => format!("`{}`", op),
        Token::Delimiter(d) => format!("`{}`", d),
        Token::Newline => "end of line".to_string(),
    }
}
