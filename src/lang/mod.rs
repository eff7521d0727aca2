//! # Embedded Expression Language
//!
//! A small, purpose-built language used for handler conditions and for the
//! optional script attached to a handler. It replaces evaluating operator
//! code in a general-purpose interpreter with something that can be bounded.
//!
//! ```text
//! Source → Tokenizer → Parser → Interpreter
//! ```
//!
//! * [`token`]: nom based lexical analysis into [`token::TokenSpan`]s
//! * [`parser`]: recursive descent into [`parser::Program`] / [`parser::Expr`]
//! * [`interpreter`]: evaluation under a step and wall-clock [`Limits`]
//! * [`builtins`]: the allow-listed function table (random, date/time,
//!   formatting, math)
//!
//! Conditions are parsed as a single expression and evaluated with no
//! bindings and no functions. Scripts are statement sequences:
//!
//! ```text
//! luck = randint(1, 100)
//! if luck > 90 { jackpots += 1 } else { _miss = true }
//! ```

use std::time::Duration;

use strum_macros::IntoStaticStr;
use thiserror::Error;

pub mod builtins;
pub mod interpreter;
pub mod parser;
pub mod token;

pub use interpreter::{Interpreter, Limits};
pub use parser::{BinaryOp, Expr, Program, Stmt, UnaryOp};

#[derive(Error, Debug, Clone, PartialEq, IntoStaticStr)]
pub enum LangError {
    #[error("Tokenize error at line {line}, column {column}: {message}")]
    Tokenize {
        message: String,
        line: usize,
        column: usize,
    },
    #[error("Parse error at line {line}: {message}")]
    Parse { message: String, line: usize },
    #[error("Unknown name `{0}`")]
    UnknownName(String),
    #[error("Unknown function `{0}`")]
    UnknownFunction(String),
    #[error("Type error: {0}")]
    Type(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow")]
    Overflow,
    #[error("Invalid argument to `{function}`: {message}")]
    Argument { function: String, message: String },
    #[error("Step limit of {0} exceeded")]
    StepLimit(usize),
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),
    #[error("String exceeds {0} bytes")]
    StringTooLong(usize),
}

impl LangError {
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    pub(crate) fn argument(function: &str, message: impl Into<String>) -> Self {
        LangError::Argument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

pub type LangResult<T> = Result<T, LangError>;

/// Tokenizes and parses a script body.
pub fn parse_program(source: &str) -> LangResult<Program> {
    let tokens = token::Tokenizer::new().tokenize(source)?;
    parser::Parser::new(tokens).parse_program()
}

/// Tokenizes and parses a single expression; trailing input is an error.
pub fn parse_expression(source: &str) -> LangResult<Expr> {
    let tokens = token::Tokenizer::new().tokenize(source)?;
    parser::Parser::new(tokens).parse_single_expression()
}
