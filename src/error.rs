//! Error types for every stage of the pipeline.
//!
//! Each stage owns one snafu enum; `Error` wraps them so pipeline helpers can
//! use `?` across stage boundaries. Nothing here terminates the process.

use snafu::Snafu;

use crate::token::Token;

pub type ParseResult<T> = Result<T, ParseError>;
pub type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParseError {
    #[snafu(display("line {line}: expected {expected}, found {found}"))]
    Expected {
        line: usize,
        expected: String,
        found: Token,
    },

    #[snafu(display("line {line}: unexpected {found} after the end of the program"))]
    Trailing { line: usize, found: Token },
}

impl ParseError {
    /// True when the parser ran out of tokens; more input could fix it.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Expected { found: Token::Eof, .. })
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RuntimeError {
    #[snafu(display("no value found for '{name}'"))]
    UndefinedName { name: String },

    #[snafu(display("too many arguments given for {function}: expected {expected}, got {got}"))]
    TooManyArguments {
        function: String,
        expected: usize,
        got: usize,
    },

    #[snafu(display("too few arguments given for {function}: expected {expected}, got {got}"))]
    TooFewArguments {
        function: String,
        expected: usize,
        got: usize,
    },

    #[snafu(display("cannot apply '{op}' to {left} and {right}"))]
    UnsupportedOperation {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[snafu(display("cannot call a {found}"))]
    NotCallable { found: &'static str },

    #[snafu(display("division by zero"))]
    DivisionByZero,

    #[snafu(display("integer overflow in '{op}'"))]
    Overflow { op: &'static str },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CodegenError {
    #[snafu(display("code generation does not support {construct}"))]
    Unsupported { construct: &'static str },

    #[snafu(display("{construct} produces no value to compute with"))]
    NoValue { construct: &'static str },

    #[snafu(display("no register holds '{name}'"))]
    UnboundName { name: String },

    #[snafu(display("{function} takes {expected} argument(s), the call passes {got}"))]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[snafu(display("out of registers: {needed} needed, the pool of R0-R7 is exhausted"))]
    OutOfRegisters { needed: usize },

    #[snafu(display("division by a constant zero"))]
    ZeroDivisor,

    #[snafu(display("integer literal {value} does not fit a 32-bit register"))]
    ImmediateRange { value: i64 },

    #[snafu(display("no named function definition to compile"))]
    NoEntryFunction,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(context(false), display("syntax error: {source}"))]
    Parse { source: ParseError },

    #[snafu(context(false), display("runtime error: {source}"))]
    Runtime { source: RuntimeError },

    #[snafu(context(false), display("compile error: {source}"))]
    Codegen { source: CodegenError },
}
