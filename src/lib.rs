//! aap: lexer, parser, tree-walking interpreter and a Cortex-M0 Thumb code
//! generator for a small teaching language.
//!
//! ```text
//! source ──tokenize──▶ tokens ──parse──▶ AST ─┬─evaluate──▶ Value
//!                                             └─generate──▶ assembly
//! ```

pub mod ast;
pub mod codegen;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod number;
pub mod parser;
pub mod token;
pub mod value;

use log::info;
use snafu::OptionExt;

pub use ast::{BinOp, FunctionDef, Literal, Node};
pub use codegen::generate;
pub use environment::{EnvRef, Environment};
pub use error::{CodegenError, CodegenResult, Error, ParseError, ParseResult, RuntimeError};
pub use interpreter::{displayable, evaluate, Interpreter};
pub use lexer::tokenize;
pub use number::Number;
pub use parser::parse;
pub use token::{SpannedToken, Symbol, Token};
pub use value::{EvalResult, Value};

/// Interpret `source` in a fresh root scope.
pub fn run_source(source: &str) -> Result<Value, Error> {
    Interpreter::new().run_source(source)
}

/// The first named function among a program's top-level statements.
pub fn entry_function(program: &Node) -> CodegenResult<&FunctionDef> {
    let statements = match program {
        Node::Block(statements) => statements.as_slice(),
        other => std::slice::from_ref(other),
    };
    statements
        .iter()
        .find_map(|statement| match statement {
            Node::FunctionDef(def) if def.name.is_some() => Some(def.as_ref()),
            _ => None,
        })
        .context(error::NoEntryFunctionSnafu)
}

/// Compile the first named function of `source` to assembly text.
pub fn compile_source(source: &str) -> Result<String, Error> {
    let tokens = tokenize(source);
    let program = parse(&tokens)?;
    let entry = entry_function(&program)?;
    let assembly = generate(entry)?;
    info!(
        "generated {} lines for {}",
        assembly.lines().count(),
        entry.name.as_deref().unwrap_or_default()
    );
    Ok(assembly)
}
