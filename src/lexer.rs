//! Lexer: source text → flat token vector.
//!
//! Words are separated by whitespace, so `a + b` is three tokens while `a+b`
//! is a single identifier. Newlines terminate statements and survive as
//! tokens; `:` acts as a newline inside a single source line.

use log::trace;
use logos::Logos;

use crate::token::{SpannedToken, Symbol, Token};

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
enum Piece {
    #[token("\n")]
    LineBreak,

    #[token(":")]
    Separator,

    #[regex(r"[^ \t\r\f\n:]+", allow_greedy = true)]
    Word,
}

/// Lex `source` into tokens. Always ends with exactly one `Eof`.
///
/// Never fails: anything that is not a number or a known symbol becomes an
/// identifier and is left for the parser or evaluator to reject.
pub fn tokenize(source: &str) -> Vec<SpannedToken> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut lexer = Piece::lexer(source);

    while let Some(piece) = lexer.next() {
        let token = match piece {
            Ok(Piece::LineBreak) => {
                tokens.push(SpannedToken { token: Token::Newline, line });
                line += 1;
                continue;
            }
            Ok(Piece::Separator) => Token::Newline,
            Ok(Piece::Word) | Err(()) => classify(lexer.slice()),
        };
        tokens.push(SpannedToken { token, line });
    }

    tokens.push(SpannedToken { token: Token::Eof, line });
    trace!("lexed {} tokens over {} lines", tokens.len(), line);
    tokens
}

/// Integer first, then float, then the symbol table, then identifier.
fn classify(word: &str) -> Token {
    if word.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(value) = word.parse::<i64>() {
            return Token::Int(value);
        }
    }
    // `inf` and `nan` parse as floats but are ordinary names here.
    if word.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(value) = word.parse::<f64>() {
            return Token::Float(value);
        }
    }
    match Symbol::lookup(word) {
        Some(symbol) => Token::Symbol(symbol),
        None => Token::Ident(word.to_string()),
    }
}
