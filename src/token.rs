//! Token model: lexical categories and the symbol table.

use std::fmt;

/// Every fixed spelling the language knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol {
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    And,
    Or,

    // Keywords
    Let,
    Fn,
    If,
    Elif,
    Else,
    Then,
    While,
    Run,
    Return,
    End,

    // Punctuation
    LParen,
    RParen,
    Comma,
    Assign,
    Arrow,
}

impl Symbol {
    pub const ALL: [Symbol; 27] = [
        Symbol::Plus,
        Symbol::Minus,
        Symbol::Star,
        Symbol::Slash,
        Symbol::EqEq,
        Symbol::NotEq,
        Symbol::Gt,
        Symbol::GtEq,
        Symbol::Lt,
        Symbol::LtEq,
        Symbol::And,
        Symbol::Or,
        Symbol::Let,
        Symbol::Fn,
        Symbol::If,
        Symbol::Elif,
        Symbol::Else,
        Symbol::Then,
        Symbol::While,
        Symbol::Run,
        Symbol::Return,
        Symbol::End,
        Symbol::LParen,
        Symbol::RParen,
        Symbol::Comma,
        Symbol::Assign,
        Symbol::Arrow,
    ];

    /// Source spelling, also used in diagnostics.
    pub fn spelling(self) -> &'static str {
        match self {
            Symbol::Plus => "+",
            Symbol::Minus => "-",
            Symbol::Star => "*",
            Symbol::Slash => "/",
            Symbol::EqEq => "==",
            Symbol::NotEq => "!=",
            Symbol::Gt => ">",
            Symbol::GtEq => ">=",
            Symbol::Lt => "<",
            Symbol::LtEq => "<=",
            Symbol::And => "and",
            Symbol::Or => "or",
            Symbol::Let => "let",
            Symbol::Fn => "fn",
            Symbol::If => "if",
            Symbol::Elif => "elif",
            Symbol::Else => "else",
            Symbol::Then => "then",
            Symbol::While => "while",
            Symbol::Run => "run",
            Symbol::Return => "return",
            Symbol::End => "end",
            Symbol::LParen => "(",
            Symbol::RParen => ")",
            Symbol::Comma => ",",
            Symbol::Assign => "=",
            Symbol::Arrow => "->",
        }
    }

    /// Exact-match lookup in the symbol table.
    pub fn lookup(word: &str) -> Option<Symbol> {
        Symbol::ALL.into_iter().find(|s| s.spelling() == word)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Ident(String),
    Symbol(Symbol),
    Newline,
    Eof,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self, Token::Eof)
    }

    pub fn is_newline(&self) -> bool {
        matches!(self, Token::Newline)
    }

    pub fn is_symbol(&self, symbol: Symbol) -> bool {
        matches!(self, Token::Symbol(s) if *s == symbol)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(i) => write!(f, "{}", i),
            Token::Float(x) => write!(f, "{:?}", x),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Symbol(s) => write!(f, "'{}'", s.spelling()),
            Token::Newline => write!(f, "newline"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    /// 1-based source line.
    pub line: usize,
}
