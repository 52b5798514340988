//! Parser: token vector → AST.
//!
//! Every production takes the index of its first token and returns the node
//! together with the index just past it. `Ok(None)` means "nothing here" and
//! leaves the caller's index untouched; `Err` is a hard syntax error.
//! Precedence, loosest first: and/or, comparison, + -, * /, factor.

use log::trace;

use crate::ast::{BinOp, FunctionDef, Literal, Node};
use crate::error::{ExpectedSnafu, ParseResult, TrailingSnafu};
use crate::token::{SpannedToken, Symbol, Token};

type Parsed = Option<(Node, usize)>;
type Production<'t> = fn(&Parser<'t>, usize) -> ParseResult<Parsed>;

static EOF: Token = Token::Eof;

const LOGICAL: &[Symbol] = &[Symbol::And, Symbol::Or];
const COMPARISON: &[Symbol] = &[
    Symbol::EqEq,
    Symbol::NotEq,
    Symbol::Gt,
    Symbol::GtEq,
    Symbol::Lt,
    Symbol::LtEq,
];
const ADDITIVE: &[Symbol] = &[Symbol::Plus, Symbol::Minus];
const MULTIPLICATIVE: &[Symbol] = &[Symbol::Star, Symbol::Slash];

/// Parse a whole program into a `Node::Block`.
///
/// # Stack use
///
/// Productions recurse once per nesting level, so pathologically deep
/// nesting overflows the host stack.
pub fn parse(tokens: &[SpannedToken]) -> ParseResult<Node> {
    Parser::new(tokens).parse_program()
}

pub struct Parser<'t> {
    tokens: &'t [SpannedToken],
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [SpannedToken]) -> Self {
        Self { tokens }
    }

    pub fn parse_program(&self) -> ParseResult<Node> {
        let (program, index) = self.statements(0)?;
        let (index, _) = self.skip_newlines(index);
        if !self.token(index).is_eof() {
            return TrailingSnafu {
                line: self.line(index),
                found: self.token(index).clone(),
            }
            .fail();
        }
        if let Node::Block(statements) = &program {
            trace!("parsed {} top-level statements", statements.len());
        }
        Ok(program)
    }

    // ===== Cursor helpers =====

    fn token(&self, index: usize) -> &Token {
        self.tokens.get(index).map_or(&EOF, |t| &t.token)
    }

    fn line(&self, index: usize) -> usize {
        self.tokens
            .get(index)
            .or(self.tokens.last())
            .map_or(1, |t| t.line)
    }

    /// Next index, clamped at the final token.
    fn advance(&self, index: usize) -> usize {
        if index + 1 < self.tokens.len() {
            index + 1
        } else {
            index
        }
    }

    fn at(&self, index: usize, symbol: Symbol) -> bool {
        self.token(index).is_symbol(symbol)
    }

    fn expected<T>(&self, index: usize, what: impl Into<String>) -> ParseResult<T> {
        ExpectedSnafu {
            line: self.line(index),
            expected: what,
            found: self.token(index).clone(),
        }
        .fail()
    }

    /// Consume `symbol` or fail naming it.
    fn expect(&self, index: usize, symbol: Symbol) -> ParseResult<usize> {
        if self.at(index, symbol) {
            Ok(self.advance(index))
        } else {
            self.expected(index, format!("'{}'", symbol.spelling()))
        }
    }

    /// Skip newline tokens, reporting how many were skipped.
    fn skip_newlines(&self, mut index: usize) -> (usize, usize) {
        let mut count = 0;
        while self.token(index).is_newline() {
            let next = self.advance(index);
            if next == index {
                break;
            }
            index = next;
            count += 1;
        }
        (index, count)
    }

    /// Run an optional production; on "nothing here" the index is reverted.
    fn attempt(&self, index: usize, production: Production<'t>) -> ParseResult<(Option<Node>, usize)> {
        Ok(match production(self, index)? {
            Some((node, next)) => (Some(node), next),
            None => (None, index),
        })
    }

    /// Run a production that must produce a node.
    fn required(
        &self,
        index: usize,
        production: Production<'t>,
        what: &str,
    ) -> ParseResult<(Node, usize)> {
        match production(self, index)? {
            Some(parsed) => Ok(parsed),
            None => self.expected(index, what),
        }
    }

    // ===== Statements =====

    /// Blank lines, one mandatory statement, then more statements for as long
    /// as at least one newline precedes a successful attempt.
    fn statements(&self, index: usize) -> ParseResult<(Node, usize)> {
        let (index, _) = self.skip_newlines(index);
        let (first, mut index) = self.required(index, Self::statement, "a statement")?;
        let mut body = vec![first];

        loop {
            let (after, newlines) = self.skip_newlines(index);
            if newlines == 0 {
                break;
            }
            index = after;
            match self.attempt(index, Self::statement)? {
                (Some(statement), next) => {
                    body.push(statement);
                    index = next;
                }
                (None, _) => break,
            }
        }

        Ok((Node::Block(body), index))
    }

    fn statement(&self, index: usize) -> ParseResult<Parsed> {
        if self.at(index, Symbol::Return) {
            return self.return_tail(self.advance(index)).map(Some);
        }
        self.expression(index)
    }

    fn return_tail(&self, index: usize) -> ParseResult<(Node, usize)> {
        let (value, index) = self.attempt(index, Self::expression)?;
        Ok((Node::Return(value.map(Box::new)), index))
    }

    /// Either a single statement on the same line, or a newline, statements
    /// and `end`.
    fn suite(&self, index: usize) -> ParseResult<(Node, usize)> {
        if self.token(index).is_newline() {
            let (body, index) = self.statements(self.advance(index))?;
            let index = self.expect(index, Symbol::End)?;
            return Ok((body, index));
        }
        self.required(index, Self::statement, "a statement")
    }

    // ===== Expressions =====

    fn expression(&self, index: usize) -> ParseResult<Parsed> {
        if self.at(index, Symbol::Let) {
            let index = self.advance(index);
            let Token::Ident(name) = self.token(index) else {
                return self.expected(index, "an identifier");
            };
            let index = self.expect(self.advance(index), Symbol::Assign)?;
            let (value, index) = self.required(index, Self::expression, "an expression")?;
            let node = Node::VarAssign {
                name: name.clone(),
                value: Box::new(value),
            };
            return Ok(Some((node, index)));
        }
        self.binary(index, Self::comparison, LOGICAL)
    }

    fn comparison(&self, index: usize) -> ParseResult<Parsed> {
        self.binary(index, Self::arithmetic, COMPARISON)
    }

    fn arithmetic(&self, index: usize) -> ParseResult<Parsed> {
        self.binary(index, Self::term, ADDITIVE)
    }

    fn term(&self, index: usize) -> ParseResult<Parsed> {
        self.binary(index, Self::factor, MULTIPLICATIVE)
    }

    /// Left-associative chain of `operand (op operand)*`.
    fn binary(&self, index: usize, operand: Production<'t>, ops: &[Symbol]) -> ParseResult<Parsed> {
        let Some((mut left, mut index)) = operand(self, index)? else {
            return Ok(None);
        };

        loop {
            let Token::Symbol(symbol) = self.token(index) else {
                break;
            };
            if !ops.contains(symbol) {
                break;
            }
            let Some(op) = BinOp::from_symbol(*symbol) else {
                break;
            };
            let what = format!("an operand after '{}'", op.spelling());
            let (right, next) = self.required(self.advance(index), operand, &what)?;
            left = Node::binary(left, op, right);
            index = next;
        }

        Ok(Some((left, index)))
    }

    fn factor(&self, index: usize) -> ParseResult<Parsed> {
        let next = self.advance(index);
        let parsed = match self.token(index) {
            Token::Int(i) => (Node::Number(Literal::Int(*i)), next),
            Token::Float(x) => (Node::Number(Literal::Float(*x)), next),
            Token::Ident(name) => (Node::VarAccess(name.clone()), next),
            Token::Symbol(Symbol::LParen) => {
                let (inner, after) = self.required(next, Self::expression, "an expression")?;
                (inner, self.expect(after, Symbol::RParen)?)
            }
            Token::Symbol(Symbol::If) => self.if_expr(next)?,
            Token::Symbol(Symbol::While) => self.while_loop(next)?,
            Token::Symbol(Symbol::Fn) => self.function_def(next)?,
            Token::Symbol(Symbol::Run) => self.call(next)?,
            Token::Symbol(Symbol::Return) => self.return_tail(next)?,
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    /// Both surface forms end up as one `Node::If`:
    /// `if c then x [elif c then y] [else z]` and the block form closed by `end`.
    fn if_expr(&self, mut index: usize) -> ParseResult<(Node, usize)> {
        let mut cases = Vec::new();

        loop {
            let (condition, after) = self.required(index, Self::expression, "a condition")?;
            let after = self.expect(after, Symbol::Then)?;
            let block_form = self.token(after).is_newline();
            let (body, after) = if block_form {
                self.statements(self.advance(after))?
            } else {
                self.required(after, Self::statement, "a statement")?
            };
            cases.push((condition, body));
            index = after;

            if block_form && self.at(index, Symbol::End) {
                let node = Node::If {
                    cases,
                    else_body: None,
                };
                return Ok((node, self.advance(index)));
            }
            if self.at(index, Symbol::Elif) {
                index = self.advance(index);
                continue;
            }
            if self.at(index, Symbol::Else) {
                let (else_body, index) = self.suite(self.advance(index))?;
                let node = Node::If {
                    cases,
                    else_body: Some(Box::new(else_body)),
                };
                return Ok((node, index));
            }
            if block_form {
                return self.expected(index, "'end'");
            }
            let node = Node::If {
                cases,
                else_body: None,
            };
            return Ok((node, index));
        }
    }

    fn while_loop(&self, index: usize) -> ParseResult<(Node, usize)> {
        let (condition, index) = self.required(index, Self::expression, "a condition")?;
        let index = self.expect(index, Symbol::Then)?;
        let (body, index) = self.suite(index)?;
        let node = Node::While {
            condition: Box::new(condition),
            body: Box::new(body),
        };
        Ok((node, index))
    }

    /// `fn [name] ( params ) -> expr` or `fn [name] ( params ) NEWLINE statements end`.
    fn function_def(&self, index: usize) -> ParseResult<(Node, usize)> {
        let (name, index) = match self.token(index) {
            Token::Ident(name) => (Some(name.clone()), self.advance(index)),
            _ => (None, index),
        };
        if !self.at(index, Symbol::LParen) {
            let what = if name.is_some() { "'('" } else { "an identifier or '('" };
            return self.expected(index, what);
        }

        let mut index = self.advance(index);
        let mut params = Vec::new();
        if let Token::Ident(param) = self.token(index) {
            params.push(param.clone());
            index = self.advance(index);
            while self.at(index, Symbol::Comma) {
                index = self.advance(index);
                let Token::Ident(param) = self.token(index) else {
                    return self.expected(index, "a parameter name");
                };
                params.push(param.clone());
                index = self.advance(index);
            }
        }
        let index = self.expect(index, Symbol::RParen)?;

        let (body, index) = if self.at(index, Symbol::Arrow) {
            self.required(self.advance(index), Self::expression, "an expression")?
        } else if self.token(index).is_newline() {
            let (body, index) = self.statements(self.advance(index))?;
            (body, self.expect(index, Symbol::End)?)
        } else {
            return self.expected(index, "'->' or a newline");
        };

        let def = FunctionDef { name, params, body };
        Ok((Node::FunctionDef(Box::new(def)), index))
    }

    /// `run callee ( args )`
    fn call(&self, index: usize) -> ParseResult<(Node, usize)> {
        let (callee, index) = self.required(index, Self::factor, "a function to run")?;
        let mut index = self.expect(index, Symbol::LParen)?;
        let mut args = Vec::new();

        if self.at(index, Symbol::RParen) {
            index = self.advance(index);
        } else {
            loop {
                let (arg, after) = self.required(index, Self::expression, "an argument")?;
                args.push(arg);
                if self.at(after, Symbol::Comma) {
                    index = self.advance(after);
                    continue;
                }
                index = self.expect(after, Symbol::RParen)?;
                break;
            }
        }

        let node = Node::Call {
            callee: Box::new(callee),
            args,
        };
        Ok((node, index))
    }
}
