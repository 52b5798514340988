//! AST-walking interpreter.

use std::rc::Rc;

use log::{debug, trace};
use snafu::{ensure, OptionExt};

use crate::ast::{FunctionDef, Literal, Node};
use crate::environment::{EnvRef, Environment};
use crate::error::{
    Error, NotCallableSnafu, TooFewArgumentsSnafu, TooManyArgumentsSnafu, UndefinedNameSnafu,
    UnsupportedOperationSnafu,
};
use crate::number::Number;
use crate::value::{EvalResult, Function, Value};

/// A root scope that survives between runs, so REPL lines can build on
/// each other.
#[derive(Clone)]
pub struct Interpreter {
    pub env: EnvRef<Value>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            env: Environment::root(),
        }
    }

    pub fn run(&mut self, program: &Node) -> EvalResult {
        evaluate(program, &self.env)
    }

    /// Lex, parse and evaluate `source` in this session's root scope.
    pub fn run_source(&mut self, source: &str) -> Result<Value, Error> {
        let tokens = crate::lexer::tokenize(source);
        let program = crate::parser::parse(&tokens)?;
        Ok(self.run(&program)?)
    }
}

/// Evaluate `node` in `env`.
///
/// # Stack use
///
/// Recursion follows the tree and the user program's own calls, so very
/// deep nesting or unbounded user recursion overflows the host stack and
/// aborts the process instead of returning an error.
pub fn evaluate(node: &Node, env: &EnvRef<Value>) -> EvalResult {
    match node {
        Node::Number(Literal::Int(i)) => Ok(Value::int(*i)),
        Node::Number(Literal::Float(x)) => Ok(Value::Number(Number::Float(*x))),

        Node::VarAccess(name) => env
            .borrow()
            .get(name)
            .context(UndefinedNameSnafu { name: name.as_str() }),

        Node::VarAssign { name, value } => {
            let value = evaluate(value, env)?;
            env.borrow_mut().define(name.as_str(), value.clone());
            Ok(value)
        }

        Node::BinaryOp { left, op, right } => {
            let left = evaluate(left, env)?;
            let right = evaluate(right, env)?;
            match (left.as_number(), right.as_number()) {
                (Some(a), Some(b)) => Ok(Value::Number(a.apply(*op, b)?)),
                _ => UnsupportedOperationSnafu {
                    op: op.spelling(),
                    left: left.type_name(),
                    right: right.type_name(),
                }
                .fail(),
            }
        }

        Node::Block(statements) => eval_block(statements, env),

        Node::If { cases, else_body } => {
            for (condition, body) in cases {
                if evaluate(condition, env)?.is_true() {
                    return evaluate(body, env);
                }
            }
            match else_body {
                Some(body) => evaluate(body, env),
                None => Ok(Value::Null),
            }
        }

        Node::While { condition, body } => {
            let mut results = Vec::new();
            while evaluate(condition, env)?.is_true() {
                results.push(evaluate(body, env)?);
            }
            trace!("loop finished after {} iterations", results.len());
            Ok(Value::list(results))
        }

        Node::FunctionDef(def) => Ok(define_function(def, env)),

        Node::Call { callee, args } => {
            let callee = evaluate(callee, env)?;
            let Value::Function(function) = &callee else {
                return NotCallableSnafu {
                    found: callee.type_name(),
                }
                .fail();
            };
            let args = args
                .iter()
                .map(|arg| evaluate(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            call(function, args)
        }

        Node::Return(value) => match value {
            Some(value) => evaluate(value, env),
            None => Ok(Value::Null),
        },
    }
}

/// Value of a statement sequence.
///
/// With a top-level `return` the statements run in order until the first
/// return, whose value is the block's value. Otherwise every non-null
/// statement value is collected; a single value stands alone, none gives
/// `Null`, several give a list.
pub fn eval_block(statements: &[Node], env: &EnvRef<Value>) -> EvalResult {
    if statements.iter().any(Node::is_return) {
        for statement in statements {
            let value = evaluate(statement, env)?;
            if statement.is_return() {
                return Ok(value);
            }
        }
        return Ok(Value::Null);
    }

    let mut values = Vec::with_capacity(statements.len());
    for statement in statements {
        trace!("evaluating {}", statement.describe());
        let value = evaluate(statement, env)?;
        if !value.is_null() {
            values.push(value);
        }
    }

    Ok(match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::list(values),
    })
}

/// Build the closure and, when named, bind it in the defining scope so the
/// body can refer to itself.
///
/// The binding makes the scope and the closure own each other, an `Rc`
/// cycle: a named function defined inside a call keeps that call's scope
/// alive until the process exits.
fn define_function(def: &FunctionDef, env: &EnvRef<Value>) -> Value {
    let function = Rc::new(Function {
        name: def.name.clone(),
        params: def.params.clone(),
        body: def.body.clone(),
        env: Rc::clone(env),
    });
    debug!(
        "defined fn {} with {} parameter(s)",
        function.display_name(),
        function.params.len()
    );
    let value = Value::Function(function);
    if let Some(name) = &def.name {
        env.borrow_mut().define(name.as_str(), value.clone());
    }
    value
}

/// Invoke a closure: arity check, fresh child of the captured scope,
/// positional binding, then the body.
pub fn call(function: &Function, args: Vec<Value>) -> EvalResult {
    let expected = function.params.len();
    let got = args.len();
    ensure!(
        got <= expected,
        TooManyArgumentsSnafu {
            function: function.display_name(),
            expected,
            got,
        }
    );
    ensure!(
        got >= expected,
        TooFewArgumentsSnafu {
            function: function.display_name(),
            expected,
            got,
        }
    );

    debug!("call {} with {} argument(s)", function.display_name(), got);
    let scope = Environment::child(&function.env);
    {
        let mut scope = scope.borrow_mut();
        for (param, arg) in function.params.iter().zip(args) {
            scope.define(param.as_str(), arg);
        }
    }
    evaluate(&function.body, &scope)
}

/// Top-level result as shown to a user: function values are dropped from
/// a multi-value result and a lone survivor is shown bare.
pub fn displayable(value: Value) -> Value {
    let Some(items) = value.items() else {
        return value;
    };
    if !items.iter().any(Value::is_function) {
        return value;
    }
    let mut kept: Vec<Value> = items.into_iter().filter(|v| !v.is_function()).collect();
    match kept.len() {
        0 => Value::Null,
        1 => kept.remove(0),
        _ => Value::list(kept),
    }
}
