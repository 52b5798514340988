//! Runtime values and closures.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::Node;
use crate::environment::EnvRef;
use crate::error::RuntimeError;
use crate::number::Number;

pub type EvalResult = Result<Value, RuntimeError>;

#[derive(Clone)]
pub enum Value {
    Number(Number),
    List(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    /// Result of an if with no matching branch or a bare `return`.
    Null,
}

/// A closure: the definition plus the scope it was created in.
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Node,
    pub env: EnvRef<Value>,
}

impl Function {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}

impl Value {
    pub fn int(i: i64) -> Self {
        Value::Number(Number::Int(i))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Truthy means a non-zero Number.
    pub fn is_true(&self) -> bool {
        self.as_number().is_some_and(Number::is_true)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(Number::Int(_)) => "integer",
            Value::Number(Number::Float(_)) => "float",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Null => "null",
        }
    }

    /// Copy of the elements when this is a list.
    pub fn items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.borrow().clone()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::List(a), Value::List(b)) => *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Function(func) => write!(f, "<fn {}>", func.display_name()),
            Value::Null => write!(f, "null"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({})", n),
            Value::List(items) => write!(f, "List({:?})", items.borrow()),
            Value::Function(func) => write!(f, "Function({})", func.display_name()),
            Value::Null => write!(f, "Null"),
        }
    }
}
