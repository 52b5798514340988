//! AST: the node set shared by the evaluator and the code generator.

use crate::token::Symbol;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

impl BinOp {
    pub fn from_symbol(symbol: Symbol) -> Option<BinOp> {
        let op = match symbol {
            Symbol::Plus => BinOp::Add,
            Symbol::Minus => BinOp::Sub,
            Symbol::Star => BinOp::Mul,
            Symbol::Slash => BinOp::Div,
            Symbol::EqEq => BinOp::Eq,
            Symbol::NotEq => BinOp::Ne,
            Symbol::Gt => BinOp::Gt,
            Symbol::GtEq => BinOp::Ge,
            Symbol::Lt => BinOp::Lt,
            Symbol::LtEq => BinOp::Le,
            Symbol::And => BinOp::And,
            Symbol::Or => BinOp::Or,
            _ => return None,
        };
        Some(op)
    }

    pub fn spelling(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Node,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Number(Literal),
    VarAccess(String),
    VarAssign {
        name: String,
        value: Box<Node>,
    },
    BinaryOp {
        left: Box<Node>,
        op: BinOp,
        right: Box<Node>,
    },
    /// Statement sequence; see `interpreter::eval_block` for its value.
    Block(Vec<Node>),
    If {
        cases: Vec<(Node, Node)>,
        else_body: Option<Box<Node>>,
    },
    While {
        condition: Box<Node>,
        body: Box<Node>,
    },
    FunctionDef(Box<FunctionDef>),
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    /// return expr  (expr optional)
    Return(Option<Box<Node>>),
}

impl Node {
    pub fn binary(left: Node, op: BinOp, right: Node) -> Self {
        Node::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Node::Return(_))
    }

    /// Short construct name for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            Node::Number(Literal::Int(_)) => "integer literal",
            Node::Number(Literal::Float(_)) => "float literal",
            Node::VarAccess(_) => "variable access",
            Node::VarAssign { .. } => "assignment",
            Node::BinaryOp { .. } => "binary operation",
            Node::Block(_) => "block",
            Node::If { .. } => "if",
            Node::While { .. } => "while",
            Node::FunctionDef(_) => "function definition",
            Node::Call { .. } => "function call",
            Node::Return(_) => "return",
        }
    }
}
