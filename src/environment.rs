//! Scope chain and binding management.
//!
//! The evaluator stores runtime values here and the code generator stores
//! register operands; both resolve names the same way.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type EnvRef<V> = Rc<RefCell<Environment<V>>>;

#[derive(Clone, Debug)]
pub struct Environment<V> {
    bindings: HashMap<String, V>,
    parent: Option<EnvRef<V>>,
}

impl<V> Default for Environment<V> {
    fn default() -> Self {
        Self {
            bindings: HashMap::new(),
            parent: None,
        }
    }
}

impl<V: Clone> Environment<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: EnvRef<V>) -> Self {
        Self {
            bindings: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Fresh root scope behind a shared handle.
    pub fn root() -> EnvRef<V> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Fresh scope whose lookups fall back to `parent`.
    pub fn child(parent: &EnvRef<V>) -> EnvRef<V> {
        Rc::new(RefCell::new(Self::with_parent(Rc::clone(parent))))
    }

    /// Bind in this scope only, shadowing any outer binding.
    pub fn define(&mut self, name: impl Into<String>, value: V) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<V> {
        self.bindings.get(name).cloned().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|p| p.borrow().get(name))
        })
    }

    /// Lookup that ignores enclosing scopes.
    pub fn get_local(&self, name: &str) -> Option<V> {
        self.bindings.get(name).cloned()
    }
}
