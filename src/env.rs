//! Scope Environment Module
//!
//! Lexical scopes live in a single arena indexed by [`ScopeId`].
//! Closures hold a `ScopeId` instead of a reference-counted pointer to
//! their environment, so captured scopes and values never form an
//! `Rc` cycle even when a closure is stored inside a table it can see.

use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// Index of a scope in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

/// What `...` resolves to in a scope chain
#[derive(Clone)]
enum Varargs {
    /// Block scope; look further up
    Inherit,
    /// Function boundary without a `...` parameter
    Forbidden,
    Values(Rc<Vec<Value>>),
}

struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<ScopeId>,
    varargs: Varargs,
}

/// Arena of all live scopes
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    pub fn new() -> Self {
        ScopeArena { scopes: Vec::new() }
    }

    /// Top-level scope of a session; chunks may use `...`
    pub fn push_root(&mut self) -> ScopeId {
        self.push_scope(None, Varargs::Values(Rc::new(Vec::new())))
    }

    /// Block scope inside `parent`
    pub fn push_block(&mut self, parent: ScopeId) -> ScopeId {
        self.push_scope(Some(parent), Varargs::Inherit)
    }

    /// Function-call scope; `varargs` is `Some` only for vararg
    /// functions
    pub fn push_function(&mut self, parent: ScopeId, varargs: Option<Vec<Value>>) -> ScopeId {
        let va = match varargs {
            Some(values) => Varargs::Values(Rc::new(values)),
            None => Varargs::Forbidden,
        };
        self.push_scope(Some(parent), va)
    }

    fn push_scope(&mut self, parent: Option<ScopeId>, varargs: Varargs) -> ScopeId {
        self.scopes.push(Scope {
            vars: HashMap::new(),
            parent,
            varargs,
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Number of scopes ever created
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Declare a local in `scope`, shadowing any outer binding
    pub fn define(&mut self, scope: ScopeId, name: &str, value: Value) {
        self.scopes[scope.0].vars.insert(name.to_string(), value);
    }

    /// Resolve a name through the scope chain
    pub fn get(&self, scope: ScopeId, name: &str) -> Option<Value> {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let s = &self.scopes[id.0];
            if let Some(v) = s.vars.get(name) {
                return Some(v.clone());
            }
            cursor = s.parent;
        }
        None
    }

    /// Assign to an existing local in the chain. Returns false when no
    /// scope binds `name`, in which case the assignment is global.
    pub fn assign(&mut self, scope: ScopeId, name: &str, value: Value) -> bool {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if self.scopes[id.0].vars.contains_key(name) {
                self.scopes[id.0].vars.insert(name.to_string(), value);
                return true;
            }
            cursor = self.scopes[id.0].parent;
        }
        false
    }

    /// The varargs visible from `scope`, stopping at the nearest
    /// function boundary
    pub fn varargs(&self, scope: ScopeId) -> Option<Rc<Vec<Value>>> {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            match &self.scopes[id.0].varargs {
                Varargs::Inherit => cursor = self.scopes[id.0].parent,
                Varargs::Forbidden => return None,
                Varargs::Values(values) => return Some(values.clone()),
            }
        }
        None
    }
}

impl Default for ScopeArena {
    fn default() -> Self {
        ScopeArena::new()
    }
}
