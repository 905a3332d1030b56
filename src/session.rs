//! Session Module
//!
//! The embedding surface: a [`Session`] owns one interpreter with its
//! persistent globals, and exchanges values with the host through
//! [`HostValue`]. Each `execute`/`eval` call gets a fresh resource
//! budget; globals persist across calls, budgets do not.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::env::ScopeId;
use crate::error::{LuaError, LuaResult, RuntimeError};
use crate::interp::Interp;
use crate::parser::parse;
use crate::stdlib;
use crate::table::new_table;
use crate::value::{FunctionRef, NativeFunction, Value};

/// Marshalling deeper than this is treated as a cycle
const MAX_MARSHAL_DEPTH: usize = 100;

/// Per-call resource budgets
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Statements, loop iterations and calls charged per call
    pub max_instructions: u64,
    /// Maximum nested function calls
    pub max_call_depth: usize,
    /// Total bytes `print` may emit per call
    pub max_output_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_instructions: 1_000_000,
            max_call_depth: 200,
            max_output_bytes: 1_000_000,
        }
    }
}

/// A host-side callback callable from scripts
pub type HostFn = Rc<dyn Fn(Vec<HostValue>) -> Result<HostValue, String>>;

/// A value crossing the host boundary
#[derive(Clone)]
pub enum HostValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A table whose keys were exactly `1..=n`
    Array(Vec<HostValue>),
    /// Any other table, as key/value pairs
    Map(Vec<(HostValue, HostValue)>),
    Function(HostFn),
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => write!(f, "Nil"),
            HostValue::Bool(b) => write!(f, "Bool({})", b),
            HostValue::Int(i) => write!(f, "Int({})", i),
            HostValue::Float(v) => write!(f, "Float({})", v),
            HostValue::Str(s) => write!(f, "Str({:?})", s),
            HostValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            HostValue::Map(pairs) => f.debug_tuple("Map").field(pairs).finish(),
            HostValue::Function(_) => write!(f, "Function"),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &HostValue) -> bool {
        match (self, other) {
            (HostValue::Nil, HostValue::Nil) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Array(a), HostValue::Array(b)) => a == b,
            (HostValue::Map(a), HostValue::Map(b)) => a == b,
            (HostValue::Function(a), HostValue::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// One sandboxed interpreter with persistent globals
pub struct Session {
    interp: Rc<RefCell<Interp>>,
    root: ScopeId,
}

impl Session {
    pub fn new() -> Self {
        Session::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let mut interp = Interp::new(config);
        let root = interp.arena.push_root();
        stdlib::install(&mut interp);
        Session {
            interp: Rc::new(RefCell::new(interp)),
            root,
        }
    }

    /// Run a chunk; returns everything the chunk printed, one line per
    /// `print` call, joined with newlines
    pub fn execute(&mut self, source: &str) -> LuaResult<String> {
        let block = parse(source)?;
        let mut interp = self.interp.borrow_mut();
        interp.reset();
        interp.exec_chunk(&block, self.root)?;
        Ok(interp.output().join("\n"))
    }

    /// Evaluate an expression and marshal its results out
    pub fn eval(&mut self, expr: &str) -> LuaResult<Vec<HostValue>> {
        let block = parse(&format!("return {}", expr))?;
        let values = {
            let mut interp = self.interp.borrow_mut();
            interp.reset();
            // a child scope keeps eval locals out of the session root
            let scope = interp.arena.push_block(self.root);
            interp.exec_chunk(&block, scope)?
        };
        values
            .iter()
            .map(|v| lua_to_host(v, &self.interp, 0))
            .collect()
    }

    /// Bind a host value as a variable visible to every later call
    pub fn set(&mut self, name: &str, value: HostValue) -> LuaResult<()> {
        let lua = host_to_lua(&value, &self.interp)?;
        let mut interp = self.interp.borrow_mut();
        interp.arena.define(self.root, name, lua.clone());
        let globals = interp.globals.clone();
        let result = globals
            .borrow_mut()
            .set(Value::str(name), lua)
            .map_err(|e| LuaError::from(RuntimeError::msg(e)));
        result
    }

    /// Read a variable back out of the session
    pub fn get(&mut self, name: &str) -> LuaResult<HostValue> {
        let value = {
            let interp = self.interp.borrow();
            match interp.arena.get(self.root, name) {
                Some(v) => v,
                None => interp.globals.borrow().get(&Value::str(name)),
            }
        };
        lua_to_host(&value, &self.interp, 0)
    }

    /// Output of the current (possibly failed) call, for recovering
    /// what a script printed before an error
    pub fn output(&self) -> String {
        self.interp.borrow().output().join("\n")
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

/// Convert a host value into the interpreter's representation
fn host_to_lua(value: &HostValue, interp_rc: &Rc<RefCell<Interp>>) -> LuaResult<Value> {
    Ok(match value {
        HostValue::Nil => Value::Nil,
        HostValue::Bool(b) => Value::Boolean(*b),
        HostValue::Int(i) => Value::Integer(*i),
        HostValue::Float(f) => Value::Float(*f),
        HostValue::Str(s) => Value::str(s),
        HostValue::Array(items) => {
            let table = new_table();
            for (i, item) in items.iter().enumerate() {
                let v = host_to_lua(item, interp_rc)?;
                table
                    .borrow_mut()
                    .set(Value::Integer(i as i64 + 1), v)
                    .map_err(|e| LuaError::from(RuntimeError::msg(e)))?;
            }
            Value::Table(table)
        }
        HostValue::Map(pairs) => {
            let table = new_table();
            for (k, v) in pairs {
                let key = host_to_lua(k, interp_rc)?;
                let val = host_to_lua(v, interp_rc)?;
                table
                    .borrow_mut()
                    .set(key, val)
                    .map_err(|e| LuaError::from(RuntimeError::msg(e)))?;
            }
            Value::Table(table)
        }
        HostValue::Function(host_fn) => {
            let host_fn = host_fn.clone();
            let interp_rc = interp_rc.clone();
            Value::Function(FunctionRef::Native(Rc::new(NativeFunction {
                name: "host function".to_string(),
                func: Box::new(move |_interp, args| {
                    let host_args = args
                        .iter()
                        .map(|v| lua_to_host(v, &interp_rc, 0))
                        .collect::<LuaResult<Vec<_>>>()?;
                    match host_fn(host_args) {
                        Ok(result) => Ok(vec![host_to_lua(&result, &interp_rc)?]),
                        Err(message) => Err(RuntimeError::msg(message).into()),
                    }
                }),
            })))
        }
    })
}

/// Convert an interpreter value out to the host. Tables whose keys are
/// exactly `1..=n` become arrays, everything else a map; nesting past
/// [`MAX_MARSHAL_DEPTH`] is rejected rather than looping on cycles.
fn lua_to_host(
    value: &Value,
    interp_rc: &Rc<RefCell<Interp>>,
    depth: usize,
) -> LuaResult<HostValue> {
    if depth > MAX_MARSHAL_DEPTH {
        return Err(RuntimeError::msg("value is nested too deeply to convert").into());
    }
    Ok(match value {
        Value::Nil => HostValue::Nil,
        Value::Boolean(b) => HostValue::Bool(*b),
        Value::Integer(i) => HostValue::Int(*i),
        Value::Float(f) => HostValue::Float(*f),
        Value::Str(s) => HostValue::Str(s.to_string()),
        Value::Table(table) => {
            let mut pairs = Vec::new();
            let mut key = Value::Nil;
            loop {
                let entry = table
                    .borrow_mut()
                    .next(&key)
                    .map_err(|e| LuaError::from(RuntimeError::msg(e)))?;
                match entry {
                    Some((k, v)) => {
                        pairs.push((
                            lua_to_host(&k, interp_rc, depth + 1)?,
                            lua_to_host(&v, interp_rc, depth + 1)?,
                        ));
                        key = k;
                    }
                    None => break,
                }
            }
            let is_array = pairs
                .iter()
                .enumerate()
                .all(|(i, (k, _))| *k == HostValue::Int(i as i64 + 1));
            if is_array {
                HostValue::Array(pairs.into_iter().map(|(_, v)| v).collect())
            } else {
                HostValue::Map(pairs)
            }
        }
        Value::Function(_) => {
            let func = value.clone();
            let interp_rc = interp_rc.clone();
            HostValue::Function(Rc::new(move |args| {
                let mut interp = interp_rc
                    .try_borrow_mut()
                    .map_err(|_| "session is busy".to_string())?;
                let lua_args = args
                    .iter()
                    .map(|a| host_to_lua_detached(a))
                    .collect::<Result<Vec<_>, String>>()?;
                let mut results = interp
                    .call_value(func.clone(), lua_args)
                    .map_err(|e| e.to_string())?;
                drop(interp);
                let first = if results.is_empty() {
                    Value::Nil
                } else {
                    results.swap_remove(0)
                };
                lua_to_host(&first, &interp_rc, 0).map_err(|e| e.to_string())
            }))
        }
    })
}

/// Host-to-Lua conversion usable while the interpreter is borrowed;
/// host functions cannot be passed back through this path
fn host_to_lua_detached(value: &HostValue) -> Result<Value, String> {
    Ok(match value {
        HostValue::Nil => Value::Nil,
        HostValue::Bool(b) => Value::Boolean(*b),
        HostValue::Int(i) => Value::Integer(*i),
        HostValue::Float(f) => Value::Float(*f),
        HostValue::Str(s) => Value::str(s),
        HostValue::Array(items) => {
            let table = new_table();
            for (i, item) in items.iter().enumerate() {
                let v = host_to_lua_detached(item)?;
                table
                    .borrow_mut()
                    .set(Value::Integer(i as i64 + 1), v)
                    .map_err(|e| e.to_string())?;
            }
            Value::Table(table)
        }
        HostValue::Map(pairs) => {
            let table = new_table();
            for (k, v) in pairs {
                let key = host_to_lua_detached(k)?;
                let val = host_to_lua_detached(v)?;
                table.borrow_mut().set(key, val).map_err(|e| e.to_string())?;
            }
            Value::Table(table)
        }
        HostValue::Function(_) => {
            return Err("cannot pass a host function through a callback".to_string())
        }
    })
}
