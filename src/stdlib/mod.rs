//! Standard Library Module
//!
//! The sandboxed portion of the Lua standard library. Nothing here can
//! reach the filesystem, the environment, or other processes: there is
//! no `io`, no `os.execute`, no `load`, no `require`, and no `debug`.

use std::rc::Rc;

use crate::error::{LuaError, LuaResult, RuntimeError};
use crate::interp::Interp;
use crate::table::{new_table, TableRef};
use crate::value::{FunctionRef, NativeFunction, Value};

mod base;
mod math;
mod os;
mod pattern;
mod string;
mod table;

/// Install every library into the interpreter's globals
pub fn install(interp: &mut Interp) {
    base::install(interp);
    let string_table = string::install(interp);
    table::install(interp);
    math::install(interp);
    os::install(interp);

    // every string indexes through the string library
    let meta = new_table();
    let _ = meta
        .borrow_mut()
        .set(Value::str("__index"), Value::Table(string_table));
    interp.string_meta = Some(meta);

    let globals = interp.globals.clone();
    let _ = globals
        .borrow_mut()
        .set(Value::str("_G"), Value::Table(globals.clone()));
    let _ = globals
        .borrow_mut()
        .set(Value::str("_VERSION"), Value::str("Lua 5.5"));
}

/// Wrap a Rust function as a callable value
pub(crate) fn native<F>(name: &str, f: F) -> Value
where
    F: Fn(&mut Interp, Vec<Value>) -> LuaResult<Vec<Value>> + 'static,
{
    Value::Function(FunctionRef::Native(Rc::new(NativeFunction {
        name: name.to_string(),
        func: Box::new(f),
    })))
}

/// Register a function in a library table
pub(crate) fn set_fn<F>(table: &TableRef, name: &str, f: F)
where
    F: Fn(&mut Interp, Vec<Value>) -> LuaResult<Vec<Value>> + 'static,
{
    let _ = table.borrow_mut().set(Value::str(name), native(name, f));
}

/// The nth argument (1-based), nil when absent
pub(crate) fn arg(args: &[Value], n: usize) -> Value {
    args.get(n - 1).cloned().unwrap_or(Value::Nil)
}

/// Standard "bad argument" error
pub(crate) fn arg_error(func: &str, n: usize, expected: &str, args: &[Value]) -> LuaError {
    let got = match args.get(n - 1) {
        None => "no value".to_string(),
        Some(v) => v.type_name().to_string(),
    };
    RuntimeError::msg(format!(
        "bad argument #{} to '{}' ({} expected, got {})",
        n, func, expected, got
    ))
    .into()
}

pub(crate) fn check_table(func: &str, args: &[Value], n: usize) -> LuaResult<TableRef> {
    match arg(args, n) {
        Value::Table(t) => Ok(t),
        _ => Err(arg_error(func, n, "table", args)),
    }
}

/// String argument; numbers coerce the way Lua's C check does
pub(crate) fn check_str(func: &str, args: &[Value], n: usize) -> LuaResult<String> {
    match arg(args, n) {
        Value::Str(s) => Ok(s.to_string()),
        v @ (Value::Integer(_) | Value::Float(_)) => Ok(v.to_string()),
        _ => Err(arg_error(func, n, "string", args)),
    }
}

pub(crate) fn check_number(func: &str, args: &[Value], n: usize) -> LuaResult<Value> {
    arg(args, n)
        .coerce_number()
        .ok_or_else(|| arg_error(func, n, "number", args))
}

pub(crate) fn check_float(func: &str, args: &[Value], n: usize) -> LuaResult<f64> {
    arg(args, n)
        .coerce_float()
        .ok_or_else(|| arg_error(func, n, "number", args))
}

pub(crate) fn check_int(func: &str, args: &[Value], n: usize) -> LuaResult<i64> {
    let v = arg(args, n);
    match v.coerce_integer() {
        Some(i) => Ok(i),
        None => {
            if v.coerce_number().is_some() {
                Err(RuntimeError::msg(format!(
                    "bad argument #{} to '{}' (number has no integer representation)",
                    n, func
                ))
                .into())
            } else {
                Err(arg_error(func, n, "number", args))
            }
        }
    }
}

/// Optional integer argument with a default
pub(crate) fn opt_int(func: &str, args: &[Value], n: usize, default: i64) -> LuaResult<i64> {
    match arg(args, n) {
        Value::Nil => Ok(default),
        _ => check_int(func, args, n),
    }
}

/// Optional string argument with a default
pub(crate) fn opt_str(func: &str, args: &[Value], n: usize, default: &str) -> LuaResult<String> {
    match arg(args, n) {
        Value::Nil => Ok(default.to_string()),
        _ => check_str(func, args, n),
    }
}
