//! Basic global functions: printing, type inspection, protected
//! calls, iteration, raw table access, metatable access.

use super::{arg, arg_error, check_int, check_table, native, set_fn};
use crate::error::{LuaError, LuaResult, RuntimeError};
use crate::interp::Interp;
use crate::value::{str_to_number, Value};

pub fn install(interp: &mut Interp) {
    let g = interp.globals.clone();

    set_fn(&g, "print", |interp, args| {
        let mut parts = Vec::with_capacity(args.len());
        for v in &args {
            parts.push(interp.tostring_value(v)?);
        }
        interp.write_output(parts.join("\t"))?;
        Ok(vec![])
    });

    set_fn(&g, "type", |_, args| {
        if args.is_empty() {
            return Err(arg_error("type", 1, "value", &args));
        }
        Ok(vec![Value::str(args[0].type_name())])
    });

    set_fn(&g, "tostring", |interp, args| {
        if args.is_empty() {
            return Err(arg_error("tostring", 1, "value", &args));
        }
        let s = interp.tostring_value(&args[0])?;
        Ok(vec![Value::from_string(s)])
    });

    set_fn(&g, "tonumber", |_, args| {
        if matches!(arg(&args, 2), Value::Nil) {
            let result = match arg(&args, 1) {
                v @ (Value::Integer(_) | Value::Float(_)) => v,
                Value::Str(s) => str_to_number(&s).unwrap_or(Value::Nil),
                _ => Value::Nil,
            };
            return Ok(vec![result]);
        }
        let base = check_int("tonumber", &args, 2)?;
        if !(2..=36).contains(&base) {
            return Err(RuntimeError::msg(
                "bad argument #2 to 'tonumber' (base out of range)",
            )
            .into());
        }
        let text = match arg(&args, 1) {
            Value::Str(s) => s.to_string(),
            _ => return Err(arg_error("tonumber", 1, "string", &args)),
        };
        let trimmed = text.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let parsed = if digits.is_empty() {
            None
        } else {
            i64::from_str_radix(digits, base as u32).ok()
        };
        Ok(vec![match parsed {
            Some(n) => Value::Integer(if negative { n.wrapping_neg() } else { n }),
            None => Value::Nil,
        }])
    });

    set_fn(&g, "assert", |interp, args| {
        if arg(&args, 1).is_truthy() {
            return Ok(args);
        }
        match arg(&args, 2) {
            Value::Nil => Err(RuntimeError::msg("assertion failed!").into()),
            message => Err(throw_value(interp, message, 1)),
        }
    });

    set_fn(&g, "error", |interp, args| {
        let level = match arg(&args, 2) {
            Value::Nil => 1,
            v => v.coerce_integer().unwrap_or(1),
        };
        Err(throw_value(interp, arg(&args, 1), level))
    });

    set_fn(&g, "pcall", |interp, mut args| {
        if args.is_empty() {
            return Err(arg_error("pcall", 1, "value", &args));
        }
        let func = args.remove(0);
        match interp.call_value(func, args) {
            Ok(mut results) => {
                let mut out = vec![Value::Boolean(true)];
                out.append(&mut results);
                Ok(out)
            }
            Err(err) => Ok(vec![Value::Boolean(false), error_value(err)]),
        }
    });

    set_fn(&g, "xpcall", |interp, mut args| {
        if args.len() < 2 {
            return Err(arg_error("xpcall", 2, "value", &args));
        }
        let func = args.remove(0);
        let handler = args.remove(0);
        match interp.call_value(func, args) {
            Ok(mut results) => {
                let mut out = vec![Value::Boolean(true)];
                out.append(&mut results);
                Ok(out)
            }
            Err(err) => {
                let payload = error_value(err);
                match interp.call_value(handler, vec![payload]) {
                    Ok(mut handled) => {
                        let mut out = vec![Value::Boolean(false)];
                        out.append(&mut handled);
                        Ok(out)
                    }
                    Err(handler_err) => {
                        Ok(vec![Value::Boolean(false), error_value(handler_err)])
                    }
                }
            }
        }
    });

    set_fn(&g, "ipairs", |_, args| {
        let t = arg(&args, 1);
        if t.is_nil() {
            return Err(arg_error("ipairs", 1, "table", &args));
        }
        let iter = native("ipairs iterator", |interp, args| {
            let t = arg(&args, 1);
            let i = check_int("ipairs iterator", &args, 2)?.wrapping_add(1);
            let v = interp.table_get(&t, &Value::Integer(i))?;
            if v.is_nil() {
                Ok(vec![Value::Nil])
            } else {
                Ok(vec![Value::Integer(i), v])
            }
        });
        Ok(vec![iter, t, Value::Integer(0)])
    });

    set_fn(&g, "next", |_, args| do_next(&args));

    set_fn(&g, "pairs", |_, args| {
        check_table("pairs", &args, 1)?;
        let iter = native("next", |_, args| do_next(&args));
        Ok(vec![iter, arg(&args, 1), Value::Nil])
    });

    set_fn(&g, "select", |_, args| {
        match arg(&args, 1) {
            Value::Str(s) if &*s == "#" => Ok(vec![Value::Integer(args.len() as i64 - 1)]),
            _ => {
                let n = check_int("select", &args, 1)?;
                let rest = args.len() as i64 - 1;
                let start = if n > 0 {
                    n
                } else if n < 0 && -n <= rest {
                    rest + n + 1
                } else {
                    return Err(RuntimeError::msg(
                        "bad argument #1 to 'select' (index out of range)",
                    )
                    .into());
                };
                Ok(args.into_iter().skip(start as usize).collect())
            }
        }
    });

    set_fn(&g, "rawget", |_, args| {
        let t = check_table("rawget", &args, 1)?;
        let v = t.borrow().get(&arg(&args, 2));
        Ok(vec![v])
    });

    set_fn(&g, "rawset", |_, args| {
        let t = check_table("rawset", &args, 1)?;
        t.borrow_mut()
            .set(arg(&args, 2), arg(&args, 3))
            .map_err(|e| LuaError::from(RuntimeError::msg(e)))?;
        Ok(vec![arg(&args, 1)])
    });

    set_fn(&g, "rawlen", |_, args| match arg(&args, 1) {
        Value::Table(t) => Ok(vec![Value::Integer(t.borrow().len())]),
        Value::Str(s) => Ok(vec![Value::Integer(s.len() as i64)]),
        _ => Err(arg_error("rawlen", 1, "table or string", &args)),
    });

    set_fn(&g, "rawequal", |_, args| {
        Ok(vec![Value::Boolean(arg(&args, 1).raw_equals(&arg(&args, 2)))])
    });

    set_fn(&g, "setmetatable", |_, args| {
        let t = check_table("setmetatable", &args, 1)?;
        let mt = match arg(&args, 2) {
            Value::Nil => None,
            Value::Table(mt) => Some(mt),
            _ => return Err(arg_error("setmetatable", 2, "nil or table", &args)),
        };
        let protected = match t.borrow().metatable() {
            Some(existing) => !existing.borrow().get(&Value::str("__metatable")).is_nil(),
            None => false,
        };
        if protected {
            return Err(RuntimeError::msg("cannot change a protected metatable").into());
        }
        t.borrow_mut().set_metatable(mt);
        Ok(vec![arg(&args, 1)])
    });

    set_fn(&g, "getmetatable", |interp, args| {
        let mt = match arg(&args, 1) {
            Value::Table(t) => t.borrow().metatable(),
            Value::Str(_) => interp.string_meta.clone(),
            _ => None,
        };
        Ok(vec![match mt {
            None => Value::Nil,
            Some(mt) => {
                let guard = mt.borrow().get(&Value::str("__metatable"));
                if guard.is_nil() {
                    Value::Table(mt.clone())
                } else {
                    guard
                }
            }
        }])
    });

    set_fn(&g, "unpack", |_, args| do_unpack("unpack", &args));
}

/// Shared by global `unpack` and `table.unpack`
pub(super) fn do_unpack(func: &'static str, args: &[Value]) -> LuaResult<Vec<Value>> {
    let t = check_table(func, args, 1)?;
    let i = super::opt_int(func, args, 2, 1)?;
    let j = match arg(args, 3) {
        Value::Nil => t.borrow().len(),
        _ => check_int(func, args, 3)?,
    };
    if j as i128 - i as i128 >= 1_000_000 {
        return Err(RuntimeError::msg("too many results to unpack").into());
    }
    let mut out = Vec::new();
    let table = t.borrow();
    for idx in i..=j {
        out.push(table.get(&Value::Integer(idx)));
    }
    Ok(out)
}

fn do_next(args: &[Value]) -> LuaResult<Vec<Value>> {
    let t = check_table("next", args, 1)?;
    let entry = t
        .borrow_mut()
        .next(&arg(args, 2))
        .map_err(|e| LuaError::from(RuntimeError::msg(e)))?;
    Ok(match entry {
        Some((k, v)) => vec![k, v],
        None => vec![Value::Nil],
    })
}

/// Raise a value as an error; string payloads at level >= 1 get the
/// current position prefixed
fn throw_value(interp: &Interp, value: Value, level: i64) -> LuaError {
    match &value {
        Value::Str(s) if level != 0 => RuntimeError::msg(format!(
            "input:{}: {}",
            interp.current_line(),
            s
        ))
        .into(),
        _ => RuntimeError::thrown(value).into(),
    }
}

/// The value `pcall` hands back for a caught error
fn error_value(err: LuaError) -> Value {
    match err {
        LuaError::Runtime(e) => e.value,
        LuaError::Syntax(e) => Value::from_string(e.to_string()),
    }
}
