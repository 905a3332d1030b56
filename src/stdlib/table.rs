//! Table library: array editing, sorting, joining, packing.

use super::base::do_unpack;
use super::{arg, check_int, check_str, check_table, opt_int, set_fn};
use crate::ast::BinOp;
use crate::error::{LimitKind, LuaError, LuaResult, RuntimeError};
use crate::interp::{Interp, MAX_STRING_LEN};
use crate::table::new_table;
use crate::value::Value;

pub fn install(interp: &mut Interp) {
    let table = new_table();

    set_fn(&table, "insert", |_, args| {
        let t = check_table("insert", &args, 1)?;
        let (pos, value) = match args.len() {
            2 => (t.borrow().len() + 1, arg(&args, 2)),
            3 => (check_int("insert", &args, 2)?, arg(&args, 3)),
            _ => return Err(RuntimeError::msg("wrong number of arguments to 'insert'").into()),
        };
        t.borrow_mut().insert(pos, value).map_err(|_| {
            LuaError::from(RuntimeError::msg(
                "bad argument #2 to 'insert' (position out of bounds)",
            ))
        })?;
        Ok(vec![])
    });

    set_fn(&table, "remove", |_, args| {
        let t = check_table("remove", &args, 1)?;
        let pos = match arg(&args, 2) {
            Value::Nil => t.borrow().len(),
            _ => check_int("remove", &args, 2)?,
        };
        let removed = t.borrow_mut().remove(pos).map_err(|_| {
            LuaError::from(RuntimeError::msg(
                "bad argument #2 to 'remove' (position out of bounds)",
            ))
        })?;
        Ok(vec![removed])
    });

    set_fn(&table, "concat", |_, args| {
        let t = check_table("concat", &args, 1)?;
        let sep = match arg(&args, 2) {
            Value::Nil => String::new(),
            _ => check_str("concat", &args, 2)?,
        };
        let i = opt_int("concat", &args, 3, 1)?;
        let j = match arg(&args, 4) {
            Value::Nil => t.borrow().len(),
            _ => check_int("concat", &args, 4)?,
        };
        let mut out = String::new();
        for idx in i..=j {
            let v = t.borrow().get(&Value::Integer(idx));
            match v {
                Value::Str(_) | Value::Integer(_) | Value::Float(_) => {
                    if idx > i {
                        out.push_str(&sep);
                    }
                    out.push_str(&v.to_string());
                }
                _ => {
                    return Err(RuntimeError::msg(format!(
                        "invalid value (at index {}) in table for 'concat'",
                        idx
                    ))
                    .into())
                }
            }
            if out.len() > MAX_STRING_LEN {
                return Err(RuntimeError::limit(
                    LimitKind::StringLength,
                    "string length overflow",
                )
                .into());
            }
        }
        Ok(vec![Value::from_string(out)])
    });

    set_fn(&table, "sort", |interp, args| {
        let t = check_table("sort", &args, 1)?;
        let comparator = match arg(&args, 2) {
            Value::Nil => None,
            f @ Value::Function(_) => Some(f),
            _ => return Err(super::arg_error("sort", 2, "function", &args)),
        };
        let len = t.borrow().len();
        let mut items = Vec::with_capacity(len as usize);
        for idx in 1..=len {
            items.push(t.borrow().get(&Value::Integer(idx)));
        }
        let sorted = merge_sort(interp, items, &comparator)?;
        let mut tb = t.borrow_mut();
        for (idx, value) in sorted.into_iter().enumerate() {
            let _ = tb.set(Value::Integer(idx as i64 + 1), value);
        }
        Ok(vec![])
    });

    set_fn(&table, "move", |_, args| {
        let a1 = check_table("move", &args, 1)?;
        let f = check_int("move", &args, 2)?;
        let e = check_int("move", &args, 3)?;
        let t = check_int("move", &args, 4)?;
        let a2 = match arg(&args, 5) {
            Value::Nil => a1.clone(),
            _ => check_table("move", &args, 5)?,
        };
        if e >= f {
            // copy backwards when ranges overlap and destination is above
            if t > f && t <= e && std::rc::Rc::ptr_eq(&a1, &a2) {
                for off in (0..=e - f).rev() {
                    let v = a1.borrow().get(&Value::Integer(f + off));
                    let _ = a2.borrow_mut().set(Value::Integer(t + off), v);
                }
            } else {
                for off in 0..=e - f {
                    let v = a1.borrow().get(&Value::Integer(f + off));
                    let _ = a2.borrow_mut().set(Value::Integer(t + off), v);
                }
            }
        }
        Ok(vec![Value::Table(a2)])
    });

    set_fn(&table, "pack", |_, args| {
        let packed = new_table();
        {
            let mut tb = packed.borrow_mut();
            let _ = tb.set(Value::str("n"), Value::Integer(args.len() as i64));
            for (i, v) in args.into_iter().enumerate() {
                let _ = tb.set(Value::Integer(i as i64 + 1), v);
            }
        }
        Ok(vec![Value::Table(packed)])
    });

    set_fn(&table, "unpack", |_, args| do_unpack("unpack", &args));

    let _ = interp
        .globals
        .borrow_mut()
        .set(Value::str("table"), Value::Table(table));
}

/// Stable sort that propagates comparator errors instead of unwinding
/// through a host sort routine
fn merge_sort(
    interp: &mut Interp,
    items: Vec<Value>,
    comparator: &Option<Value>,
) -> LuaResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut right = items;
    let left = merge_sort(interp, right.drain(..right.len() / 2).collect(), comparator)?;
    let right = merge_sort(interp, right, comparator)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let (mut li, mut ri) = (0, 0);
    while li < left.len() && ri < right.len() {
        if less_than(interp, &right[ri], &left[li], comparator)? {
            out.push(right[ri].clone());
            ri += 1;
        } else {
            out.push(left[li].clone());
            li += 1;
        }
    }
    out.extend_from_slice(&left[li..]);
    out.extend_from_slice(&right[ri..]);
    Ok(out)
}

fn less_than(
    interp: &mut Interp,
    a: &Value,
    b: &Value,
    comparator: &Option<Value>,
) -> LuaResult<bool> {
    match comparator {
        Some(f) => {
            let mut r = interp.call_value(f.clone(), vec![a.clone(), b.clone()])?;
            Ok(!r.is_empty() && r.swap_remove(0).is_truthy())
        }
        None => Ok(interp
            .binary_op(BinOp::Less, a.clone(), b.clone())?
            .is_truthy()),
    }
}
