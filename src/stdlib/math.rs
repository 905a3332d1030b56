//! Math library. Integer-preserving where Lua is (`floor`, `ceil`,
//! `abs`, `fmod`, `max`, `min`), float elsewhere. The random generator
//! is deliberately per-thread and reseedable so sandboxed runs stay
//! deterministic under `randomseed`.

use std::cell::RefCell;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use super::{arg, arg_error, check_float, check_int, check_number, set_fn};
use crate::error::RuntimeError;
use crate::interp::Interp;
use crate::table::new_table;
use crate::value::{float_to_integer, Value};

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

pub fn install(interp: &mut Interp) {
    let math = new_table();

    {
        let mut m = math.borrow_mut();
        let _ = m.set(Value::str("pi"), Value::Float(std::f64::consts::PI));
        let _ = m.set(Value::str("huge"), Value::Float(f64::INFINITY));
        let _ = m.set(Value::str("maxinteger"), Value::Integer(i64::MAX));
        let _ = m.set(Value::str("mininteger"), Value::Integer(i64::MIN));
    }

    set_fn(&math, "abs", |_, args| {
        Ok(vec![match check_number("abs", &args, 1)? {
            Value::Integer(i) => Value::Integer(i.wrapping_abs()),
            Value::Float(f) => Value::Float(f.abs()),
            _ => unreachable!(),
        }])
    });

    set_fn(&math, "floor", |_, args| {
        Ok(vec![match check_number("floor", &args, 1)? {
            Value::Integer(i) => Value::Integer(i),
            Value::Float(f) => round_result(f.floor()),
            _ => unreachable!(),
        }])
    });

    set_fn(&math, "ceil", |_, args| {
        Ok(vec![match check_number("ceil", &args, 1)? {
            Value::Integer(i) => Value::Integer(i),
            Value::Float(f) => round_result(f.ceil()),
            _ => unreachable!(),
        }])
    });

    set_fn(&math, "sqrt", float_fn("sqrt", f64::sqrt));
    set_fn(&math, "sin", float_fn("sin", f64::sin));
    set_fn(&math, "cos", float_fn("cos", f64::cos));
    set_fn(&math, "tan", float_fn("tan", f64::tan));
    set_fn(&math, "asin", float_fn("asin", f64::asin));
    set_fn(&math, "acos", float_fn("acos", f64::acos));
    set_fn(&math, "exp", float_fn("exp", f64::exp));

    set_fn(&math, "atan", |_, args| {
        let y = check_float("atan", &args, 1)?;
        let x = match arg(&args, 2) {
            Value::Nil => 1.0,
            _ => check_float("atan", &args, 2)?,
        };
        Ok(vec![Value::Float(y.atan2(x))])
    });

    set_fn(&math, "log", |_, args| {
        let x = check_float("log", &args, 1)?;
        let result = match arg(&args, 2) {
            Value::Nil => x.ln(),
            _ => {
                let base = check_float("log", &args, 2)?;
                if base == 2.0 {
                    x.log2()
                } else if base == 10.0 {
                    x.log10()
                } else {
                    x.ln() / base.ln()
                }
            }
        };
        Ok(vec![Value::Float(result)])
    });

    set_fn(&math, "fmod", |_, args| {
        let a = check_number("fmod", &args, 1)?;
        let b = check_number("fmod", &args, 2)?;
        Ok(vec![match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => {
                if y == 0 {
                    return Err(RuntimeError::msg(
                        "bad argument #2 to 'fmod' (zero)",
                    )
                    .into());
                }
                Value::Integer(x.wrapping_rem(y))
            }
            (a, b) => {
                let (x, y) = (as_f64(&a), as_f64(&b));
                Value::Float(x % y)
            }
        }])
    });

    set_fn(&math, "modf", |_, args| {
        let v = check_float("modf", &args, 1)?;
        if v.is_infinite() {
            return Ok(vec![Value::Float(v), Value::Float(0.0)]);
        }
        let int_part = v.trunc();
        Ok(vec![
            match float_to_integer(int_part) {
                Some(i) => Value::Integer(i),
                None => Value::Float(int_part),
            },
            Value::Float(v - int_part),
        ])
    });

    set_fn(&math, "max", |_, args| extreme("max", args, true));
    set_fn(&math, "min", |_, args| extreme("min", args, false));

    set_fn(&math, "tointeger", |_, args| {
        Ok(vec![match arg(&args, 1).coerce_integer() {
            Some(i) => Value::Integer(i),
            None => Value::Nil,
        }])
    });

    set_fn(&math, "type", |_, args| {
        Ok(vec![match arg(&args, 1) {
            Value::Integer(_) => Value::str("integer"),
            Value::Float(_) => Value::str("float"),
            _ => Value::Nil,
        }])
    });

    set_fn(&math, "random", |_, args| {
        RNG.with(|rng| {
            let mut rng = rng.borrow_mut();
            match args.len() {
                0 => Ok(vec![Value::Float(rng.gen::<f64>())]),
                1 => {
                    let m = check_int("random", &args, 1)?;
                    if m < 1 {
                        return Err(RuntimeError::msg(
                            "bad argument #1 to 'random' (interval is empty)",
                        )
                        .into());
                    }
                    Ok(vec![Value::Integer(rng.gen_range(1..=m))])
                }
                _ => {
                    let m = check_int("random", &args, 1)?;
                    let n = check_int("random", &args, 2)?;
                    if m > n {
                        return Err(RuntimeError::msg(
                            "bad argument #2 to 'random' (interval is empty)",
                        )
                        .into());
                    }
                    Ok(vec![Value::Integer(rng.gen_range(m..=n))])
                }
            }
        })
    });

    set_fn(&math, "randomseed", |_, args| {
        let reseeded = match arg(&args, 1) {
            Value::Nil => StdRng::from_entropy(),
            v => {
                let seed = match v.coerce_integer() {
                    Some(i) => i as u64,
                    None => check_float("randomseed", &args, 1)?.to_bits(),
                };
                StdRng::seed_from_u64(seed)
            }
        };
        RNG.with(|rng| *rng.borrow_mut() = reseeded);
        // like Lua 5.4, report the seed actually in effect
        let report = RNG.with(|rng| rng.borrow_mut().next_u64());
        Ok(vec![Value::Integer(report as i64), Value::Integer(0)])
    });

    let _ = interp
        .globals
        .borrow_mut()
        .set(Value::str("math"), Value::Table(math));
}

fn float_fn(
    name: &'static str,
    f: fn(f64) -> f64,
) -> impl Fn(&mut Interp, Vec<Value>) -> crate::error::LuaResult<Vec<Value>> {
    move |_, args| {
        let x = check_float(name, &args, 1)?;
        Ok(vec![Value::Float(f(x))])
    }
}

fn round_result(f: f64) -> Value {
    match float_to_integer(f) {
        Some(i) => Value::Integer(i),
        None => Value::Float(f),
    }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn extreme(name: &'static str, args: Vec<Value>, want_max: bool) -> crate::error::LuaResult<Vec<Value>> {
    if args.is_empty() {
        return Err(arg_error(name, 1, "number", &args));
    }
    let mut best = check_number(name, &args, 1)?;
    for n in 2..=args.len() {
        let candidate = check_number(name, &args, n)?;
        let replace = match (&candidate, &best) {
            (Value::Integer(a), Value::Integer(b)) => {
                if want_max {
                    a > b
                } else {
                    a < b
                }
            }
            (a, b) => {
                let (x, y) = (as_f64(a), as_f64(b));
                if want_max {
                    x > y
                } else {
                    x < y
                }
            }
        };
        if replace {
            best = candidate;
        }
    }
    Ok(vec![best])
}
