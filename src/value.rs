//! Lua Value Module
//!
//! The dynamic value type and its conversions. Numbers keep Lua's two
//! subtypes (64-bit integers and doubles); strings are immutable and
//! shared; tables and functions are reference types compared by
//! identity.

use std::fmt;
use std::rc::Rc;

use crate::ast::Block;
use crate::env::ScopeId;
use crate::error::LuaResult;
use crate::interp::Interp;
use crate::lexer::{parse_number_literal, Token};
use crate::table::TableRef;

/// A Lua runtime value
#[derive(Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Str(Rc<str>),
    Table(TableRef),
    Function(FunctionRef),
}

/// Signature shared by all built-in functions
pub type NativeFn = Box<dyn Fn(&mut Interp, Vec<Value>) -> LuaResult<Vec<Value>>>;

/// A built-in function with its name for error reporting
pub struct NativeFunction {
    pub name: String,
    pub func: NativeFn,
}

/// A Lua function value closing over its defining scope
pub struct LuaClosure {
    pub params: Vec<String>,
    pub is_vararg: bool,
    pub body: Rc<Block>,
    pub scope: ScopeId,
}

/// Callable reference, compared by identity
#[derive(Clone)]
pub enum FunctionRef {
    Lua(Rc<LuaClosure>),
    Native(Rc<NativeFunction>),
}

impl FunctionRef {
    fn addr(&self) -> usize {
        match self {
            FunctionRef::Lua(f) => Rc::as_ptr(f) as usize,
            FunctionRef::Native(f) => Rc::as_ptr(f) as usize,
        }
    }
}

impl Value {
    /// Wrap an owned string
    pub fn from_string(s: String) -> Value {
        Value::Str(Rc::from(s.as_str()))
    }

    /// Wrap a string slice
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    /// The name `type()` reports for this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
        }
    }

    /// Everything except `nil` and `false` is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Numeric value for arithmetic, coercing numeric strings.
    /// Returns the value still split by subtype.
    pub fn coerce_number(&self) -> Option<Value> {
        match self {
            Value::Integer(_) | Value::Float(_) => Some(self.clone()),
            Value::Str(s) => str_to_number(s),
            _ => None,
        }
    }

    /// Value as an f64, coercing numeric strings
    pub fn coerce_float(&self) -> Option<f64> {
        match self.coerce_number()? {
            Value::Integer(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Value as an i64 if it has an exact integer representation,
    /// coercing numeric strings
    pub fn coerce_integer(&self) -> Option<i64> {
        match self.coerce_number()? {
            Value::Integer(i) => Some(i),
            Value::Float(f) => float_to_integer(f),
            _ => None,
        }
    }

    /// Raw equality without metamethods: identity for tables and
    /// functions, mathematical value for numbers
    pub fn raw_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                float_to_integer(*b) == Some(*a)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => match (a, b) {
                (FunctionRef::Lua(x), FunctionRef::Lua(y)) => Rc::ptr_eq(x, y),
                (FunctionRef::Native(x), FunctionRef::Native(y)) => Rc::ptr_eq(x, y),
                _ => false,
            },
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.raw_equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", fmt_float(*v)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Table(t) => write!(f, "table: 0x{:012x}", Rc::as_ptr(t) as usize),
            Value::Function(func) => write!(f, "function: 0x{:012x}", func.addr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // tables may be cyclic, so never recurse into them
        match self {
            Value::Str(s) => write!(f, "Str({:?})", s),
            other => write!(f, "{}", other),
        }
    }
}

/// Convert a float to an integer only when the conversion is exact
pub fn float_to_integer(f: f64) -> Option<i64> {
    if f.floor() == f && f >= i64::MIN as f64 && f < 9_223_372_036_854_775_808.0 {
        Some(f as i64)
    } else {
        None
    }
}

/// Exact `i < f` without rounding `i` through `f64`: floats beyond the
/// `i64` range order by sign, in-range floats order against their floor
pub fn int_lt_float(i: i64, f: f64) -> bool {
    if f.is_nan() {
        false
    } else if f >= 9_223_372_036_854_775_808.0 {
        true
    } else if f < i64::MIN as f64 {
        false
    } else {
        let floor = f.floor();
        if f > floor {
            i <= floor as i64
        } else {
            i < floor as i64
        }
    }
}

/// Exact `i <= f`, same conventions as [`int_lt_float`]
pub fn int_le_float(i: i64, f: f64) -> bool {
    if f.is_nan() {
        false
    } else if f >= 9_223_372_036_854_775_808.0 {
        true
    } else if f < i64::MIN as f64 {
        false
    } else {
        i <= f.floor() as i64
    }
}

/// Parse a string as a number the way Lua's coercion does: optional
/// surrounding whitespace and sign, decimal or hex, integer or float
pub fn str_to_number(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if body.is_empty() {
        return None;
    }
    let lower = body.to_ascii_lowercase();
    let is_hex = lower.starts_with("0x");
    let is_float = if is_hex {
        lower.contains('.') || lower.contains('p')
    } else {
        lower.contains('.') || lower.contains('e') || lower.contains("inf") || lower.contains("nan")
    };
    if !is_hex && (lower.contains("inf") || lower.contains("nan")) {
        // Lua does not coerce these spellings
        return None;
    }
    let value = match parse_number_literal(&lower, is_float)? {
        Token::Int(i) => Value::Integer(if negative { i.wrapping_neg() } else { i }),
        Token::Float(f) => Value::Float(if negative { -f } else { f }),
        _ => return None,
    };
    Some(value)
}

/// Format a float the way `tostring` does: shortest `%.14g` form,
/// with `.0` appended when the result would look like an integer
pub fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let s = fmt_g(v, 14);
    if s.contains('.') || s.contains('e') {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Emulate C's `%.*g`: fixed notation when the exponent fits in
/// `[-4, prec)`, scientific otherwise, trailing zeros trimmed
pub fn fmt_g(v: f64, prec: usize) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let prec = prec.max(1);
    let sci = format!("{:.*e}", prec - 1, v);
    let (mantissa, exp_text) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exp: i32 = exp_text.parse().unwrap_or(0);
    if exp >= -4 && exp < prec as i32 {
        let decimals = (prec as i32 - 1 - exp).max(0) as usize;
        trim_trailing_zeros(format!("{:.*}", decimals, v))
    } else {
        let mantissa = trim_trailing_zeros(mantissa.to_string());
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    }
}

fn trim_trailing_zeros(mut s: String) -> String {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_int_float_ordering() {
        // i64::MAX rounds up to 2^63 as f64; exact ordering must not
        assert!(int_lt_float(i64::MAX, 9_223_372_036_854_775_808.0));
        assert!(int_le_float(i64::MIN, i64::MIN as f64));
        assert!(int_lt_float(3, 3.5));
        assert!(!int_lt_float(4, 3.5));
        assert!(int_le_float(3, 3.0));
        assert!(!int_lt_float(3, 3.0));
        assert!(!int_le_float(0, f64::NAN));
        assert!(!Value::Integer(i64::MAX).raw_equals(&Value::Float(9_223_372_036_854_775_808.0)));
        assert!(Value::Integer(2).raw_equals(&Value::Float(2.0)));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Nil.type_name(), "nil");
        assert_eq!(Value::Integer(1).type_name(), "number");
        assert_eq!(Value::Float(1.5).type_name(), "number");
        assert_eq!(Value::str("x").type_name(), "string");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::str("").is_truthy());
    }

    #[test]
    fn test_cross_subtype_equality() {
        assert_eq!(Value::Integer(1), Value::Float(1.0));
        assert_ne!(Value::Integer(1), Value::Float(1.5));
        assert_ne!(Value::Integer(1), Value::str("1"));
    }

    #[test]
    fn test_str_to_number() {
        assert_eq!(str_to_number("42"), Some(Value::Integer(42)));
        assert_eq!(str_to_number("  -7  "), Some(Value::Integer(-7)));
        assert_eq!(str_to_number("3.5"), Some(Value::Float(3.5)));
        assert_eq!(str_to_number("1e2"), Some(Value::Float(100.0)));
        assert_eq!(str_to_number("0xff"), Some(Value::Integer(255)));
        assert_eq!(str_to_number("abc"), None);
        assert_eq!(str_to_number(""), None);
        assert_eq!(str_to_number("1 2"), None);
    }

    #[test]
    fn test_float_to_integer() {
        assert_eq!(float_to_integer(3.0), Some(3));
        assert_eq!(float_to_integer(3.5), None);
        assert_eq!(float_to_integer(f64::NAN), None);
        assert_eq!(float_to_integer(1e300), None);
    }

    #[test]
    fn test_fmt_float() {
        assert_eq!(fmt_float(1.0), "1.0");
        assert_eq!(fmt_float(1.5), "1.5");
        assert_eq!(fmt_float(0.1), "0.1");
        assert_eq!(fmt_float(-0.5), "-0.5");
        assert_eq!(fmt_float(1e100), "1e+100");
        assert_eq!(fmt_float(1e-5), "1e-05");
        assert_eq!(fmt_float(f64::INFINITY), "inf");
        assert_eq!(fmt_float(f64::NAN), "nan");
    }

    #[test]
    fn test_fmt_g_precision() {
        assert_eq!(fmt_g(std::f64::consts::PI, 14), "3.1415926535898");
        assert_eq!(fmt_g(100.0, 14), "100");
        assert_eq!(fmt_g(0.0, 14), "0");
    }
}
