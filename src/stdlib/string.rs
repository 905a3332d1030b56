//! String library. All indexing is byte-based with Lua's negative
//! offset convention; pattern functions delegate to the matcher in
//! [`super::pattern`].

use std::cell::RefCell;

use super::pattern::{match_pattern, Capture, MatchResult};
use super::{arg, arg_error, check_float, check_int, check_str, native, opt_int, set_fn};
use crate::error::{LimitKind, LuaError, LuaResult, RuntimeError};
use crate::interp::{Interp, MAX_STRING_LEN};
use crate::table::{new_table, TableRef};
use crate::value::{fmt_g, Value};

pub fn install(interp: &mut Interp) -> TableRef {
    let string = new_table();

    set_fn(&string, "len", |_, args| {
        let s = check_str("len", &args, 1)?;
        Ok(vec![Value::Integer(s.len() as i64)])
    });

    set_fn(&string, "sub", |_, args| {
        let s = check_str("sub", &args, 1)?;
        let bytes = s.as_bytes();
        let len = bytes.len() as i64;
        let mut i = posrelat(check_int("sub", &args, 2)?, len);
        let mut j = posrelat(opt_int("sub", &args, 3, -1)?, len);
        if i < 1 {
            i = 1;
        }
        if j > len {
            j = len;
        }
        let out = if i > j {
            String::new()
        } else {
            String::from_utf8_lossy(&bytes[i as usize - 1..j as usize]).into_owned()
        };
        Ok(vec![Value::from_string(out)])
    });

    set_fn(&string, "rep", |_, args| {
        let s = check_str("rep", &args, 1)?;
        let n = check_int("rep", &args, 2)?;
        let sep = super::opt_str("rep", &args, 3, "")?;
        if n <= 0 {
            return Ok(vec![Value::str("")]);
        }
        let total = (s.len() as i64 + sep.len() as i64)
            .checked_mul(n)
            .filter(|t| *t <= MAX_STRING_LEN as i64)
            .ok_or_else(|| {
                LuaError::from(RuntimeError::limit(
                    LimitKind::StringLength,
                    "string length overflow",
                ))
            })?;
        let mut out = String::with_capacity(total as usize);
        for k in 0..n {
            if k > 0 {
                out.push_str(&sep);
            }
            out.push_str(&s);
        }
        Ok(vec![Value::from_string(out)])
    });

    set_fn(&string, "reverse", |_, args| {
        let s = check_str("reverse", &args, 1)?;
        let mut bytes = s.into_bytes();
        bytes.reverse();
        Ok(vec![Value::from_string(
            String::from_utf8_lossy(&bytes).into_owned(),
        )])
    });

    set_fn(&string, "upper", |_, args| {
        let s = check_str("upper", &args, 1)?;
        Ok(vec![Value::from_string(s.to_ascii_uppercase())])
    });

    set_fn(&string, "lower", |_, args| {
        let s = check_str("lower", &args, 1)?;
        Ok(vec![Value::from_string(s.to_ascii_lowercase())])
    });

    set_fn(&string, "byte", |_, args| {
        let s = check_str("byte", &args, 1)?;
        let bytes = s.as_bytes();
        let len = bytes.len() as i64;
        let i = posrelat(opt_int("byte", &args, 2, 1)?, len).max(1);
        let j = posrelat(opt_int("byte", &args, 3, i)?, len).min(len);
        let mut out = Vec::new();
        for k in i..=j {
            out.push(Value::Integer(bytes[k as usize - 1] as i64));
        }
        Ok(out)
    });

    set_fn(&string, "char", |_, args| {
        let mut bytes = Vec::with_capacity(args.len());
        for n in 1..=args.len() {
            let code = check_int("char", &args, n)?;
            if !(0..=255).contains(&code) {
                return Err(RuntimeError::msg(format!(
                    "bad argument #{} to 'char' (value out of range)",
                    n
                ))
                .into());
            }
            bytes.push(code as u8);
        }
        Ok(vec![Value::from_string(
            String::from_utf8_lossy(&bytes).into_owned(),
        )])
    });

    set_fn(&string, "find", |_, args| do_find(&args, true));
    set_fn(&string, "match", |_, args| do_find(&args, false));
    set_fn(&string, "gmatch", |_, args| do_gmatch(&args));
    set_fn(&string, "gsub", |interp, args| do_gsub(interp, &args));
    set_fn(&string, "format", |interp, args| do_format(interp, &args));

    let _ = interp
        .globals
        .borrow_mut()
        .set(Value::str("string"), Value::Table(string.clone()));
    string
}

/// Lua's relative position rule: negative offsets count from the end
fn posrelat(pos: i64, len: i64) -> i64 {
    if pos >= 0 {
        pos
    } else if -pos > len {
        0
    } else {
        len + pos + 1
    }
}

fn pattern_error(e: String) -> LuaError {
    RuntimeError::msg(e).into()
}

/// A capture as a script-visible value
fn capture_value(src: &[u8], cap: &Capture) -> Value {
    match cap {
        Capture::Span(a, b) => {
            Value::from_string(String::from_utf8_lossy(&src[*a..*b]).into_owned())
        }
        Capture::Position(p) => Value::Integer(*p as i64),
    }
}

/// Captures of a match, or the whole match when the pattern had none
fn match_values(src: &[u8], m: &MatchResult) -> Vec<Value> {
    if m.captures.is_empty() {
        vec![Value::from_string(
            String::from_utf8_lossy(&src[m.start..m.end]).into_owned(),
        )]
    } else {
        m.captures.iter().map(|c| capture_value(src, c)).collect()
    }
}

/// Shared body of `string.find` and `string.match`
fn do_find(args: &[Value], find: bool) -> LuaResult<Vec<Value>> {
    let func = if find { "find" } else { "match" };
    let s = check_str(func, args, 1)?;
    let pat = check_str(func, args, 2)?;
    let src = s.as_bytes();
    let len = src.len() as i64;

    let mut init = posrelat(opt_int(func, args, 3, 1)?, len);
    if init < 1 {
        init = 1;
    }
    if init > len + 1 {
        return Ok(vec![Value::Nil]);
    }
    let init = init as usize - 1;

    let plain = find && arg(args, 4).is_truthy();
    if plain {
        let needle = pat.as_bytes();
        let found = if needle.is_empty() {
            Some(init)
        } else {
            src[init..]
                .windows(needle.len())
                .position(|w| w == needle)
                .map(|p| p + init)
        };
        return Ok(match found {
            Some(p) => vec![
                Value::Integer(p as i64 + 1),
                Value::Integer((p + needle.len()) as i64),
            ],
            None => vec![Value::Nil],
        });
    }

    match match_pattern(src, pat.as_bytes(), init).map_err(pattern_error)? {
        None => Ok(vec![Value::Nil]),
        Some(m) => {
            if find {
                let mut out = vec![
                    Value::Integer(m.start as i64 + 1),
                    Value::Integer(m.end as i64),
                ];
                out.extend(m.captures.iter().map(|c| capture_value(src, c)));
                Ok(out)
            } else {
                Ok(match_values(src, &m))
            }
        }
    }
}

fn do_gmatch(args: &[Value]) -> LuaResult<Vec<Value>> {
    let s = check_str("gmatch", args, 1)?;
    let pat = check_str("gmatch", args, 2)?;
    let src = s.into_bytes();
    let pat = pat.into_bytes();
    let pos = RefCell::new(0usize);

    let iter = native("gmatch iterator", move |_, _| {
        let mut cursor = pos.borrow_mut();
        while *cursor <= src.len() {
            match match_pattern(&src, &pat, *cursor).map_err(pattern_error)? {
                None => break,
                Some(m) => {
                    // an empty match still advances the cursor
                    *cursor = if m.end > *cursor { m.end } else { *cursor + 1 };
                    return Ok(match_values(&src, &m));
                }
            }
        }
        Ok(vec![Value::Nil])
    });
    Ok(vec![iter])
}

fn do_gsub(interp: &mut Interp, args: &[Value]) -> LuaResult<Vec<Value>> {
    let s = check_str("gsub", args, 1)?;
    let pat = check_str("gsub", args, 2)?;
    let repl = arg(args, 3);
    if !matches!(
        repl,
        Value::Str(_) | Value::Integer(_) | Value::Float(_) | Value::Table(_) | Value::Function(_)
    ) {
        return Err(arg_error("gsub", 3, "string/function/table", args));
    }
    let max_n = match arg(args, 4) {
        Value::Nil => i64::MAX,
        _ => check_int("gsub", args, 4)?,
    };

    let src = s.as_bytes();
    let pattern = pat.as_bytes();
    let anchored = pattern.first() == Some(&b'^');
    let mut out: Vec<u8> = Vec::with_capacity(src.len());
    let mut pos = 0usize;
    let mut count: i64 = 0;

    while count < max_n {
        let m = match match_pattern(src, pattern, pos).map_err(pattern_error)? {
            Some(m) => m,
            None => break,
        };
        out.extend_from_slice(&src[pos..m.start]);
        append_replacement(interp, &mut out, src, &m, &repl)?;
        count += 1;
        if out.len() > MAX_STRING_LEN {
            return Err(
                RuntimeError::limit(LimitKind::StringLength, "string length overflow").into(),
            );
        }
        if m.end > m.start {
            pos = m.end;
        } else {
            if m.start < src.len() {
                out.push(src[m.start]);
            }
            pos = m.start + 1;
        }
        if anchored || pos > src.len() {
            break;
        }
    }
    if pos < src.len() {
        out.extend_from_slice(&src[pos..]);
    }
    Ok(vec![
        Value::from_string(String::from_utf8_lossy(&out).into_owned()),
        Value::Integer(count),
    ])
}

fn append_replacement(
    interp: &mut Interp,
    out: &mut Vec<u8>,
    src: &[u8],
    m: &MatchResult,
    repl: &Value,
) -> LuaResult<()> {
    let whole = || String::from_utf8_lossy(&src[m.start..m.end]).into_owned();
    match repl {
        Value::Str(_) | Value::Integer(_) | Value::Float(_) => {
            let template = repl.to_string();
            let bytes = template.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'%' {
                    i += 1;
                    match bytes.get(i) {
                        Some(b'%') => out.push(b'%'),
                        Some(b'0') => out.extend_from_slice(&src[m.start..m.end]),
                        Some(d @ b'1'..=b'9') => {
                            let idx = (d - b'1') as usize;
                            let value = if m.captures.is_empty() && idx == 0 {
                                Value::from_string(whole())
                            } else if idx < m.captures.len() {
                                capture_value(src, &m.captures[idx])
                            } else {
                                return Err(RuntimeError::msg(format!(
                                    "invalid capture index %{}",
                                    idx + 1
                                ))
                                .into());
                            };
                            out.extend_from_slice(value.to_string().as_bytes());
                        }
                        _ => {
                            return Err(RuntimeError::msg(
                                "invalid use of '%' in replacement string",
                            )
                            .into())
                        }
                    }
                    i += 1;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            Ok(())
        }
        Value::Table(_) => {
            let key = first_capture(src, m);
            let value = interp.table_get(repl, &key)?;
            push_repl_value(out, src, m, value)
        }
        Value::Function(_) => {
            let call_args = match_values(src, m);
            let mut results = interp.call_value(repl.clone(), call_args)?;
            let value = if results.is_empty() {
                Value::Nil
            } else {
                results.swap_remove(0)
            };
            push_repl_value(out, src, m, value)
        }
        _ => Err(RuntimeError::msg("bad argument #3 to 'gsub' (string/function/table expected)").into()),
    }
}

fn first_capture(src: &[u8], m: &MatchResult) -> Value {
    match m.captures.first() {
        Some(c) => capture_value(src, c),
        None => Value::from_string(String::from_utf8_lossy(&src[m.start..m.end]).into_owned()),
    }
}

/// A table/function replacement result: false/nil keeps the original
/// text, strings and numbers substitute
fn push_repl_value(out: &mut Vec<u8>, src: &[u8], m: &MatchResult, value: Value) -> LuaResult<()> {
    match value {
        Value::Nil | Value::Boolean(false) => {
            out.extend_from_slice(&src[m.start..m.end]);
            Ok(())
        }
        Value::Str(_) | Value::Integer(_) | Value::Float(_) => {
            out.extend_from_slice(value.to_string().as_bytes());
            Ok(())
        }
        other => Err(RuntimeError::msg(format!(
            "invalid replacement value (a {})",
            other.type_name()
        ))
        .into()),
    }
}

// ---- format ----

struct FormatSpec {
    minus: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    conv: u8,
}

fn do_format(interp: &mut Interp, args: &[Value]) -> LuaResult<Vec<Value>> {
    let template = check_str("format", args, 1)?;
    let bytes = template.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut argn = 1; // next value argument, 1-based past the template
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        i += 1;
        if bytes.get(i) == Some(&b'%') {
            out.push(b'%');
            i += 1;
            continue;
        }
        let (spec, next) = parse_format_spec(bytes, i)?;
        i = next;
        argn += 1;
        let rendered = render_directive(interp, &spec, args, argn)?;
        out.extend_from_slice(rendered.as_bytes());
        if out.len() > MAX_STRING_LEN {
            return Err(
                RuntimeError::limit(LimitKind::StringLength, "string length overflow").into(),
            );
        }
    }
    Ok(vec![Value::from_string(
        String::from_utf8_lossy(&out).into_owned(),
    )])
}

fn parse_format_spec(bytes: &[u8], mut i: usize) -> LuaResult<(FormatSpec, usize)> {
    let mut spec = FormatSpec {
        minus: false,
        plus: false,
        space: false,
        alt: false,
        zero: false,
        width: 0,
        precision: None,
        conv: 0,
    };
    while let Some(&c) = bytes.get(i) {
        match c {
            b'-' => spec.minus = true,
            b'+' => spec.plus = true,
            b' ' => spec.space = true,
            b'#' => spec.alt = true,
            b'0' => spec.zero = true,
            _ => break,
        }
        i += 1;
    }
    let mut digits = 0;
    while let Some(c) = bytes.get(i).filter(|c| c.is_ascii_digit()) {
        spec.width = spec.width * 10 + (c - b'0') as usize;
        digits += 1;
        if digits > 2 {
            return Err(RuntimeError::msg("invalid format string to 'format' (width too long)").into());
        }
        i += 1;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        let mut prec = 0;
        let mut digits = 0;
        while let Some(c) = bytes.get(i).filter(|c| c.is_ascii_digit()) {
            prec = prec * 10 + (c - b'0') as usize;
            digits += 1;
            if digits > 2 {
                return Err(
                    RuntimeError::msg("invalid format string to 'format' (precision too long)")
                        .into(),
                );
            }
            i += 1;
        }
        spec.precision = Some(prec);
    }
    match bytes.get(i) {
        Some(&c) => {
            spec.conv = c;
            Ok((spec, i + 1))
        }
        None => Err(RuntimeError::msg("invalid format string to 'format'").into()),
    }
}

fn render_directive(
    interp: &mut Interp,
    spec: &FormatSpec,
    args: &[Value],
    argn: usize,
) -> LuaResult<String> {
    let body = match spec.conv {
        b'd' | b'i' | b'u' => {
            let v = check_int("format", args, argn)?;
            format_signed(spec, v)
        }
        b'o' => {
            let v = check_int("format", args, argn)?;
            format!("{:o}", v as u64)
        }
        b'x' => {
            let v = check_int("format", args, argn)?;
            let digits = format!("{:x}", v as u64);
            if spec.alt && v != 0 {
                format!("0x{}", digits)
            } else {
                digits
            }
        }
        b'X' => {
            let v = check_int("format", args, argn)?;
            let digits = format!("{:X}", v as u64);
            if spec.alt && v != 0 {
                format!("0X{}", digits)
            } else {
                digits
            }
        }
        b'c' => {
            let v = check_int("format", args, argn)?;
            ((v as u8) as char).to_string()
        }
        b'f' | b'F' => {
            let v = check_float("format", args, argn)?;
            with_sign(spec, v, format!("{:.*}", spec.precision.unwrap_or(6), v.abs()))
        }
        b'e' | b'E' => {
            let v = check_float("format", args, argn)?;
            let s = format_exp(v.abs(), spec.precision.unwrap_or(6));
            let s = if spec.conv == b'E' { s.to_uppercase() } else { s };
            with_sign(spec, v, s)
        }
        b'g' | b'G' => {
            let v = check_float("format", args, argn)?;
            let prec = spec.precision.unwrap_or(6).max(1);
            let s = fmt_g(v.abs(), prec);
            let s = if spec.conv == b'G' { s.to_uppercase() } else { s };
            with_sign(spec, v, s)
        }
        b's' => {
            let v = arg(args, argn);
            if v.is_nil() && argn > args.len() {
                return Err(arg_error("format", argn, "string", args));
            }
            let mut s = interp.tostring_value(&v)?;
            if let Some(prec) = spec.precision {
                if s.len() > prec {
                    s = String::from_utf8_lossy(&s.as_bytes()[..prec]).into_owned();
                }
            }
            s
        }
        b'q' => {
            let s = check_str("format", args, argn)?;
            quote_string(&s)
        }
        other => {
            return Err(RuntimeError::msg(format!(
                "invalid conversion '%{}' to 'format'",
                other as char
            ))
            .into())
        }
    };
    Ok(pad(spec, body))
}

fn format_signed(spec: &FormatSpec, v: i64) -> String {
    let digits = v.unsigned_abs().to_string();
    let digits = match spec.precision {
        Some(p) if digits.len() < p => format!("{}{}", "0".repeat(p - digits.len()), digits),
        _ => digits,
    };
    let sign = if v < 0 {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    };
    format!("{}{}", sign, digits)
}

fn with_sign(spec: &FormatSpec, v: f64, body: String) -> String {
    let sign = if v.is_sign_negative() {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    };
    format!("{}{}", sign, body)
}

/// C-style `%e`: mantissa with fixed precision, `e` and a signed
/// exponent of at least two digits
fn format_exp(v: f64, prec: usize) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return "inf".to_string();
    }
    let s = format!("{:.*e}", prec, v);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => s,
    }
}

fn pad(spec: &FormatSpec, body: String) -> String {
    if body.len() >= spec.width {
        return body;
    }
    let fill = spec.width - body.len();
    if spec.minus {
        format!("{}{}", body, " ".repeat(fill))
    } else if spec.zero && spec.precision.is_none() && !matches!(spec.conv, b's' | b'q' | b'c') {
        // zero padding goes after any sign
        let (sign, rest) = match body.strip_prefix(['-', '+', ' ']) {
            Some(rest) => (&body[..1], rest),
            None => ("", body.as_str()),
        };
        format!("{}{}{}", sign, "0".repeat(fill), rest)
    } else {
        format!("{}{}", " ".repeat(fill), body)
    }
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for &b in s.as_bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0 => out.push_str("\\0"),
            b if b < 32 || b == 127 => out.push_str(&format!("\\{}", b)),
            b => out.push(b as char),
        }
    }
    out.push('"');
    out
}
