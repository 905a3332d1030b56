//! Interpreter Error Types
//!
//! Two kinds of errors cross the host boundary: syntax errors (compile-time,
//! never catchable from inside a script) and runtime errors (catchable with
//! `pcall`/`xpcall`). Resource-limit trips are runtime errors tagged with a
//! [`LimitKind`] so a host can tell a tripped ceiling from a script bug.

use crate::value::Value;

/// Result type for interpreter operations
pub type LuaResult<T> = Result<T, LuaError>;

/// Which configured ceiling a resource-limit error tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Per-call instruction budget exhausted
    Instructions,
    /// Call stack deeper than the configured maximum
    CallDepth,
    /// Cumulative `print` output larger than the configured maximum
    Output,
    /// A single intermediate string grew past the fixed internal ceiling
    StringLength,
    /// Expression nesting deeper than the evaluator's fixed ceiling
    EvalDepth,
}

/// A lexical or grammatical failure, with source position
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("input:{line}:{column}: {message}")]
pub struct SyntaxError {
    pub message: String,
    /// 1-based source line
    pub line: u32,
    /// 1-based source column
    pub column: u32,
}

/// An execution-time failure carrying an arbitrary Lua value as payload.
///
/// `error("boom")` produces a string payload, but `error({code = 42})` is
/// legal too; `pcall` hands the payload back unchanged.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{value}")]
pub struct RuntimeError {
    pub value: Value,
    /// Set when this error is a resource-limit trip
    pub limit: Option<LimitKind>,
}

impl RuntimeError {
    /// A runtime error with a plain string message
    pub fn msg(message: impl Into<String>) -> Self {
        RuntimeError {
            value: Value::from_string(message.into()),
            limit: None,
        }
    }

    /// A resource-limit trip
    pub fn limit(kind: LimitKind, message: impl Into<String>) -> Self {
        RuntimeError {
            value: Value::from_string(message.into()),
            limit: Some(kind),
        }
    }

    /// A runtime error raised by `error()` with an arbitrary payload
    pub fn thrown(value: Value) -> Self {
        RuntimeError { value, limit: None }
    }
}

/// Errors surfaced by the interpreter
#[derive(Debug, Clone, thiserror::Error)]
pub enum LuaError {
    /// Lexical or grammatical failure; aborts the whole call, uncatchable
    #[error("{0}")]
    Syntax(#[from] SyntaxError),

    /// Execution-time failure; catchable in-script via pcall/xpcall
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

impl LuaError {
    /// Shorthand for a string-message runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        LuaError::Runtime(RuntimeError::msg(message))
    }

    /// Shorthand for a syntax error
    pub fn syntax(message: impl Into<String>, line: u32, column: u32) -> Self {
        LuaError::Syntax(SyntaxError {
            message: message.into(),
            line,
            column,
        })
    }

    /// True if this error is a resource-limit trip
    pub fn is_limit(&self) -> bool {
        matches!(self, LuaError::Runtime(r) if r.limit.is_some())
    }

    /// The tripped limit, if this error is a resource-limit trip
    pub fn limit_kind(&self) -> Option<LimitKind> {
        match self {
            LuaError::Runtime(r) => r.limit,
            LuaError::Syntax(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_carries_position() {
        let err = LuaError::syntax("unexpected symbol", 3, 7);
        assert_eq!(err.to_string(), "input:3:7: unexpected symbol");
        assert!(!err.is_limit());
    }

    #[test]
    fn limit_errors_are_tagged() {
        let err: LuaError =
            RuntimeError::limit(LimitKind::Instructions, "execution quota exceeded").into();
        assert!(err.is_limit());
        assert_eq!(err.limit_kind(), Some(LimitKind::Instructions));
        assert_eq!(err.to_string(), "execution quota exceeded");
    }

    #[test]
    fn thrown_payload_is_preserved() {
        let err = RuntimeError::thrown(Value::Integer(42));
        assert_eq!(err.to_string(), "42");
        assert!(err.limit.is_none());
    }
}
