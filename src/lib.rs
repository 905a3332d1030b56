//! Moonbox - a sandboxed Lua 5.5 interpreter for embedding untrusted
//! scripts.
//!
//! The crate exposes a single entry point, [`Session`]: parse and run
//! chunks with [`Session::execute`], evaluate expressions with
//! [`Session::eval`], and exchange values through [`HostValue`].
//! Every call runs under per-call budgets ([`SessionConfig`]) for
//! instructions, call depth and printed output, and the standard
//! library omits everything that could reach outside the sandbox:
//! no `io`, no `load`, no `require`, no `debug`, no process control.
//!
//! ```
//! use moonbox::Session;
//!
//! let mut session = Session::new();
//! session.execute("function double(x) return x * 2 end").unwrap();
//! let out = session.execute("print(double(21))").unwrap();
//! assert_eq!(out, "42");
//! ```

pub mod ast;
pub mod env;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod session;
pub mod stdlib;
pub mod table;
pub mod value;

pub use error::{LimitKind, LuaError, LuaResult, RuntimeError, SyntaxError};
pub use session::{HostFn, HostValue, Session, SessionConfig};
pub use value::Value;
