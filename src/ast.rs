//! Abstract Syntax Tree
//!
//! Node types produced by the parser and walked by the evaluator. Every
//! node carries the 1-based source line it started on, for error reporting.

use std::rc::Rc;

/// A sequence of statements
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub line: u32,
}

/// Statement types
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Assignment to one or more targets
    Assign {
        targets: Vec<Expr>,
        values: Vec<Expr>,
        line: u32,
    },

    /// Local variable declaration
    Local {
        names: Vec<String>,
        values: Vec<Expr>,
        line: u32,
    },

    /// `do ... end` block introducing a fresh scope
    Do { body: Block, line: u32 },

    /// While loop
    While {
        condition: Expr,
        body: Block,
        line: u32,
    },

    /// Repeat-until loop; the condition can see the body's locals
    Repeat {
        body: Block,
        condition: Expr,
        line: u32,
    },

    /// If / elseif / else chain; the else arm has no condition
    If {
        arms: Vec<(Expr, Block)>,
        else_body: Option<Block>,
        line: u32,
    },

    /// Numeric for loop
    NumericFor {
        name: String,
        start: Expr,
        stop: Expr,
        step: Option<Expr>,
        body: Block,
        line: u32,
    },

    /// Generic for loop over an iterator triple
    GenericFor {
        names: Vec<String>,
        exprs: Vec<Expr>,
        body: Block,
        line: u32,
    },

    /// Function call evaluated for side effects
    Call { call: Expr, line: u32 },

    /// Return; only valid as the last statement of a block
    Return { values: Vec<Expr>, line: u32 },

    /// Break out of the nearest enclosing loop
    Break { line: u32 },
}

impl Stmt {
    pub fn line(&self) -> u32 {
        match self {
            Stmt::Assign { line, .. }
            | Stmt::Local { line, .. }
            | Stmt::Do { line, .. }
            | Stmt::While { line, .. }
            | Stmt::Repeat { line, .. }
            | Stmt::If { line, .. }
            | Stmt::NumericFor { line, .. }
            | Stmt::GenericFor { line, .. }
            | Stmt::Call { line, .. }
            | Stmt::Return { line, .. }
            | Stmt::Break { line } => *line,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add, Sub, Mul, Div, IDiv, Mod, Pow,
    Concat,
    Eq, NotEq, Less, LessEq, Greater, GreaterEq,
    And, Or,
    BAnd, BOr, BXor, Shl, Shr,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
    BNot,
}

/// Expression types
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil { line: u32 },
    True { line: u32 },
    False { line: u32 },
    Int { value: i64, line: u32 },
    Float { value: f64, line: u32 },
    Str { value: String, line: u32 },

    /// `...` inside a vararg function
    Vararg { line: u32 },

    /// Variable reference by name
    Name { name: String, line: u32 },

    /// `table.field`
    Field {
        table: Box<Expr>,
        field: String,
        line: u32,
    },

    /// `table[key]`
    Index {
        table: Box<Expr>,
        key: Box<Expr>,
        line: u32,
    },

    /// Binary operation
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        line: u32,
    },

    /// Unary operation
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        line: u32,
    },

    /// `f(args)`
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        line: u32,
    },

    /// `obj:method(args)` — obj is evaluated once and prepended as `self`
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        line: u32,
    },

    /// Function literal; the body is shared so closures can hold it cheaply
    Function {
        params: Vec<String>,
        is_vararg: bool,
        body: Rc<Block>,
        line: u32,
    },

    /// Table constructor; a field with no key is positional
    Table {
        fields: Vec<(Option<Expr>, Expr)>,
        line: u32,
    },
}

impl Expr {
    pub fn line(&self) -> u32 {
        match self {
            Expr::Nil { line }
            | Expr::True { line }
            | Expr::False { line }
            | Expr::Int { line, .. }
            | Expr::Float { line, .. }
            | Expr::Str { line, .. }
            | Expr::Vararg { line }
            | Expr::Name { line, .. }
            | Expr::Field { line, .. }
            | Expr::Index { line, .. }
            | Expr::Binary { line, .. }
            | Expr::Unary { line, .. }
            | Expr::Call { line, .. }
            | Expr::MethodCall { line, .. }
            | Expr::Function { line, .. }
            | Expr::Table { line, .. } => *line,
        }
    }

    /// True if this expression can produce multiple values (call or `...`)
    pub fn is_multi(&self) -> bool {
        matches!(
            self,
            Expr::Call { .. } | Expr::MethodCall { .. } | Expr::Vararg { .. }
        )
    }

    /// True if this expression is a valid assignment target
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expr::Name { .. } | Expr::Field { .. } | Expr::Index { .. }
        )
    }
}
