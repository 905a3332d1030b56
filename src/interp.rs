//! Lua Interpreter Module
//!
//! Tree-walking evaluator over the AST. All resource accounting lives
//! here: an instruction budget ticked per statement, loop iteration
//! and call; a call-depth ceiling; and an output-byte cap. Limit trips
//! surface as ordinary runtime errors tagged with a [`LimitKind`], so
//! `pcall` can observe them while an exhausted budget keeps tripping.

use std::rc::Rc;
use std::time::Instant;

use crate::ast::{BinOp, Block, Expr, Stmt, UnOp};
use crate::env::{ScopeArena, ScopeId};
use crate::error::{LimitKind, LuaError, LuaResult, RuntimeError};
use crate::session::SessionConfig;
use crate::table::{new_table, TableRef};
use crate::value::{int_le_float, int_lt_float, FunctionRef, LuaClosure, Value};

/// Longest string `..` or `string.rep` may produce
pub const MAX_STRING_LEN: usize = 10 * 1024 * 1024;

/// Metamethod / `__index` chains longer than this are treated as loops
const MAX_META_CHAIN: usize = 100;

/// Ceiling on expression evaluation nesting, independent of the
/// call-depth budget
const MAX_EVAL_DEPTH: usize = 10_000;

/// Control flow escaping a statement
pub enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
}

/// The interpreter state shared by one session
pub struct Interp {
    pub globals: TableRef,
    pub arena: ScopeArena,
    config: SessionConfig,
    instructions: u64,
    call_depth: usize,
    eval_depth: usize,
    output: Vec<String>,
    output_bytes: usize,
    /// Metatable applied to every string value (`__index` points at
    /// the string library)
    pub string_meta: Option<TableRef>,
    started: Instant,
    current_line: u32,
}

impl Interp {
    pub fn new(config: SessionConfig) -> Self {
        Interp {
            globals: new_table(),
            arena: ScopeArena::new(),
            config,
            instructions: 0,
            call_depth: 0,
            eval_depth: 0,
            output: Vec::new(),
            output_bytes: 0,
            string_meta: None,
            started: Instant::now(),
            current_line: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Seconds since the interpreter was created, for `os.clock`
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn current_line(&self) -> u32 {
        self.current_line
    }

    /// Reset per-call budgets and the output buffer
    pub fn reset(&mut self) {
        self.instructions = 0;
        self.call_depth = 0;
        self.eval_depth = 0;
        self.output.clear();
        self.output_bytes = 0;
    }

    /// Lines printed so far in the current call
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Charge one instruction against the budget
    pub fn tick(&mut self) -> LuaResult<()> {
        self.instructions += 1;
        if self.instructions > self.config.max_instructions {
            return Err(RuntimeError::limit(
                LimitKind::Instructions,
                "execution quota exceeded",
            )
            .into());
        }
        Ok(())
    }

    /// Append one line of `print` output, honoring the byte cap
    pub fn write_output(&mut self, line: String) -> LuaResult<()> {
        let cost = line.len() + 1;
        if self.output_bytes + cost > self.config.max_output_bytes {
            return Err(RuntimeError::limit(LimitKind::Output, "output limit exceeded").into());
        }
        self.output_bytes += cost;
        self.output.push(line);
        Ok(())
    }

    fn rt(&self, message: impl std::fmt::Display) -> LuaError {
        RuntimeError::msg(format!("input:{}: {}", self.current_line, message)).into()
    }

    fn type_error<T>(&self, action: &str, value: &Value) -> LuaResult<T> {
        Err(self.rt(format!("attempt to {} a {} value", action, value.type_name())))
    }

    // ---- statements ----

    /// Run a block in `scope`; `Flow::Break` escaping a chunk or a
    /// function body is a runtime error.
    pub fn exec_chunk(&mut self, block: &Block, scope: ScopeId) -> LuaResult<Vec<Value>> {
        match self.exec_block(block, scope)? {
            Flow::Return(values) => Ok(values),
            Flow::Normal => Ok(Vec::new()),
            Flow::Break => Err(self.rt("break outside a loop")),
        }
    }

    pub fn exec_block(&mut self, block: &Block, scope: ScopeId) -> LuaResult<Flow> {
        for stmt in &block.stmts {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: ScopeId) -> LuaResult<Flow> {
        self.current_line = stmt.line();
        self.tick()?;

        match stmt {
            Stmt::Local { names, values, .. } => {
                let mut vals = self.eval_exprs(values, scope)?;
                vals.resize(names.len(), Value::Nil);
                for (name, value) in names.iter().zip(vals) {
                    self.arena.define(scope, name, value);
                }
                Ok(Flow::Normal)
            }

            Stmt::Assign { targets, values, .. } => {
                let mut vals = self.eval_exprs(values, scope)?;
                vals.resize(targets.len(), Value::Nil);
                for (target, value) in targets.iter().zip(vals) {
                    self.assign_target(target, value, scope)?;
                }
                Ok(Flow::Normal)
            }

            Stmt::Call { call, .. } => {
                self.eval_multi(call, scope)?;
                Ok(Flow::Normal)
            }

            Stmt::Do { body, .. } => {
                let inner = self.arena.push_block(scope);
                self.exec_block(body, inner)
            }

            Stmt::While { condition, body, .. } => {
                loop {
                    self.tick()?;
                    if !self.eval_expr(condition, scope)?.is_truthy() {
                        break;
                    }
                    let inner = self.arena.push_block(scope);
                    match self.exec_block(body, inner)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::Repeat { body, condition, .. } => {
                loop {
                    self.tick()?;
                    // the until condition sees the body's locals
                    let inner = self.arena.push_block(scope);
                    match self.exec_block(body, inner)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret => return Ok(ret),
                    }
                    if self.eval_expr(condition, inner)?.is_truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::If { arms, else_body, .. } => {
                for (condition, body) in arms {
                    if self.eval_expr(condition, scope)?.is_truthy() {
                        let inner = self.arena.push_block(scope);
                        return self.exec_block(body, inner);
                    }
                }
                if let Some(body) = else_body {
                    let inner = self.arena.push_block(scope);
                    return self.exec_block(body, inner);
                }
                Ok(Flow::Normal)
            }

            Stmt::NumericFor {
                name,
                start,
                stop,
                step,
                body,
                ..
            } => self.exec_numeric_for(name, start, stop, step.as_ref(), body, scope),

            Stmt::GenericFor {
                names, exprs, body, ..
            } => self.exec_generic_for(names, exprs, body, scope),

            Stmt::Return { values, .. } => {
                let vals = self.eval_exprs(values, scope)?;
                Ok(Flow::Return(vals))
            }

            Stmt::Break { .. } => Ok(Flow::Break),
        }
    }

    fn assign_target(&mut self, target: &Expr, value: Value, scope: ScopeId) -> LuaResult<()> {
        match target {
            Expr::Name { name, .. } => {
                if !self.arena.assign(scope, name, value.clone()) {
                    self.globals
                        .borrow_mut()
                        .set(Value::str(name), value)
                        .map_err(|e| self.rt(e))?;
                }
                Ok(())
            }
            Expr::Field { table, field, .. } => {
                let t = self.eval_expr(table, scope)?;
                self.table_set(&t, Value::str(field), value)
            }
            Expr::Index { table, key, .. } => {
                let t = self.eval_expr(table, scope)?;
                let k = self.eval_expr(key, scope)?;
                self.table_set(&t, k, value)
            }
            _ => Err(self.rt("cannot assign to this expression")),
        }
    }

    fn exec_numeric_for(
        &mut self,
        name: &str,
        start: &Expr,
        stop: &Expr,
        step: Option<&Expr>,
        body: &Block,
        scope: ScopeId,
    ) -> LuaResult<Flow> {
        let start = self.for_number(start, scope, "initial")?;
        let stop = self.for_number(stop, scope, "limit")?;
        let step = match step {
            Some(e) => self.for_number(e, scope, "step")?,
            None => Value::Integer(1),
        };

        // all-integer loops stay integral; otherwise everything floats
        if let (Value::Integer(i0), Value::Integer(limit), Value::Integer(st)) =
            (&start, &stop, &step)
        {
            let (mut i, limit, st) = (*i0, *limit, *st);
            if st == 0 {
                return Err(self.rt("'for' step is zero"));
            }
            loop {
                if st > 0 && i > limit || st < 0 && i < limit {
                    break;
                }
                self.tick()?;
                let inner = self.arena.push_block(scope);
                self.arena.define(inner, name, Value::Integer(i));
                match self.exec_block(body, inner)? {
                    Flow::Normal => {}
                    Flow::Break => break,
                    ret => return Ok(ret),
                }
                i = match i.checked_add(st) {
                    Some(next) => next,
                    None => break,
                };
            }
        } else {
            let to_f = |v: &Value| match v {
                Value::Integer(i) => *i as f64,
                Value::Float(f) => *f,
                _ => 0.0,
            };
            let (mut i, limit, st) = (to_f(&start), to_f(&stop), to_f(&step));
            if st == 0.0 {
                return Err(self.rt("'for' step is zero"));
            }
            loop {
                if st > 0.0 && i > limit || st < 0.0 && i < limit {
                    break;
                }
                self.tick()?;
                let inner = self.arena.push_block(scope);
                self.arena.define(inner, name, Value::Float(i));
                match self.exec_block(body, inner)? {
                    Flow::Normal => {}
                    Flow::Break => break,
                    ret => return Ok(ret),
                }
                i += st;
            }
        }
        Ok(Flow::Normal)
    }

    fn for_number(&mut self, expr: &Expr, scope: ScopeId, what: &str) -> LuaResult<Value> {
        let v = self.eval_expr(expr, scope)?;
        v.coerce_number()
            .ok_or_else(|| self.rt(format!("'for' {} value must be a number", what)))
    }

    fn exec_generic_for(
        &mut self,
        names: &[String],
        exprs: &[Expr],
        body: &Block,
        scope: ScopeId,
    ) -> LuaResult<Flow> {
        let mut iter = self.eval_exprs(exprs, scope)?;
        iter.resize(3, Value::Nil);
        let func = iter[0].clone();
        let state = iter[1].clone();
        let mut control = iter[2].clone();

        loop {
            self.tick()?;
            let mut results = self.call_value(func.clone(), vec![state.clone(), control.clone()])?;
            results.resize(names.len().max(1), Value::Nil);
            if results[0].is_nil() {
                break;
            }
            control = results[0].clone();

            let inner = self.arena.push_block(scope);
            for (name, value) in names.iter().zip(results) {
                self.arena.define(inner, name, value);
            }
            match self.exec_block(body, inner)? {
                Flow::Normal => {}
                Flow::Break => break,
                ret => return Ok(ret),
            }
        }
        Ok(Flow::Normal)
    }

    // ---- expressions ----

    /// Evaluate to exactly one value (multi-value expressions truncate)
    pub fn eval_expr(&mut self, expr: &Expr, scope: ScopeId) -> LuaResult<Value> {
        self.eval_depth += 1;
        if self.eval_depth > MAX_EVAL_DEPTH {
            self.eval_depth -= 1;
            return Err(
                RuntimeError::limit(LimitKind::EvalDepth, "expression nesting too deep").into(),
            );
        }
        let result = self.eval_expr_inner(expr, scope);
        self.eval_depth -= 1;
        result
    }

    fn eval_expr_inner(&mut self, expr: &Expr, scope: ScopeId) -> LuaResult<Value> {
        match expr {
            Expr::Nil { .. } => Ok(Value::Nil),
            Expr::True { .. } => Ok(Value::Boolean(true)),
            Expr::False { .. } => Ok(Value::Boolean(false)),
            Expr::Int { value, .. } => Ok(Value::Integer(*value)),
            Expr::Float { value, .. } => Ok(Value::Float(*value)),
            Expr::Str { value, .. } => Ok(Value::str(value)),

            Expr::Name { name, .. } => match self.arena.get(scope, name) {
                Some(v) => Ok(v),
                None => Ok(self.globals.borrow().get(&Value::str(name))),
            },

            Expr::Field { table, field, line } => {
                let t = self.eval_expr(table, scope)?;
                self.current_line = *line;
                self.table_get(&t, &Value::str(field))
            }

            Expr::Index { table, key, line } => {
                let t = self.eval_expr(table, scope)?;
                let k = self.eval_expr(key, scope)?;
                self.current_line = *line;
                self.table_get(&t, &k)
            }

            Expr::Vararg { .. } | Expr::Call { .. } | Expr::MethodCall { .. } => {
                let values = self.eval_multi(expr, scope)?;
                Ok(values.into_iter().next().unwrap_or(Value::Nil))
            }

            Expr::Function {
                params,
                is_vararg,
                body,
                ..
            } => Ok(Value::Function(FunctionRef::Lua(Rc::new(LuaClosure {
                params: params.clone(),
                is_vararg: *is_vararg,
                body: body.clone(),
                scope,
            })))),

            Expr::Table { fields, line } => self.eval_table_constructor(fields, scope, *line),

            Expr::Binary { op, lhs, rhs, line } => {
                self.eval_binary(*op, lhs, rhs, scope, *line)
            }

            Expr::Unary { op, operand, line } => {
                let v = self.eval_expr(operand, scope)?;
                self.current_line = *line;
                self.eval_unary(*op, v)
            }
        }
    }

    /// Evaluate an expression in multi-value position
    pub fn eval_multi(&mut self, expr: &Expr, scope: ScopeId) -> LuaResult<Vec<Value>> {
        match expr {
            Expr::Vararg { line } => {
                self.current_line = *line;
                match self.arena.varargs(scope) {
                    Some(values) => Ok(values.as_ref().clone()),
                    None => Err(self.rt("cannot use '...' outside a vararg function")),
                }
            }
            Expr::Call { func, args, line } => {
                let f = self.eval_expr(func, scope)?;
                let argv = self.eval_exprs(args, scope)?;
                self.current_line = *line;
                self.call_value(f, argv)
            }
            Expr::MethodCall {
                object,
                method,
                args,
                line,
            } => {
                let obj = self.eval_expr(object, scope)?;
                self.current_line = *line;
                let f = self.table_get(&obj, &Value::str(method))?;
                let mut argv = vec![obj];
                argv.extend(self.eval_exprs(args, scope)?);
                self.current_line = *line;
                self.call_value(f, argv)
            }
            _ => Ok(vec![self.eval_expr(expr, scope)?]),
        }
    }

    /// Evaluate an expression list; only the last element expands
    pub fn eval_exprs(&mut self, exprs: &[Expr], scope: ScopeId) -> LuaResult<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for (i, expr) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() && expr.is_multi() {
                values.extend(self.eval_multi(expr, scope)?);
            } else {
                values.push(self.eval_expr(expr, scope)?);
            }
        }
        Ok(values)
    }

    fn eval_table_constructor(
        &mut self,
        fields: &[(Option<Expr>, Expr)],
        scope: ScopeId,
        line: u32,
    ) -> LuaResult<Value> {
        let table = new_table();
        let mut index: i64 = 0;
        for (i, (key, value)) in fields.iter().enumerate() {
            match key {
                Some(key_expr) => {
                    let k = self.eval_expr(key_expr, scope)?;
                    let v = self.eval_expr(value, scope)?;
                    self.current_line = line;
                    table.borrow_mut().set(k, v).map_err(|e| self.rt(e))?;
                }
                None => {
                    if i + 1 == fields.len() && value.is_multi() {
                        for v in self.eval_multi(value, scope)? {
                            index += 1;
                            let _ = table.borrow_mut().set(Value::Integer(index), v);
                        }
                    } else {
                        let v = self.eval_expr(value, scope)?;
                        index += 1;
                        let _ = table.borrow_mut().set(Value::Integer(index), v);
                    }
                }
            }
        }
        Ok(Value::Table(table))
    }

    // ---- calls ----

    /// Call any callable value, following `__call` chains
    pub fn call_value(&mut self, func: Value, args: Vec<Value>) -> LuaResult<Vec<Value>> {
        self.tick()?;
        self.call_depth += 1;
        if self.call_depth > self.config.max_call_depth {
            self.call_depth -= 1;
            return Err(RuntimeError::limit(LimitKind::CallDepth, "stack overflow").into());
        }
        let result = self.dispatch_call(func, args, 0);
        self.call_depth -= 1;
        result
    }

    fn dispatch_call(&mut self, func: Value, args: Vec<Value>, hops: usize) -> LuaResult<Vec<Value>> {
        match func {
            Value::Function(FunctionRef::Native(native)) => (native.func)(self, args),
            Value::Function(FunctionRef::Lua(closure)) => self.call_closure(&closure, args),
            other => {
                if hops >= MAX_META_CHAIN {
                    return Err(self.rt("'__call' chain too long; possible loop"));
                }
                match self.metamethod(&other, "__call") {
                    Some(handler) => {
                        let mut argv = vec![other];
                        argv.extend(args);
                        self.dispatch_call(handler, argv, hops + 1)
                    }
                    None => self.type_error("call", &other),
                }
            }
        }
    }

    fn call_closure(&mut self, closure: &LuaClosure, mut args: Vec<Value>) -> LuaResult<Vec<Value>> {
        let extra = if args.len() > closure.params.len() {
            args.split_off(closure.params.len())
        } else {
            Vec::new()
        };
        args.resize(closure.params.len(), Value::Nil);

        let varargs = if closure.is_vararg { Some(extra) } else { None };
        let call_scope = self.arena.push_function(closure.scope, varargs);
        for (param, value) in closure.params.iter().zip(args) {
            self.arena.define(call_scope, param, value);
        }

        let saved_line = self.current_line;
        let result = self.exec_chunk(&closure.body, call_scope);
        self.current_line = saved_line;
        result
    }

    // ---- metatables and indexing ----

    /// Look up a metamethod on a value's metatable
    pub fn metamethod(&self, value: &Value, name: &str) -> Option<Value> {
        let mt = match value {
            Value::Table(t) => t.borrow().metatable(),
            Value::Str(_) => self.string_meta.clone(),
            _ => None,
        }?;
        let found = mt.borrow().get(&Value::str(name));
        if found.is_nil() {
            None
        } else {
            Some(found)
        }
    }

    /// Indexing with the `__index` chain
    pub fn table_get(&mut self, obj: &Value, key: &Value) -> LuaResult<Value> {
        let mut current = obj.clone();
        for _ in 0..MAX_META_CHAIN {
            if let Value::Table(t) = &current {
                let raw = t.borrow().get(key);
                if !raw.is_nil() {
                    return Ok(raw);
                }
            }
            match self.metamethod(&current, "__index") {
                Some(Value::Function(f)) => {
                    let mut result =
                        self.call_value(Value::Function(f), vec![current, key.clone()])?;
                    return Ok(if result.is_empty() {
                        Value::Nil
                    } else {
                        result.swap_remove(0)
                    });
                }
                Some(next) => current = next,
                None => {
                    return if matches!(current, Value::Table(_)) {
                        Ok(Value::Nil)
                    } else {
                        self.type_error("index", &current)
                    };
                }
            }
        }
        Err(self.rt("'__index' chain too long; possible loop"))
    }

    /// Assignment with the `__newindex` chain
    pub fn table_set(&mut self, obj: &Value, key: Value, value: Value) -> LuaResult<()> {
        let mut current = obj.clone();
        for _ in 0..MAX_META_CHAIN {
            if let Value::Table(t) = &current {
                let existing = t.borrow().get(&key);
                if !existing.is_nil() {
                    return t.borrow_mut().set(key, value).map_err(|e| self.rt(e));
                }
            }
            match self.metamethod(&current, "__newindex") {
                Some(Value::Function(f)) => {
                    self.call_value(Value::Function(f), vec![current, key, value])?;
                    return Ok(());
                }
                Some(next) => current = next,
                None => {
                    return match &current {
                        Value::Table(t) => {
                            t.borrow_mut().set(key, value).map_err(|e| self.rt(e))
                        }
                        other => self.type_error("index", other),
                    };
                }
            }
        }
        Err(self.rt("'__newindex' chain too long; possible loop"))
    }

    /// `tostring` semantics: `__tostring` first, default rendering
    /// otherwise
    pub fn tostring_value(&mut self, value: &Value) -> LuaResult<String> {
        if let Some(handler) = self.metamethod(value, "__tostring") {
            let mut result = self.call_value(handler, vec![value.clone()])?;
            return match result.drain(..).next() {
                Some(Value::Str(s)) => Ok(s.to_string()),
                Some(Value::Integer(i)) => Ok(i.to_string()),
                Some(Value::Float(f)) => Ok(crate::value::fmt_float(f)),
                _ => Err(self.rt("'__tostring' must return a string")),
            };
        }
        Ok(value.to_string())
    }

    // ---- operators ----

    fn eval_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        scope: ScopeId,
        line: u32,
    ) -> LuaResult<Value> {
        // and/or evaluate the right side lazily
        if op == BinOp::And {
            let left = self.eval_expr(lhs, scope)?;
            return if left.is_truthy() {
                self.eval_expr(rhs, scope)
            } else {
                Ok(left)
            };
        }
        if op == BinOp::Or {
            let left = self.eval_expr(lhs, scope)?;
            return if left.is_truthy() {
                Ok(left)
            } else {
                self.eval_expr(rhs, scope)
            };
        }

        let a = self.eval_expr(lhs, scope)?;
        let b = self.eval_expr(rhs, scope)?;
        self.current_line = line;
        self.binary_op(op, a, b)
    }

    /// Apply a (non-short-circuit) binary operator to two values
    pub fn binary_op(&mut self, op: BinOp, a: Value, b: Value) -> LuaResult<Value> {
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Mod
            | BinOp::Pow => self.arith(op, a, b),
            BinOp::BAnd | BinOp::BOr | BinOp::BXor | BinOp::Shl | BinOp::Shr => {
                self.bitwise(op, a, b)
            }
            BinOp::Concat => self.concat(a, b),
            BinOp::Eq => Ok(Value::Boolean(self.values_equal(&a, &b)?)),
            BinOp::NotEq => Ok(Value::Boolean(!self.values_equal(&a, &b)?)),
            BinOp::Less => self.compare(a, b, false, false),
            BinOp::LessEq => self.compare(a, b, true, false),
            BinOp::Greater => self.compare(b, a, false, true),
            BinOp::GreaterEq => self.compare(b, a, true, true),
            BinOp::And | BinOp::Or => unreachable!("short-circuit ops handled by the caller"),
        }
    }

    fn arith(&mut self, op: BinOp, a: Value, b: Value) -> LuaResult<Value> {
        let (na, nb) = match (a.coerce_number(), b.coerce_number()) {
            (Some(x), Some(y)) => (x, y),
            _ => return self.arith_meta(op, a, b),
        };

        // / and ^ always produce floats
        if matches!(op, BinOp::Div | BinOp::Pow) {
            let (x, y) = (num_as_f64(&na), num_as_f64(&nb));
            return Ok(Value::Float(match op {
                BinOp::Div => x / y,
                _ => x.powf(y),
            }));
        }

        if let (Value::Integer(x), Value::Integer(y)) = (&na, &nb) {
            let (x, y) = (*x, *y);
            return Ok(Value::Integer(match op {
                BinOp::Add => x.wrapping_add(y),
                BinOp::Sub => x.wrapping_sub(y),
                BinOp::Mul => x.wrapping_mul(y),
                BinOp::IDiv => {
                    if y == 0 {
                        return Err(self.rt("attempt to perform 'n//0'"));
                    }
                    floor_div(x, y)
                }
                BinOp::Mod => {
                    if y == 0 {
                        return Err(self.rt("attempt to perform 'n%%0'"));
                    }
                    floor_mod(x, y)
                }
                _ => unreachable!(),
            }));
        }

        let (x, y) = (num_as_f64(&na), num_as_f64(&nb));
        Ok(Value::Float(match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::IDiv => (x / y).floor(),
            BinOp::Mod => float_floor_mod(x, y),
            _ => unreachable!(),
        }))
    }

    fn arith_meta(&mut self, op: BinOp, a: Value, b: Value) -> LuaResult<Value> {
        let name = arith_metamethod_name(op);
        if let Some(v) = self.try_binary_metamethod(name, &a, &b)? {
            return Ok(v);
        }
        let offender = if a.coerce_number().is_none() { &a } else { &b };
        self.type_error("perform arithmetic on", offender)
    }

    fn bitwise(&mut self, op: BinOp, a: Value, b: Value) -> LuaResult<Value> {
        let (na, nb) = (a.coerce_integer(), b.coerce_integer());
        let (x, y) = match (na, nb) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                let name = arith_metamethod_name(op);
                if let Some(v) = self.try_binary_metamethod(name, &a, &b)? {
                    return Ok(v);
                }
                let offender = if a.coerce_integer().is_none() { &a } else { &b };
                if offender.coerce_number().is_some() {
                    return Err(self.rt("number has no integer representation"));
                }
                return self.type_error("perform bitwise operation on", offender);
            }
        };
        Ok(Value::Integer(match op {
            BinOp::BAnd => x & y,
            BinOp::BOr => x | y,
            BinOp::BXor => x ^ y,
            BinOp::Shl => shift_left(x, y),
            BinOp::Shr => shift_left(x, y.wrapping_neg()),
            _ => unreachable!(),
        }))
    }

    fn concat(&mut self, a: Value, b: Value) -> LuaResult<Value> {
        let left = concat_text(&a);
        let right = concat_text(&b);
        if let (Some(l), Some(r)) = (left, right) {
            if l.len() + r.len() > MAX_STRING_LEN {
                return Err(
                    RuntimeError::limit(LimitKind::StringLength, "string length overflow").into(),
                );
            }
            let mut s = String::with_capacity(l.len() + r.len());
            s.push_str(&l);
            s.push_str(&r);
            return Ok(Value::from_string(s));
        }
        if let Some(v) = self.try_binary_metamethod("__concat", &a, &b)? {
            return Ok(v);
        }
        let offender = if concat_text(&a).is_none() { &a } else { &b };
        self.type_error("concatenate", offender)
    }

    fn try_binary_metamethod(
        &mut self,
        name: &str,
        a: &Value,
        b: &Value,
    ) -> LuaResult<Option<Value>> {
        let handler = self
            .metamethod(a, name)
            .or_else(|| self.metamethod(b, name));
        match handler {
            Some(h) => {
                let mut result = self.call_value(h, vec![a.clone(), b.clone()])?;
                Ok(Some(if result.is_empty() {
                    Value::Nil
                } else {
                    result.swap_remove(0)
                }))
            }
            None => Ok(None),
        }
    }

    /// Equality with `__eq` (consulted only when both operands are
    /// tables that are not already identical)
    pub fn values_equal(&mut self, a: &Value, b: &Value) -> LuaResult<bool> {
        if a.raw_equals(b) {
            return Ok(true);
        }
        if let (Value::Table(_), Value::Table(_)) = (a, b) {
            if let Some(v) = self.try_binary_metamethod("__eq", a, b)? {
                return Ok(v.is_truthy());
            }
        }
        Ok(false)
    }

    /// `a < b` (or `<=` with `or_equal`); `swapped` only affects the
    /// error message for `>` and `>=`
    fn compare(&mut self, a: Value, b: Value, or_equal: bool, swapped: bool) -> LuaResult<Value> {
        match (&a, &b) {
            (Value::Integer(x), Value::Integer(y)) => {
                Ok(Value::Boolean(if or_equal { x <= y } else { x < y }))
            }
            (Value::Float(x), Value::Float(y)) => {
                Ok(Value::Boolean(if or_equal { x <= y } else { x < y }))
            }
            (Value::Integer(x), Value::Float(y)) => Ok(Value::Boolean(if or_equal {
                int_le_float(*x, *y)
            } else {
                int_lt_float(*x, *y)
            })),
            // f < i is the negation of i <= f, except that NaN fails both
            (Value::Float(x), Value::Integer(y)) => Ok(Value::Boolean(if x.is_nan() {
                false
            } else if or_equal {
                !int_lt_float(*y, *x)
            } else {
                !int_le_float(*y, *x)
            })),
            (Value::Str(x), Value::Str(y)) => {
                Ok(Value::Boolean(if or_equal { x <= y } else { x < y }))
            }
            _ => {
                let name = if or_equal { "__le" } else { "__lt" };
                if let Some(v) = self.try_binary_metamethod(name, &a, &b)? {
                    return Ok(Value::Boolean(v.is_truthy()));
                }
                let (first, second) = if swapped { (&b, &a) } else { (&a, &b) };
                if first.type_name() == second.type_name() {
                    Err(self.rt(format!(
                        "attempt to compare two {} values",
                        first.type_name()
                    )))
                } else {
                    Err(self.rt(format!(
                        "attempt to compare {} with {}",
                        first.type_name(),
                        second.type_name()
                    )))
                }
            }
        }
    }

    fn eval_unary(&mut self, op: UnOp, v: Value) -> LuaResult<Value> {
        match op {
            UnOp::Not => Ok(Value::Boolean(!v.is_truthy())),
            UnOp::Neg => match v.coerce_number() {
                Some(Value::Integer(i)) => Ok(Value::Integer(i.wrapping_neg())),
                Some(Value::Float(f)) => Ok(Value::Float(-f)),
                _ => {
                    if let Some(h) = self.metamethod(&v, "__unm") {
                        let mut r = self.call_value(h, vec![v.clone(), v])?;
                        return Ok(r.drain(..).next().unwrap_or(Value::Nil));
                    }
                    self.type_error("perform arithmetic on", &v)
                }
            },
            UnOp::BNot => match v.coerce_integer() {
                Some(i) => Ok(Value::Integer(!i)),
                None => {
                    if let Some(h) = self.metamethod(&v, "__bnot") {
                        let mut r = self.call_value(h, vec![v.clone(), v])?;
                        return Ok(r.drain(..).next().unwrap_or(Value::Nil));
                    }
                    if v.coerce_number().is_some() {
                        return Err(self.rt("number has no integer representation"));
                    }
                    self.type_error("perform bitwise operation on", &v)
                }
            },
            UnOp::Len => self.length_of(v),
        }
    }

    /// The `#` operator: byte length for strings, `__len` then the
    /// array border for tables
    pub fn length_of(&mut self, v: Value) -> LuaResult<Value> {
        match &v {
            Value::Str(s) => Ok(Value::Integer(s.len() as i64)),
            Value::Table(t) => {
                if let Some(h) = self.metamethod(&v, "__len") {
                    let mut r = self.call_value(h, vec![v.clone()])?;
                    return Ok(r.drain(..).next().unwrap_or(Value::Nil));
                }
                Ok(Value::Integer(t.borrow().len()))
            }
            _ => self.type_error("get length of", &v),
        }
    }
}

/// Floored integer division (rounds toward negative infinity)
pub fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && (a < 0) != (b < 0) {
        q.wrapping_sub(1)
    } else {
        q
    }
}

/// Floored integer modulo; the result takes the divisor's sign
pub fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        r.wrapping_add(b)
    } else {
        r
    }
}

/// Floored float modulo
pub fn float_floor_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

/// Logical shift on the 64-bit pattern; shifts of 64 or more produce 0
pub fn shift_left(a: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((a as u64) << n) as i64
    } else {
        ((a as u64) >> -n) as i64
    }
}

fn num_as_f64(v: &Value) -> f64 {
    match v {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

/// Text a value contributes to `..`, or None when it cannot
fn concat_text(v: &Value) -> Option<String> {
    match v {
        Value::Str(s) => Some(s.to_string()),
        Value::Integer(_) | Value::Float(_) => Some(v.to_string()),
        _ => None,
    }
}

fn arith_metamethod_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "__add",
        BinOp::Sub => "__sub",
        BinOp::Mul => "__mul",
        BinOp::Div => "__div",
        BinOp::Mod => "__mod",
        BinOp::Pow => "__pow",
        BinOp::IDiv => "__idiv",
        BinOp::BAnd => "__band",
        BinOp::BOr => "__bor",
        BinOp::BXor => "__bxor",
        BinOp::Shl => "__shl",
        BinOp::Shr => "__shr",
        _ => "__add",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn run(source: &str) -> LuaResult<Vec<Value>> {
        let block = parse(source)?;
        let mut interp = Interp::new(SessionConfig::default());
        let root = interp.arena.push_root();
        interp.exec_chunk(&block, root)
    }

    fn run_one(source: &str) -> Value {
        run(source).unwrap().into_iter().next().unwrap_or(Value::Nil)
    }

    #[test]
    fn test_integer_and_float_arithmetic() {
        assert_eq!(run_one("return 1 + 2"), Value::Integer(3));
        assert_eq!(run_one("return 7 // 2"), Value::Integer(3));
        assert_eq!(run_one("return -7 // 2"), Value::Integer(-4));
        assert_eq!(run_one("return -7 % 2"), Value::Integer(1));
        assert_eq!(run_one("return 7 / 2"), Value::Float(3.5));
        assert_eq!(run_one("return 2 ^ 10"), Value::Float(1024.0));
        assert_eq!(run_one("return 1 + 0.5"), Value::Float(1.5));
    }

    #[test]
    fn test_integer_overflow_wraps() {
        assert_eq!(
            run_one("return 9223372036854775807 + 1"),
            Value::Integer(i64::MIN)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert!(run("return 1 // 0").is_err());
        assert!(run("return 1 % 0").is_err());
        assert_eq!(run_one("return 1 / 0"), Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_string_number_coercion() {
        assert_eq!(run_one("return '10' + 5"), Value::Integer(15));
        assert_eq!(run_one("return 1 .. 2"), Value::str("12"));
        assert!(run("return 'x' + 1").is_err());
    }

    #[test]
    fn test_short_circuit() {
        assert_eq!(run_one("return false and error('boom')"), Value::Boolean(false));
        assert_eq!(run_one("return nil or 5"), Value::Integer(5));
        assert_eq!(run_one("return 1 and 2"), Value::Integer(2));
    }

    #[test]
    fn test_while_and_break() {
        assert_eq!(
            run_one("local i = 0 while true do i = i + 1 if i == 5 then break end end return i"),
            Value::Integer(5)
        );
    }

    #[test]
    fn test_repeat_sees_body_locals() {
        assert_eq!(
            run_one("local n = 0 repeat local done = true n = n + 1 until done return n"),
            Value::Integer(1)
        );
    }

    #[test]
    fn test_numeric_for() {
        assert_eq!(
            run_one("local s = 0 for i = 1, 10 do s = s + i end return s"),
            Value::Integer(55)
        );
        assert_eq!(
            run_one("local s = 0 for i = 10, 1, -2 do s = s + i end return s"),
            Value::Integer(30)
        );
        assert!(run("for i = 1, 10, 0 do end").is_err());
    }

    #[test]
    fn test_closure_captures_environment() {
        let source = "
            local function counter()
                local n = 0
                return function() n = n + 1 return n end
            end
            local c = counter()
            c()
            c()
            return c()
        ";
        assert_eq!(run_one(source), Value::Integer(3));
    }

    #[test]
    fn test_multiple_returns_adjusted() {
        assert_eq!(
            run("local function f() return 1, 2, 3 end return f()")
                .unwrap()
                .len(),
            3
        );
        assert_eq!(
            run("local function f() return 1, 2, 3 end local a, b = f() return b")
                .unwrap()[0],
            Value::Integer(2)
        );
        // parenthesized calls still expand here; only explist position matters
        assert_eq!(
            run("local function f() return 1, 2 end return (f()), 9").unwrap()[0],
            Value::Integer(1)
        );
    }

    #[test]
    fn test_instruction_budget_trips() {
        let block = parse("while true do end").unwrap();
        let mut interp = Interp::new(SessionConfig {
            max_instructions: 1000,
            ..SessionConfig::default()
        });
        let root = interp.arena.push_root();
        let err = interp.exec_chunk(&block, root).unwrap_err();
        assert_eq!(err.limit_kind(), Some(LimitKind::Instructions));
    }

    #[test]
    fn test_call_depth_trips() {
        let block = parse("local function f() return f() end return f()").unwrap();
        let mut interp = Interp::new(SessionConfig::default());
        let root = interp.arena.push_root();
        let err = interp.exec_chunk(&block, root).unwrap_err();
        assert_eq!(err.limit_kind(), Some(LimitKind::CallDepth));
    }

    #[test]
    fn test_floor_helpers() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_mod(-7, 2), 1);
        assert_eq!(floor_mod(7, -2), -1);
        assert_eq!(float_floor_mod(-7.5, 2.0), 0.5);
        assert_eq!(shift_left(1, 63), i64::MIN);
        assert_eq!(shift_left(1, 64), 0);
        assert_eq!(shift_left(-1, -1), i64::MAX);
    }
}
