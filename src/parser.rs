//! Lua Parser Module
//!
//! Recursive-descent parser with precedence climbing for expressions,
//! producing the AST in [`crate::ast`]. The operator-precedence table
//! matches Lua 5.5:
//!
//! `or` < `and` < comparisons < `|` < `~` < `&` < `<<`/`>>` < `..` (right)
//! < `+`/`-` < `*`/`/`/`//`/`%` < unary < `^` (right)

use std::rc::Rc;

use crate::ast::{BinOp, Block, Expr, Stmt, UnOp};
use crate::error::{LuaError, LuaResult};
use crate::lexer::{tokenize, SpannedToken, Token};

/// Nesting ceiling; deeper input is rejected instead of exhausting the
/// native stack.
const MAX_PARSE_DEPTH: usize = 200;

/// Precedence of a unary operator's operand
const UNARY_PRIORITY: u8 = 11;

/// Parser over a pre-lexed token stream
pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
}

/// Parse a source string into a block
pub fn parse(source: &str) -> LuaResult<Block> {
    Parser::new(source)?.parse_chunk()
}

impl Parser {
    pub fn new(source: &str) -> LuaResult<Self> {
        Ok(Parser {
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
        })
    }

    // ---- helpers ----

    fn current(&self) -> &SpannedToken {
        &self.tokens[self.pos]
    }

    fn kind(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn line(&self) -> u32 {
        self.current().line
    }

    fn check(&self, kind: &Token) -> bool {
        self.kind() == kind
    }

    fn matches(&mut self, kind: &Token) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &Token, what: &str) -> LuaResult<()> {
        if self.matches(kind) {
            Ok(())
        } else {
            self.error(format!("'{}' expected near '{}'", what, self.current().token))
        }
    }

    fn expect_name(&mut self, what: &str) -> LuaResult<String> {
        match self.kind().clone() {
            Token::Name(name) => {
                self.pos += 1;
                Ok(name)
            }
            other => self.error(format!("{} expected near '{}'", what, other)),
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> LuaResult<T> {
        let tok = self.current();
        Err(LuaError::syntax(message, tok.line, tok.column))
    }

    fn enter(&mut self) -> LuaResult<()> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return self.error("chunk has too many syntax levels");
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ---- blocks ----

    /// Parse a whole chunk, requiring the input to be fully consumed
    pub fn parse_chunk(&mut self) -> LuaResult<Block> {
        let block = self.parse_block()?;
        if !self.check(&Token::Eof) {
            return self.error(format!("'<eof>' expected near '{}'", self.current().token));
        }
        Ok(block)
    }

    fn parse_block(&mut self) -> LuaResult<Block> {
        self.enter()?;
        let line = self.line();
        let mut stmts = Vec::new();
        loop {
            while self.matches(&Token::Semicolon) {}
            if self.is_block_end() {
                break;
            }
            let stmt = self.parse_statement()?;
            let was_return = matches!(stmt, Stmt::Return { .. });
            stmts.push(stmt);
            if was_return {
                // return closes the block
                while self.matches(&Token::Semicolon) {}
                if !self.is_block_end() {
                    return self.error(format!(
                        "'end' expected near '{}'",
                        self.current().token
                    ));
                }
                break;
            }
        }
        self.leave();
        Ok(Block { stmts, line })
    }

    fn is_block_end(&self) -> bool {
        matches!(
            self.kind(),
            Token::Eof | Token::End | Token::Else | Token::ElseIf | Token::Until
        )
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> LuaResult<Stmt> {
        match self.kind() {
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::Do => self.parse_do(),
            Token::For => self.parse_for(),
            Token::Repeat => self.parse_repeat(),
            Token::Function => self.parse_function_stat(),
            Token::Local => self.parse_local(),
            Token::Return => self.parse_return(),
            Token::Break => {
                let line = self.line();
                self.pos += 1;
                Ok(Stmt::Break { line })
            }
            Token::Goto => self.error("'goto' is not supported"),
            Token::DoubleColon => self.error("labels are not supported"),
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_if(&mut self) -> LuaResult<Stmt> {
        let line = self.line();
        self.pos += 1; // if
        let mut arms = Vec::new();

        let cond = self.parse_expression(0)?;
        self.expect(&Token::Then, "then")?;
        arms.push((cond, self.parse_block()?));

        while self.matches(&Token::ElseIf) {
            let cond = self.parse_expression(0)?;
            self.expect(&Token::Then, "then")?;
            arms.push((cond, self.parse_block()?));
        }

        let else_body = if self.matches(&Token::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };

        self.expect(&Token::End, "end")?;
        Ok(Stmt::If { arms, else_body, line })
    }

    fn parse_while(&mut self) -> LuaResult<Stmt> {
        let line = self.line();
        self.pos += 1; // while
        let condition = self.parse_expression(0)?;
        self.expect(&Token::Do, "do")?;
        let body = self.parse_block()?;
        self.expect(&Token::End, "end")?;
        Ok(Stmt::While { condition, body, line })
    }

    fn parse_do(&mut self) -> LuaResult<Stmt> {
        let line = self.line();
        self.pos += 1; // do
        let body = self.parse_block()?;
        self.expect(&Token::End, "end")?;
        Ok(Stmt::Do { body, line })
    }

    fn parse_repeat(&mut self) -> LuaResult<Stmt> {
        let line = self.line();
        self.pos += 1; // repeat
        let body = self.parse_block()?;
        self.expect(&Token::Until, "until")?;
        let condition = self.parse_expression(0)?;
        Ok(Stmt::Repeat { body, condition, line })
    }

    fn parse_for(&mut self) -> LuaResult<Stmt> {
        let line = self.line();
        self.pos += 1; // for
        let first = self.expect_name("variable name")?;

        if self.matches(&Token::Assign) {
            let start = self.parse_expression(0)?;
            self.expect(&Token::Comma, ",")?;
            let stop = self.parse_expression(0)?;
            let step = if self.matches(&Token::Comma) {
                Some(self.parse_expression(0)?)
            } else {
                None
            };
            self.expect(&Token::Do, "do")?;
            let body = self.parse_block()?;
            self.expect(&Token::End, "end")?;
            return Ok(Stmt::NumericFor {
                name: first,
                start,
                stop,
                step,
                body,
                line,
            });
        }

        let mut names = vec![first];
        while self.matches(&Token::Comma) {
            names.push(self.expect_name("variable name")?);
        }
        self.expect(&Token::In, "in")?;
        let exprs = self.parse_expression_list()?;
        self.expect(&Token::Do, "do")?;
        let body = self.parse_block()?;
        self.expect(&Token::End, "end")?;
        Ok(Stmt::GenericFor { names, exprs, body, line })
    }

    /// `function Name{'.' Name}[':' Name] body` desugars to an assignment;
    /// the method form prepends `self` to the parameter list.
    fn parse_function_stat(&mut self) -> LuaResult<Stmt> {
        let line = self.line();
        self.pos += 1; // function
        let name = self.expect_name("function name")?;
        let mut target = Expr::Name { name, line };
        let mut is_method = false;

        while self.matches(&Token::Dot) {
            let field = self.expect_name("field name")?;
            target = Expr::Field {
                table: Box::new(target),
                field,
                line,
            };
        }
        if self.matches(&Token::Colon) {
            let method = self.expect_name("method name")?;
            target = Expr::Field {
                table: Box::new(target),
                field: method,
                line,
            };
            is_method = true;
        }

        let func = self.parse_function_body(is_method, line)?;
        Ok(Stmt::Assign {
            targets: vec![target],
            values: vec![func],
            line,
        })
    }

    fn parse_local(&mut self) -> LuaResult<Stmt> {
        let line = self.line();
        self.pos += 1; // local

        if self.matches(&Token::Function) {
            let name = self.expect_name("function name")?;
            let func = self.parse_function_body(false, line)?;
            return Ok(Stmt::Local {
                names: vec![name],
                values: vec![func],
                line,
            });
        }

        let mut names = vec![self.expect_name("variable name")?];
        self.parse_attrib()?;
        while self.matches(&Token::Comma) {
            names.push(self.expect_name("variable name")?);
            self.parse_attrib()?;
        }

        let values = if self.matches(&Token::Assign) {
            self.parse_expression_list()?
        } else {
            Vec::new()
        };

        Ok(Stmt::Local { names, values, line })
    }

    /// `<const>` / `<close>` attributes are accepted and ignored
    fn parse_attrib(&mut self) -> LuaResult<()> {
        if self.matches(&Token::Less) {
            self.expect_name("attribute name")?;
            self.expect(&Token::Greater, ">")?;
        }
        Ok(())
    }

    fn parse_return(&mut self) -> LuaResult<Stmt> {
        let line = self.line();
        self.pos += 1; // return
        let values = if self.is_block_end() || self.check(&Token::Semicolon) {
            Vec::new()
        } else {
            self.parse_expression_list()?
        };
        self.matches(&Token::Semicolon);
        Ok(Stmt::Return { values, line })
    }

    /// Assignment or bare function-call statement
    fn parse_expr_statement(&mut self) -> LuaResult<Stmt> {
        let line = self.line();
        let expr = self.parse_suffixed_expr()?;

        if self.check(&Token::Comma) || self.check(&Token::Assign) {
            let mut targets = vec![expr];
            while self.matches(&Token::Comma) {
                targets.push(self.parse_suffixed_expr()?);
            }
            self.expect(&Token::Assign, "=")?;
            let values = self.parse_expression_list()?;
            for t in &targets {
                if !t.is_assignable() {
                    return self.error("cannot assign to this expression");
                }
            }
            return Ok(Stmt::Assign { targets, values, line });
        }

        if expr.is_multi() && !matches!(expr, Expr::Vararg { .. }) {
            return Ok(Stmt::Call { call: expr, line });
        }
        self.error("syntax error: expression is not a statement")
    }

    // ---- expressions ----

    fn parse_expression(&mut self, min_prec: u8) -> LuaResult<Expr> {
        self.enter()?;
        let mut left = self.parse_unary()?;

        loop {
            let (prec, right_assoc, op) = match binary_op(self.kind()) {
                Some(entry) => entry,
                None => break,
            };
            if prec < min_prec {
                break;
            }
            let line = self.line();
            self.pos += 1;
            let next_prec = if right_assoc { prec } else { prec + 1 };
            let right = self.parse_expression(next_prec)?;
            left = Expr::Binary {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
                line,
            };
        }

        self.leave();
        Ok(left)
    }

    fn parse_unary(&mut self) -> LuaResult<Expr> {
        let op = match self.kind() {
            Token::Not => Some(UnOp::Not),
            Token::Minus => Some(UnOp::Neg),
            Token::Hash => Some(UnOp::Len),
            Token::Tilde => Some(UnOp::BNot),
            _ => None,
        };
        if let Some(op) = op {
            let line = self.line();
            self.pos += 1;
            let operand = self.parse_expression(UNARY_PRIORITY)?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                line,
            });
        }
        self.parse_suffixed_expr()
    }

    fn parse_suffixed_expr(&mut self) -> LuaResult<Expr> {
        self.enter()?;
        let mut expr = self.parse_primary()?;
        loop {
            match self.kind() {
                Token::Dot => {
                    self.pos += 1;
                    let line = self.line();
                    let field = self.expect_name("field name")?;
                    expr = Expr::Field {
                        table: Box::new(expr),
                        field,
                        line,
                    };
                }
                Token::LeftBracket => {
                    let line = self.line();
                    self.pos += 1;
                    let key = self.parse_expression(0)?;
                    self.expect(&Token::RightBracket, "]")?;
                    expr = Expr::Index {
                        table: Box::new(expr),
                        key: Box::new(key),
                        line,
                    };
                }
                Token::Colon => {
                    let line = self.line();
                    self.pos += 1;
                    let method = self.expect_name("method name")?;
                    let args = self.parse_call_args()?;
                    expr = Expr::MethodCall {
                        object: Box::new(expr),
                        method,
                        args,
                        line,
                    };
                }
                Token::LeftParen | Token::LeftBrace | Token::Str(_) => {
                    let line = self.line();
                    let args = self.parse_call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        line,
                    };
                }
                _ => break,
            }
        }
        self.leave();
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> LuaResult<Vec<Expr>> {
        if self.matches(&Token::LeftParen) {
            let args = if self.check(&Token::RightParen) {
                Vec::new()
            } else {
                self.parse_expression_list()?
            };
            self.expect(&Token::RightParen, ")")?;
            return Ok(args);
        }
        if self.check(&Token::LeftBrace) {
            return Ok(vec![self.parse_table_constructor()?]);
        }
        if let Token::Str(s) = self.kind().clone() {
            let line = self.line();
            self.pos += 1;
            return Ok(vec![Expr::Str { value: s, line }]);
        }
        self.error("function arguments expected")
    }

    fn parse_primary(&mut self) -> LuaResult<Expr> {
        let line = self.line();
        match self.kind().clone() {
            Token::Name(name) => {
                self.pos += 1;
                Ok(Expr::Name { name, line })
            }
            Token::LeftParen => {
                self.pos += 1;
                let expr = self.parse_expression(0)?;
                self.expect(&Token::RightParen, ")")?;
                Ok(expr)
            }
            _ => self.parse_simple_expr(),
        }
    }

    fn parse_simple_expr(&mut self) -> LuaResult<Expr> {
        let line = self.line();
        match self.kind().clone() {
            Token::Int(value) => {
                self.pos += 1;
                Ok(Expr::Int { value, line })
            }
            Token::Float(value) => {
                self.pos += 1;
                Ok(Expr::Float { value, line })
            }
            Token::Str(value) => {
                self.pos += 1;
                Ok(Expr::Str { value, line })
            }
            Token::Nil => {
                self.pos += 1;
                Ok(Expr::Nil { line })
            }
            Token::True => {
                self.pos += 1;
                Ok(Expr::True { line })
            }
            Token::False => {
                self.pos += 1;
                Ok(Expr::False { line })
            }
            Token::Ellipsis => {
                self.pos += 1;
                Ok(Expr::Vararg { line })
            }
            Token::Function => {
                self.pos += 1;
                self.parse_function_body(false, line)
            }
            Token::LeftBrace => self.parse_table_constructor(),
            other => self.error(format!("unexpected symbol near '{}'", other)),
        }
    }

    fn parse_function_body(&mut self, is_method: bool, line: u32) -> LuaResult<Expr> {
        self.expect(&Token::LeftParen, "(")?;
        let mut params = Vec::new();
        let mut is_vararg = false;

        if is_method {
            params.push("self".to_string());
        }

        if !self.check(&Token::RightParen) {
            loop {
                if self.matches(&Token::Ellipsis) {
                    is_vararg = true;
                    break;
                }
                params.push(self.expect_name("parameter name")?);
                if !self.matches(&Token::Comma) {
                    break;
                }
            }
        }

        self.expect(&Token::RightParen, ")")?;
        let body = self.parse_block()?;
        self.expect(&Token::End, "end")?;
        Ok(Expr::Function {
            params,
            is_vararg,
            body: Rc::new(body),
            line,
        })
    }

    fn parse_table_constructor(&mut self) -> LuaResult<Expr> {
        self.enter()?;
        let line = self.line();
        self.expect(&Token::LeftBrace, "{")?;
        let mut fields = Vec::new();

        while !self.check(&Token::RightBrace) {
            if self.check(&Token::LeftBracket) {
                self.pos += 1;
                let key = self.parse_expression(0)?;
                self.expect(&Token::RightBracket, "]")?;
                self.expect(&Token::Assign, "=")?;
                let value = self.parse_expression(0)?;
                fields.push((Some(key), value));
            } else if matches!(self.kind(), Token::Name(_)) && self.next_is_assign() {
                let key_line = self.line();
                let name = self.expect_name("field name")?;
                self.expect(&Token::Assign, "=")?;
                let value = self.parse_expression(0)?;
                fields.push((
                    Some(Expr::Str {
                        value: name,
                        line: key_line,
                    }),
                    value,
                ));
            } else {
                let value = self.parse_expression(0)?;
                fields.push((None, value));
            }

            if !self.matches(&Token::Comma) && !self.matches(&Token::Semicolon) {
                break;
            }
        }

        self.expect(&Token::RightBrace, "}")?;
        self.leave();
        Ok(Expr::Table { fields, line })
    }

    fn next_is_assign(&self) -> bool {
        self.pos + 1 < self.tokens.len() && self.tokens[self.pos + 1].token == Token::Assign
    }

    fn parse_expression_list(&mut self) -> LuaResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expression(0)?];
        while self.matches(&Token::Comma) {
            exprs.push(self.parse_expression(0)?);
        }
        Ok(exprs)
    }
}

/// Binary operator table: (precedence, right-associative, op).
/// Higher precedence binds tighter.
fn binary_op(token: &Token) -> Option<(u8, bool, BinOp)> {
    Some(match token {
        Token::Or => (1, false, BinOp::Or),
        Token::And => (2, false, BinOp::And),
        Token::Less => (3, false, BinOp::Less),
        Token::Greater => (3, false, BinOp::Greater),
        Token::LessEq => (3, false, BinOp::LessEq),
        Token::GreaterEq => (3, false, BinOp::GreaterEq),
        Token::NotEq => (3, false, BinOp::NotEq),
        Token::Eq => (3, false, BinOp::Eq),
        Token::Pipe => (4, false, BinOp::BOr),
        Token::Tilde => (5, false, BinOp::BXor),
        Token::Amp => (6, false, BinOp::BAnd),
        Token::Shl => (7, false, BinOp::Shl),
        Token::Shr => (7, false, BinOp::Shr),
        Token::Concat => (8, true, BinOp::Concat),
        Token::Plus => (9, false, BinOp::Add),
        Token::Minus => (9, false, BinOp::Sub),
        Token::Star => (10, false, BinOp::Mul),
        Token::Slash => (10, false, BinOp::Div),
        Token::DoubleSlash => (10, false, BinOp::IDiv),
        Token::Percent => (10, false, BinOp::Mod),
        Token::Caret => (12, true, BinOp::Pow),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Block {
        parse(source).unwrap()
    }

    #[test]
    fn test_local_statement() {
        let block = parse_ok("local x, y = 1, 2");
        assert_eq!(block.stmts.len(), 1);
        match &block.stmts[0] {
            Stmt::Local { names, values, .. } => {
                assert_eq!(names, &["x", "y"]);
                assert_eq!(values.len(), 2);
            }
            other => panic!("expected local, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let block = parse_ok("return 1 + 2 * 3");
        match &block.stmts[0] {
            Stmt::Return { values, .. } => match &values[0] {
                Expr::Binary { op: BinOp::Add, rhs, .. } => {
                    assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
                }
                other => panic!("expected add at root, got {:?}", other),
            },
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_concat_right_assoc() {
        // a .. b .. c parses as a .. (b .. c)
        let block = parse_ok("return 'a' .. 'b' .. 'c'");
        match &block.stmts[0] {
            Stmt::Return { values, .. } => match &values[0] {
                Expr::Binary { op: BinOp::Concat, rhs, .. } => {
                    assert!(matches!(**rhs, Expr::Binary { op: BinOp::Concat, .. }));
                }
                other => panic!("expected concat at root, got {:?}", other),
            },
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_unary_binds_below_pow() {
        // -2^2 parses as -(2^2)
        let block = parse_ok("return -2^2");
        match &block.stmts[0] {
            Stmt::Return { values, .. } => match &values[0] {
                Expr::Unary { op: UnOp::Neg, operand, .. } => {
                    assert!(matches!(**operand, Expr::Binary { op: BinOp::Pow, .. }));
                }
                other => panic!("expected unary minus at root, got {:?}", other),
            },
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_method_definition_gets_self() {
        let block = parse_ok("function t:greet(name) end");
        match &block.stmts[0] {
            Stmt::Assign { values, .. } => match &values[0] {
                Expr::Function { params, .. } => {
                    assert_eq!(params, &["self", "name"]);
                }
                other => panic!("expected function, got {:?}", other),
            },
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_table_constructor_fields() {
        let block = parse_ok("return {1, x = 2, [3] = 4}");
        match &block.stmts[0] {
            Stmt::Return { values, .. } => match &values[0] {
                Expr::Table { fields, .. } => {
                    assert!(fields[0].0.is_none());
                    assert!(matches!(fields[1].0, Some(Expr::Str { .. })));
                    assert!(matches!(fields[2].0, Some(Expr::Int { .. })));
                }
                other => panic!("expected table, got {:?}", other),
            },
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_call_shorthand_args() {
        assert!(parse("f'lit'").is_ok());
        assert!(parse("f{1, 2}").is_ok());
    }

    #[test]
    fn test_return_must_close_block() {
        assert!(parse("return 1 print(2)").is_err());
        assert!(parse("do return 1 end print(2)").is_ok());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("if then end").is_err());
        assert!(parse("while do end").is_err());
        assert!(parse("local 1 = 2").is_err());
        assert!(parse("x +").is_err());
        assert!(parse("f(").is_err());
        assert!(parse("end").is_err());
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let src = format!("return {}1{}", "(".repeat(500), ")".repeat(500));
        match parse(&src) {
            Err(LuaError::Syntax(_)) => {}
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_goto_rejected() {
        assert!(parse("goto out").is_err());
        assert!(parse("::out::").is_err());
    }
}
