//! Lua Lexer Module
//!
//! Converts Lua source text into a token stream for the parser. Handles
//! decimal/hex numeric literals (including exponent and hex-float forms),
//! short strings with the full escape set, level-matched long brackets for
//! long strings and comments, and every multi-character operator.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

use crate::error::{LuaError, LuaResult};

/// Token type representing all lexical tokens
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    And, Break, Do, Else, ElseIf, End,
    False, For, Function, Goto, If, In,
    Local, Nil, Not, Or, Repeat, Return,
    Then, True, Until, While,

    // Operators
    Plus, Minus, Star, Slash, DoubleSlash, Percent, Caret,
    Hash, Amp, Tilde, Pipe, Shl, Shr,
    Eq, NotEq, Less, LessEq, Greater, GreaterEq,
    Assign, Concat,

    // Punctuation
    LeftParen, RightParen,
    LeftBrace, RightBrace,
    LeftBracket, RightBracket,
    Semicolon, Colon, DoubleColon, Comma, Dot, Ellipsis,

    // Literals
    Int(i64),
    Float(f64),
    Str(String),

    // Identifiers
    Name(String),

    // End of input
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::And => write!(f, "and"),
            Token::Break => write!(f, "break"),
            Token::Do => write!(f, "do"),
            Token::Else => write!(f, "else"),
            Token::ElseIf => write!(f, "elseif"),
            Token::End => write!(f, "end"),
            Token::False => write!(f, "false"),
            Token::For => write!(f, "for"),
            Token::Function => write!(f, "function"),
            Token::Goto => write!(f, "goto"),
            Token::If => write!(f, "if"),
            Token::In => write!(f, "in"),
            Token::Local => write!(f, "local"),
            Token::Nil => write!(f, "nil"),
            Token::Not => write!(f, "not"),
            Token::Or => write!(f, "or"),
            Token::Repeat => write!(f, "repeat"),
            Token::Return => write!(f, "return"),
            Token::Then => write!(f, "then"),
            Token::True => write!(f, "true"),
            Token::Until => write!(f, "until"),
            Token::While => write!(f, "while"),

            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::DoubleSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::Caret => write!(f, "^"),
            Token::Hash => write!(f, "#"),
            Token::Amp => write!(f, "&"),
            Token::Tilde => write!(f, "~"),
            Token::Pipe => write!(f, "|"),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::Eq => write!(f, "=="),
            Token::NotEq => write!(f, "~="),
            Token::Less => write!(f, "<"),
            Token::LessEq => write!(f, "<="),
            Token::Greater => write!(f, ">"),
            Token::GreaterEq => write!(f, ">="),
            Token::Assign => write!(f, "="),
            Token::Concat => write!(f, ".."),

            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBrace => write!(f, "{{"),
            Token::RightBrace => write!(f, "}}"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::DoubleColon => write!(f, "::"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Ellipsis => write!(f, "..."),

            Token::Int(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "\"{}\"", s.escape_debug()),
            Token::Name(s) => write!(f, "{}", s),

            Token::Eof => write!(f, "<eof>"),
        }
    }
}

lazy_static! {
    static ref KEYWORDS: HashMap<&'static str, Token> = {
        let mut m = HashMap::new();
        m.insert("and", Token::And);
        m.insert("break", Token::Break);
        m.insert("do", Token::Do);
        m.insert("else", Token::Else);
        m.insert("elseif", Token::ElseIf);
        m.insert("end", Token::End);
        m.insert("false", Token::False);
        m.insert("for", Token::For);
        m.insert("function", Token::Function);
        m.insert("goto", Token::Goto);
        m.insert("if", Token::If);
        m.insert("in", Token::In);
        m.insert("local", Token::Local);
        m.insert("nil", Token::Nil);
        m.insert("not", Token::Not);
        m.insert("or", Token::Or);
        m.insert("repeat", Token::Repeat);
        m.insert("return", Token::Return);
        m.insert("then", Token::Then);
        m.insert("true", Token::True);
        m.insert("until", Token::Until);
        m.insert("while", Token::While);
        m
    };
}

/// Token with source position
#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

/// Lexer for Lua source code
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.current() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> LuaResult<T> {
        Err(LuaError::syntax(message, self.line, self.column))
    }

    fn skip_whitespace_and_comments(&mut self) -> LuaResult<()> {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('-') if self.peek() == Some('-') => {
                    self.advance();
                    self.advance();
                    if self.current() == Some('[') {
                        if let Some(level) = self.long_bracket_level() {
                            self.read_long_string(level)?;
                            continue;
                        }
                    }
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Check for a `[=*[` opener at the current position without consuming it.
    /// Returns the level (number of `=` signs) if present.
    fn long_bracket_level(&self) -> Option<usize> {
        if self.current() != Some('[') {
            return None;
        }
        let mut level = 0;
        while self.chars.get(self.pos + 1 + level) == Some(&'=') {
            level += 1;
        }
        if self.chars.get(self.pos + 1 + level) == Some(&'[') {
            Some(level)
        } else {
            None
        }
    }

    fn read_long_string(&mut self, level: usize) -> LuaResult<String> {
        // skip [=*[
        for _ in 0..level + 2 {
            self.advance();
        }
        // an immediate newline is not part of the string
        if self.current() == Some('\r') {
            self.advance();
            self.matches('\n');
        } else if self.current() == Some('\n') {
            self.advance();
        }

        let mut buf = String::new();
        loop {
            match self.current() {
                None => return self.error("unfinished long string"),
                Some(']') => {
                    let mut count = 0;
                    while self.chars.get(self.pos + 1 + count) == Some(&'=') {
                        count += 1;
                    }
                    if count == level && self.chars.get(self.pos + 1 + count) == Some(&']') {
                        for _ in 0..level + 2 {
                            self.advance();
                        }
                        return Ok(buf);
                    }
                    buf.push(']');
                    self.advance();
                }
                Some(c) => {
                    buf.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_string(&mut self, quote: char) -> LuaResult<String> {
        self.advance(); // opening quote
        let mut buf = String::new();
        loop {
            match self.current() {
                None => return self.error("unfinished string"),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(buf);
                }
                Some('\n') | Some('\r') => return self.error("unfinished string"),
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('a') => { buf.push('\u{07}'); self.advance(); }
                        Some('b') => { buf.push('\u{08}'); self.advance(); }
                        Some('f') => { buf.push('\u{0C}'); self.advance(); }
                        Some('n') => { buf.push('\n'); self.advance(); }
                        Some('r') => { buf.push('\r'); self.advance(); }
                        Some('t') => { buf.push('\t'); self.advance(); }
                        Some('v') => { buf.push('\u{0B}'); self.advance(); }
                        Some('\\') => { buf.push('\\'); self.advance(); }
                        Some('\'') => { buf.push('\''); self.advance(); }
                        Some('"') => { buf.push('"'); self.advance(); }
                        Some('\n') => { buf.push('\n'); self.advance(); }
                        Some('\r') => {
                            self.advance();
                            self.matches('\n');
                            buf.push('\n');
                        }
                        Some('x') => {
                            self.advance();
                            let mut value: u32 = 0;
                            for _ in 0..2 {
                                match self.current().and_then(|c| c.to_digit(16)) {
                                    Some(d) => {
                                        value = value * 16 + d;
                                        self.advance();
                                    }
                                    None => return self.error("hexadecimal digit expected"),
                                }
                            }
                            buf.push(char::from(value as u8));
                        }
                        Some('u') => {
                            self.advance();
                            if !self.matches('{') {
                                return self.error("missing '{' in \\u{xxxx}");
                            }
                            let mut value: u32 = 0;
                            let mut digits = 0;
                            while let Some(d) = self.current().and_then(|c| c.to_digit(16)) {
                                value = value.saturating_mul(16).saturating_add(d);
                                digits += 1;
                                self.advance();
                            }
                            if digits == 0 || !self.matches('}') {
                                return self.error("missing '}' in \\u{xxxx}");
                            }
                            match char::from_u32(value) {
                                Some(c) => buf.push(c),
                                None => return self.error("UTF-8 value too large"),
                            }
                        }
                        Some('z') => {
                            self.advance();
                            while let Some(c) = self.current() {
                                if !c.is_whitespace() {
                                    break;
                                }
                                self.advance();
                            }
                        }
                        Some(c) if c.is_ascii_digit() => {
                            let mut value: u32 = 0;
                            for _ in 0..3 {
                                match self.current() {
                                    Some(d) if d.is_ascii_digit() => {
                                        value = value * 10 + d.to_digit(10).unwrap();
                                        self.advance();
                                    }
                                    _ => break,
                                }
                            }
                            if value > 255 {
                                return self.error("decimal escape too large");
                            }
                            buf.push(char::from(value as u8));
                        }
                        Some(c) => {
                            return self.error(format!("invalid escape sequence '\\{}'", c));
                        }
                        None => return self.error("unfinished string"),
                    }
                }
                Some(c) => {
                    buf.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_number(&mut self) -> LuaResult<Token> {
        let start = self.pos;
        let mut is_float = false;

        if self.current() == Some('0') && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            if !matches!(self.current(), Some(c) if c.is_ascii_hexdigit()) {
                return self.error("malformed number");
            }
            while matches!(self.current(), Some(c) if c.is_ascii_hexdigit()) {
                self.advance();
            }
            if self.current() == Some('.') {
                is_float = true;
                self.advance();
                while matches!(self.current(), Some(c) if c.is_ascii_hexdigit()) {
                    self.advance();
                }
            }
            if matches!(self.current(), Some('p') | Some('P')) {
                is_float = true;
                self.advance();
                if matches!(self.current(), Some('+') | Some('-')) {
                    self.advance();
                }
                if !matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                    return self.error("malformed number");
                }
                while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            }
        } else {
            while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
            if self.current() == Some('.') && self.peek() != Some('.') {
                is_float = true;
                self.advance();
                while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            }
            if matches!(self.current(), Some('e') | Some('E')) {
                is_float = true;
                self.advance();
                if matches!(self.current(), Some('+') | Some('-')) {
                    self.advance();
                }
                if !matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                    return self.error("malformed number");
                }
                while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        parse_number_literal(&text, is_float)
            .ok_or_else(|| LuaError::syntax(format!("malformed number near '{}'", text), self.line, self.column))
    }

    fn read_name(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.current(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match KEYWORDS.get(word.as_str()) {
            Some(tok) => tok.clone(),
            None => Token::Name(word),
        }
    }

    /// Produce the next token
    pub fn next_token(&mut self) -> LuaResult<SpannedToken> {
        self.skip_whitespace_and_comments()?;

        let line = self.line;
        let column = self.column;
        let spanned = |token| SpannedToken { token, line, column };

        let c = match self.current() {
            None => return Ok(spanned(Token::Eof)),
            Some(c) => c,
        };

        if c == '[' {
            if let Some(level) = self.long_bracket_level() {
                let s = self.read_long_string(level)?;
                return Ok(spanned(Token::Str(s)));
            }
        }

        if c == '"' || c == '\'' {
            let s = self.read_string(c)?;
            return Ok(spanned(Token::Str(s)));
        }

        if c.is_ascii_digit() || (c == '.' && matches!(self.peek(), Some(d) if d.is_ascii_digit())) {
            let tok = self.read_number()?;
            return Ok(spanned(tok));
        }

        if c.is_alphabetic() || c == '_' {
            let tok = self.read_name();
            return Ok(spanned(tok));
        }

        self.advance();
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '%' => Token::Percent,
            '^' => Token::Caret,
            '#' => Token::Hash,
            '&' => Token::Amp,
            '|' => Token::Pipe,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '{' => Token::LeftBrace,
            '}' => Token::RightBrace,
            '[' => Token::LeftBracket,
            ']' => Token::RightBracket,
            ';' => Token::Semicolon,
            ',' => Token::Comma,
            '/' => {
                if self.matches('/') {
                    Token::DoubleSlash
                } else {
                    Token::Slash
                }
            }
            '=' => {
                if self.matches('=') {
                    Token::Eq
                } else {
                    Token::Assign
                }
            }
            '~' => {
                if self.matches('=') {
                    Token::NotEq
                } else {
                    Token::Tilde
                }
            }
            '<' => {
                if self.matches('=') {
                    Token::LessEq
                } else if self.matches('<') {
                    Token::Shl
                } else {
                    Token::Less
                }
            }
            '>' => {
                if self.matches('=') {
                    Token::GreaterEq
                } else if self.matches('>') {
                    Token::Shr
                } else {
                    Token::Greater
                }
            }
            ':' => {
                if self.matches(':') {
                    Token::DoubleColon
                } else {
                    Token::Colon
                }
            }
            '.' => {
                if self.matches('.') {
                    if self.matches('.') {
                        Token::Ellipsis
                    } else {
                        Token::Concat
                    }
                } else {
                    Token::Dot
                }
            }
            c => {
                return Err(LuaError::syntax(
                    format!("unexpected character '{}'", c),
                    line,
                    column,
                ))
            }
        };

        Ok(spanned(token))
    }

    /// Consume the whole source into a token vector ending with Eof
    pub fn tokenize(mut self) -> LuaResult<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.token == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }
}

/// Parse a numeric literal's text into an Int or Float token.
/// Decimal integers that overflow i64 fall back to float; hex integers
/// wrap modulo 2^64 like Lua's.
pub(crate) fn parse_number_literal(text: &str, is_float: bool) -> Option<Token> {
    let lower = text.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        if is_float {
            return parse_hex_float(hex).map(Token::Float);
        }
        let mut value: u64 = 0;
        for c in hex.chars() {
            value = value.wrapping_mul(16).wrapping_add(c.to_digit(16)? as u64);
        }
        return Some(Token::Int(value as i64));
    }
    if is_float {
        return lower.parse::<f64>().ok().map(Token::Float);
    }
    match lower.parse::<i64>() {
        Ok(n) => Some(Token::Int(n)),
        // out-of-range decimal integers become floats
        Err(_) => lower.parse::<f64>().ok().map(Token::Float),
    }
}

/// Parse the part after "0x" of a hex float: digits[.digits][p[+-]digits]
fn parse_hex_float(text: &str) -> Option<f64> {
    let (mantissa_text, exp) = match text.split_once('p') {
        Some((m, e)) => (m, e.parse::<i32>().ok()?),
        None => (text, 0),
    };
    let (int_part, frac_part) = match mantissa_text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa_text, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let mut value = 0.0f64;
    for c in int_part.chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        value += c.to_digit(16)? as f64 * scale;
        scale /= 16.0;
    }
    Some(value * 2f64.powi(exp))
}

/// Tokenize a source string
pub fn tokenize(source: &str) -> LuaResult<Vec<SpannedToken>> {
    Lexer::new(source).tokenize()
}
