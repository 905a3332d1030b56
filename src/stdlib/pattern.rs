//! Lua pattern matching engine.
//!
//! A byte-oriented matcher implementing the full pattern language:
//! character classes (`%a`, `%d`, ...), sets with ranges and negation,
//! the `*`, `+`, `-`, `?` quantifiers, anchors, ordinary and position
//! captures, back-references, `%b` balanced matches and `%f` frontier
//! patterns. Backtracking depth is bounded so hostile patterns fail
//! instead of exhausting the native stack.

/// Most captures one pattern may define
pub const MAX_CAPTURES: usize = 32;

/// Backtracking recursion bound
const MAX_MATCH_DEPTH: usize = 220;

const CAP_UNFINISHED: isize = -1;
const CAP_POSITION: isize = -2;

/// One capture of a successful match
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    /// Byte range `[start, end)` in the subject
    Span(usize, usize),
    /// A `()` position capture, already 1-based
    Position(usize),
}

/// A successful match: byte range plus captures (empty when the
/// pattern had no parentheses)
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Capture>,
}

struct MatchState<'a> {
    src: &'a [u8],
    pat: &'a [u8],
    level: usize,
    capture: [(usize, isize); MAX_CAPTURES],
    depth: usize,
}

type Outcome = Result<Option<usize>, String>;

/// Search for `pat` in `src` starting at byte offset `init`,
/// honoring a leading `^` anchor.
pub fn match_pattern(
    src: &[u8],
    pat: &[u8],
    init: usize,
) -> Result<Option<MatchResult>, String> {
    let anchored = pat.first() == Some(&b'^');
    let p0 = if anchored { 1 } else { 0 };
    let mut s = init;
    loop {
        let mut ms = MatchState {
            src,
            pat,
            level: 0,
            capture: [(0, 0); MAX_CAPTURES],
            depth: 0,
        };
        if let Some(end) = ms.do_match(s, p0)? {
            let captures = ms.collect_captures()?;
            return Ok(Some(MatchResult {
                start: s,
                end,
                captures,
            }));
        }
        if anchored || s >= src.len() {
            return Ok(None);
        }
        s += 1;
    }
}

/// Does the character class `cl` accept byte `c`?
fn match_class(c: u8, cl: u8) -> bool {
    let res = match cl.to_ascii_lowercase() {
        b'a' => c.is_ascii_alphabetic(),
        b'c' => c.is_ascii_control(),
        b'd' => c.is_ascii_digit(),
        b'g' => c.is_ascii_graphic(),
        b'l' => c.is_ascii_lowercase(),
        b'p' => c.is_ascii_punctuation(),
        b's' => matches!(c, b' ' | 0x09..=0x0d),
        b'u' => c.is_ascii_uppercase(),
        b'w' => c.is_ascii_alphanumeric(),
        b'x' => c.is_ascii_hexdigit(),
        _ => return c == cl,
    };
    if cl.is_ascii_uppercase() {
        !res
    } else {
        res
    }
}

impl<'a> MatchState<'a> {
    fn collect_captures(&self) -> Result<Vec<Capture>, String> {
        let mut out = Vec::with_capacity(self.level);
        for (start, len) in &self.capture[..self.level] {
            match *len {
                CAP_POSITION => out.push(Capture::Position(start + 1)),
                CAP_UNFINISHED => return Err("unfinished capture".to_string()),
                n => out.push(Capture::Span(*start, start + n as usize)),
            }
        }
        Ok(out)
    }

    /// Index just past one pattern item starting at `p`
    fn class_end(&self, mut p: usize) -> Result<usize, String> {
        let c = self.pat[p];
        p += 1;
        if c == b'%' {
            if p >= self.pat.len() {
                return Err("malformed pattern (ends with '%')".to_string());
            }
            return Ok(p + 1);
        }
        if c == b'[' {
            if p < self.pat.len() && self.pat[p] == b'^' {
                p += 1;
            }
            loop {
                if p >= self.pat.len() {
                    return Err("malformed pattern (missing ']')".to_string());
                }
                let cc = self.pat[p];
                p += 1;
                if cc == b'%' {
                    if p >= self.pat.len() {
                        return Err("malformed pattern (ends with '%')".to_string());
                    }
                    p += 1;
                }
                if p < self.pat.len() && self.pat[p] == b']' {
                    return Ok(p + 1);
                }
            }
        }
        Ok(p)
    }

    /// Does the set starting at `p` (the '[') accept `c`? `ec` is the
    /// index of the closing ']'.
    fn match_set(&self, c: u8, p: usize, ec: usize) -> bool {
        let mut accept = true;
        let mut p = p + 1;
        if p < ec && self.pat[p] == b'^' {
            accept = false;
            p += 1;
        }
        while p < ec {
            if self.pat[p] == b'%' {
                p += 1;
                if match_class(c, self.pat[p]) {
                    return accept;
                }
            } else if p + 2 < ec && self.pat[p + 1] == b'-' {
                if self.pat[p] <= c && c <= self.pat[p + 2] {
                    return accept;
                }
                p += 2;
            } else if self.pat[p] == c {
                return accept;
            }
            p += 1;
        }
        !accept
    }

    /// One pattern item (`[p, ep)`) against the byte at `s`
    fn single_match(&self, s: usize, p: usize, ep: usize) -> bool {
        if s >= self.src.len() {
            return false;
        }
        let c = self.src[s];
        match self.pat[p] {
            b'.' => true,
            b'%' => match_class(c, self.pat[p + 1]),
            b'[' => self.match_set(c, p, ep - 1),
            literal => literal == c,
        }
    }

    fn do_match(&mut self, s: usize, p: usize) -> Outcome {
        self.depth += 1;
        if self.depth > MAX_MATCH_DEPTH {
            self.depth -= 1;
            return Err("pattern too complex".to_string());
        }
        let result = self.do_match_inner(s, p);
        self.depth -= 1;
        result
    }

    fn do_match_inner(&mut self, mut s: usize, mut p: usize) -> Outcome {
        loop {
            if p >= self.pat.len() {
                return Ok(Some(s));
            }
            match self.pat[p] {
                b'(' => {
                    return if p + 1 < self.pat.len() && self.pat[p + 1] == b')' {
                        self.start_capture(s, p + 2, CAP_POSITION)
                    } else {
                        self.start_capture(s, p + 1, CAP_UNFINISHED)
                    };
                }
                b')' => return self.end_capture(s, p + 1),
                b'$' if p + 1 == self.pat.len() => {
                    return Ok(if s == self.src.len() { Some(s) } else { None });
                }
                b'%' if p + 1 < self.pat.len() => match self.pat[p + 1] {
                    b'b' => match self.match_balance(s, p + 2)? {
                        Some(next) => {
                            s = next;
                            p += 4;
                            continue;
                        }
                        None => return Ok(None),
                    },
                    b'f' => {
                        p += 2;
                        if p >= self.pat.len() || self.pat[p] != b'[' {
                            return Err("missing '[' after '%f' in pattern".to_string());
                        }
                        let ep = self.class_end(p)?;
                        let prev = if s == 0 { 0 } else { self.src[s - 1] };
                        let cur = if s < self.src.len() { self.src[s] } else { 0 };
                        if !self.match_set(prev, p, ep - 1) && self.match_set(cur, p, ep - 1) {
                            p = ep;
                            continue;
                        }
                        return Ok(None);
                    }
                    d @ b'0'..=b'9' => match self.match_capture(s, d)? {
                        Some(next) => {
                            s = next;
                            p += 2;
                            continue;
                        }
                        None => return Ok(None),
                    },
                    _ => return self.match_default(s, p),
                },
                _ => return self.match_default(s, p),
            }
        }
    }

    /// An ordinary item possibly followed by a quantifier
    fn match_default(&mut self, s: usize, p: usize) -> Outcome {
        let ep = self.class_end(p)?;
        let matched = self.single_match(s, p, ep);
        match self.pat.get(ep) {
            Some(b'?') => {
                if matched {
                    if let Some(r) = self.do_match(s + 1, ep + 1)? {
                        return Ok(Some(r));
                    }
                }
                self.do_match(s, ep + 1)
            }
            Some(b'+') => {
                if matched {
                    self.max_expand(s + 1, p, ep)
                } else {
                    Ok(None)
                }
            }
            Some(b'*') => self.max_expand(s, p, ep),
            Some(b'-') => self.min_expand(s, p, ep),
            _ => {
                if matched {
                    self.do_match(s + 1, ep)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Greedy repetition: longest run first, then backtrack
    fn max_expand(&mut self, s: usize, p: usize, ep: usize) -> Outcome {
        let mut count = 0;
        while self.single_match(s + count, p, ep) {
            count += 1;
        }
        loop {
            if let Some(r) = self.do_match(s + count, ep + 1)? {
                return Ok(Some(r));
            }
            if count == 0 {
                return Ok(None);
            }
            count -= 1;
        }
    }

    /// Lazy repetition: shortest run first, then grow
    fn min_expand(&mut self, mut s: usize, p: usize, ep: usize) -> Outcome {
        loop {
            if let Some(r) = self.do_match(s, ep + 1)? {
                return Ok(Some(r));
            }
            if self.single_match(s, p, ep) {
                s += 1;
            } else {
                return Ok(None);
            }
        }
    }

    fn start_capture(&mut self, s: usize, p: usize, what: isize) -> Outcome {
        if self.level >= MAX_CAPTURES {
            return Err("too many captures".to_string());
        }
        self.capture[self.level] = (s, what);
        self.level += 1;
        let result = self.do_match(s, p)?;
        if result.is_none() {
            self.level -= 1;
        }
        Ok(result)
    }

    fn end_capture(&mut self, s: usize, p: usize) -> Outcome {
        let l = self.capture_to_close()?;
        self.capture[l].1 = (s - self.capture[l].0) as isize;
        let result = self.do_match(s, p)?;
        if result.is_none() {
            self.capture[l].1 = CAP_UNFINISHED;
        }
        Ok(result)
    }

    fn capture_to_close(&self) -> Result<usize, String> {
        for l in (0..self.level).rev() {
            if self.capture[l].1 == CAP_UNFINISHED {
                return Ok(l);
            }
        }
        Err("invalid pattern capture".to_string())
    }

    /// `%b xy`: balanced run starting with x, ending with its matching y
    fn match_balance(&mut self, s: usize, p: usize) -> Outcome {
        if p + 1 >= self.pat.len() {
            return Err("missing arguments to '%b'".to_string());
        }
        if s >= self.src.len() || self.src[s] != self.pat[p] {
            return Ok(None);
        }
        let (open, close) = (self.pat[p], self.pat[p + 1]);
        let mut balance = 1;
        let mut i = s + 1;
        while i < self.src.len() {
            if self.src[i] == close {
                balance -= 1;
                if balance == 0 {
                    return Ok(Some(i + 1));
                }
            } else if self.src[i] == open {
                balance += 1;
            }
            i += 1;
        }
        Ok(None)
    }

    /// `%1`..`%9`: the text of a finished capture must repeat here
    fn match_capture(&mut self, s: usize, digit: u8) -> Outcome {
        let index = (digit as i64) - (b'1' as i64);
        if index < 0 || index as usize >= self.level {
            return Err(format!("invalid capture index %{}", digit as char));
        }
        let (start, len) = self.capture[index as usize];
        if len < 0 {
            return Err(format!("invalid capture index %{}", digit as char));
        }
        let len = len as usize;
        if self.src.len() - s >= len && self.src[start..start + len] == self.src[s..s + len] {
            Ok(Some(s + len))
        } else {
            Ok(None)
        }
    }
}
