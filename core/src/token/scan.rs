//! The scanner proper.

use crate::val::int::Int;

use super::{Position, SyntaxError, TokSpan, Token};

/// Keywords that are reserved for future use and rejected outright.
const RESERVED: &[&str] = &[
    "as", "assert", "class", "del", "except", "finally", "from", "global", "import", "is",
    "nonlocal", "raise", "try", "with", "yield",
];

/// Scan `src` into a token vector ending in `Eof`.
pub fn tokenize(src: &str) -> Result<Vec<TokSpan>, SyntaxError> {
    let mut s = Scanner::new(src.as_bytes());
    s.run()?;
    Ok(s.out)
}

struct Scanner<'a> {
    src: &'a [u8],
    off: usize,
    line: u32,
    col: u32,
    depth: usize, // bracket nesting; newlines are insignificant inside
    indents: Vec<u32>,
    fresh_line: bool,
    out: Vec<TokSpan>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a [u8]) -> Self {
        Scanner {
            src,
            off: 0,
            line: 1,
            col: 1,
            depth: 0,
            indents: vec![0],
            fresh_line: true,
            out: Vec::new(),
        }
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.off).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.src.get(self.off + n).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.off += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn emit(&mut self, pos: Position, tok: Token) {
        self.out.push(TokSpan { tok, pos });
    }

    fn err<T>(&self, pos: Position, msg: impl Into<String>) -> Result<T, SyntaxError> {
        Err(SyntaxError::new(pos, msg))
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        loop {
            if self.fresh_line && self.depth == 0 {
                self.handle_indent()?;
                if self.off >= self.src.len() {
                    break;
                }
            }
            let Some(b) = self.peek() else { break };
            match b {
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                }
                b'#' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                b'\n' => {
                    let pos = self.pos();
                    self.bump();
                    if self.depth == 0 {
                        self.emit(pos, Token::Newline);
                        self.fresh_line = true;
                    }
                }
                b'\'' | b'"' => self.scan_string(false, false)?,
                b'0'..=b'9' => self.scan_number()?,
                b'.' => {
                    let pos = self.pos();
                    if matches!(self.peek_at(1), Some(b'0'..=b'9')) {
                        self.scan_number()?;
                    } else {
                        self.bump();
                        self.emit(pos, Token::Dot);
                    }
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_word()?,
                _ => self.scan_punct()?,
            }
        }
        // Close out the final logical line and any open suites.
        let pos = self.pos();
        if !self.fresh_line && self.depth == 0 {
            self.emit(pos, Token::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.emit(pos, Token::Outdent);
        }
        self.emit(pos, Token::Eof);
        Ok(())
    }

    /// Measure leading whitespace of a fresh logical line and emit
    /// Indent/Outdent tokens. Blank and comment-only lines produce nothing.
    fn handle_indent(&mut self) -> Result<(), SyntaxError> {
        loop {
            let mut width: u32 = 0;
            loop {
                match self.peek() {
                    Some(b' ') => {
                        width += 1;
                        self.bump();
                    }
                    Some(b'\t') => {
                        width = (width / 8 + 1) * 8;
                        self.bump();
                    }
                    Some(b'\r') => {
                        self.bump();
                    }
                    _ => break,
                }
            }
            match self.peek() {
                // Blank line: no tokens, keep scanning lines.
                Some(b'\n') => {
                    self.bump();
                    continue;
                }
                // Comment-only line.
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                    continue;
                }
                None => {
                    self.fresh_line = true;
                    return Ok(());
                }
                _ => {
                    let pos = self.pos();
                    let cur = *self.indents.last().unwrap_or(&0);
                    if width > cur {
                        self.indents.push(width);
                        self.emit(pos, Token::Indent);
                    } else if width < cur {
                        while width < *self.indents.last().unwrap_or(&0) {
                            self.indents.pop();
                            self.emit(pos, Token::Outdent);
                        }
                        if width != *self.indents.last().unwrap_or(&0) {
                            return self
                                .err(pos, "unindent does not match any outer indentation level");
                        }
                    }
                    self.fresh_line = false;
                    return Ok(());
                }
            }
        }
    }

    fn scan_word(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        let start = self.off;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        let word = std::str::from_utf8(&self.src[start..self.off]).expect("ascii word");
        // String prefixes bind tighter than identifiers.
        if matches!(word, "r" | "b" | "rb" | "br") {
            if matches!(self.peek(), Some(b'\'') | Some(b'"')) {
                let raw = word.contains('r');
                let bytes = word.contains('b');
                return self.scan_string_at(pos, raw, bytes);
            }
        }
        let tok = match word {
            "and" => Token::And,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "def" => Token::Def,
            "elif" => Token::Elif,
            "else" => Token::Else,
            "for" => Token::For,
            "if" => Token::If,
            "in" => Token::In,
            "lambda" => Token::Lambda,
            "load" => Token::Load,
            "not" => Token::Not,
            "or" => Token::Or,
            "pass" => Token::Pass,
            "return" => Token::Return,
            "while" => Token::While,
            "None" => Token::NoneKw,
            "True" => Token::TrueKw,
            "False" => Token::FalseKw,
            _ => {
                if RESERVED.contains(&word) {
                    return self.err(pos, format!("keyword {} is reserved", word));
                }
                Token::Ident(word.to_string())
            }
        };
        self.emit(pos, tok);
        Ok(())
    }

    fn scan_number(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        let start = self.off;
        if self.peek() == Some(b'0')
            && matches!(
                self.peek_at(1),
                Some(b'x') | Some(b'X') | Some(b'o') | Some(b'O') | Some(b'b') | Some(b'B')
            )
        {
            self.bump();
            let radix = match self.bump() {
                Some(b'x') | Some(b'X') => 16,
                Some(b'o') | Some(b'O') => 8,
                _ => 2,
            };
            let digits_start = self.off;
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() {
                    self.bump();
                } else {
                    break;
                }
            }
            let digits = std::str::from_utf8(&self.src[digits_start..self.off]).expect("ascii");
            if digits.is_empty() {
                return self.err(pos, "invalid integer literal");
            }
            return match Int::from_str_radix(digits, radix) {
                Ok(v) => {
                    self.emit(pos, Token::Int(v));
                    Ok(())
                }
                Err(_) => self.err(pos, "invalid integer literal"),
            };
        }

        let mut is_float = false;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        if self.peek() == Some(b'.') && !matches!(self.peek_at(1), Some(b'.')) {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mut n = 1;
            if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
                n = 2;
            }
            if matches!(self.peek_at(n), Some(b'0'..=b'9')) {
                is_float = true;
                for _ in 0..=n {
                    self.bump();
                }
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.bump();
                }
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.off]).expect("ascii number");
        if is_float {
            match text.parse::<f64>() {
                Ok(f) => self.emit(pos, Token::Float(f)),
                Err(_) => return self.err(pos, "invalid float literal"),
            }
        } else {
            if text.len() > 1 && text.starts_with('0') {
                return self.err(pos, "obsolete form of octal literal; use 0o...");
            }
            match Int::from_str_radix(text, 10) {
                Ok(v) => self.emit(pos, Token::Int(v)),
                Err(_) => return self.err(pos, "invalid integer literal"),
            }
        }
        Ok(())
    }

    fn scan_string(&mut self, raw: bool, bytes: bool) -> Result<(), SyntaxError> {
        let pos = self.pos();
        self.scan_string_at(pos, raw, bytes)
    }

    fn scan_string_at(&mut self, pos: Position, raw: bool, bytes: bool) -> Result<(), SyntaxError> {
        let quote = self.bump().expect("quote");
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                return self.err(pos, "unterminated string literal");
            };
            if c == quote {
                if triple {
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.bump();
                        self.bump();
                        self.bump();
                        break;
                    }
                    self.bump();
                    buf.push(c);
                    continue;
                }
                self.bump();
                break;
            }
            if c == b'\n' && !triple {
                return self.err(pos, "unterminated string literal");
            }
            if c == b'\\' {
                self.bump();
                if raw {
                    buf.push(b'\\');
                    if let Some(next) = self.bump() {
                        buf.push(next);
                    }
                    continue;
                }
                self.scan_escape(pos, &mut buf)?;
                continue;
            }
            self.bump();
            buf.push(c);
        }
        let tok = if bytes { Token::Bytes(buf) } else { Token::Str(buf) };
        self.emit(pos, tok);
        Ok(())
    }

    fn scan_escape(&mut self, strpos: Position, buf: &mut Vec<u8>) -> Result<(), SyntaxError> {
        let pos = self.pos();
        let Some(c) = self.bump() else {
            return self.err(strpos, "unterminated string literal");
        };
        match c {
            b'a' => buf.push(0x07),
            b'b' => buf.push(0x08),
            b'f' => buf.push(0x0c),
            b'n' => buf.push(b'\n'),
            b'r' => buf.push(b'\r'),
            b't' => buf.push(b'\t'),
            b'v' => buf.push(0x0b),
            b'\\' => buf.push(b'\\'),
            b'\'' => buf.push(b'\''),
            b'"' => buf.push(b'"'),
            b'\n' => {} // escaped newline: spliced out
            b'0'..=b'7' => {
                let mut v = (c - b'0') as u32;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            v = v * 8 + (d - b'0') as u32;
                            self.bump();
                        }
                        _ => break,
                    }
                }
                if v > 0xff {
                    return self.err(pos, "octal escape value out of range");
                }
                buf.push(v as u8);
            }
            b'x' => {
                let v = self.hex_digits(pos, 2)?;
                buf.push(v as u8);
            }
            b'u' => {
                let v = self.hex_digits(pos, 4)?;
                self.push_char(pos, v, buf)?;
            }
            b'U' => {
                let v = self.hex_digits(pos, 8)?;
                self.push_char(pos, v, buf)?;
            }
            other => {
                return self.err(pos, format!("invalid escape sequence \\{}", other as char));
            }
        }
        Ok(())
    }

    fn hex_digits(&mut self, pos: Position, n: usize) -> Result<u32, SyntaxError> {
        let mut v: u32 = 0;
        for _ in 0..n {
            let d = match self.peek() {
                Some(d @ b'0'..=b'9') => (d - b'0') as u32,
                Some(d @ b'a'..=b'f') => (d - b'a') as u32 + 10,
                Some(d @ b'A'..=b'F') => (d - b'A') as u32 + 10,
                _ => return self.err(pos, "invalid hex escape"),
            };
            self.bump();
            v = v * 16 + d;
        }
        Ok(v)
    }

    fn push_char(&mut self, pos: Position, v: u32, buf: &mut Vec<u8>) -> Result<(), SyntaxError> {
        match char::from_u32(v) {
            Some(ch) => {
                let mut tmp = [0u8; 4];
                buf.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
                Ok(())
            }
            None => self.err(pos, "invalid Unicode code point in escape"),
        }
    }

    fn scan_punct(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        let c = self.bump().expect("punct byte");
        let tok = match c {
            b'(' => {
                self.depth += 1;
                Token::LParen
            }
            b')' => {
                self.depth = self.depth.saturating_sub(1);
                Token::RParen
            }
            b'[' => {
                self.depth += 1;
                Token::LBracket
            }
            b']' => {
                self.depth = self.depth.saturating_sub(1);
                Token::RBracket
            }
            b'{' => {
                self.depth += 1;
                Token::LBrace
            }
            b'}' => {
                self.depth = self.depth.saturating_sub(1);
                Token::RBrace
            }
            b',' => Token::Comma,
            b':' => Token::Colon,
            b';' => Token::Semicolon,
            b'+' => self.maybe_eq(Token::Plus, Token::PlusEq),
            b'-' => self.maybe_eq(Token::Minus, Token::MinusEq),
            b'*' => {
                if self.peek() == Some(b'*') {
                    self.bump();
                    Token::StarStar
                } else {
                    self.maybe_eq(Token::Star, Token::StarEq)
                }
            }
            b'/' => {
                if self.peek() == Some(b'/') {
                    self.bump();
                    self.maybe_eq(Token::SlashSlash, Token::SlashSlashEq)
                } else {
                    self.maybe_eq(Token::Slash, Token::SlashEq)
                }
            }
            b'%' => self.maybe_eq(Token::Percent, Token::PercentEq),
            b'&' => self.maybe_eq(Token::Amp, Token::AmpEq),
            b'|' => self.maybe_eq(Token::Pipe, Token::PipeEq),
            b'^' => self.maybe_eq(Token::Caret, Token::CaretEq),
            b'~' => Token::Tilde,
            b'<' => {
                if self.peek() == Some(b'<') {
                    self.bump();
                    self.maybe_eq(Token::Shl, Token::ShlEq)
                } else {
                    self.maybe_eq(Token::Lt, Token::Le)
                }
            }
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.bump();
                    self.maybe_eq(Token::Shr, Token::ShrEq)
                } else {
                    self.maybe_eq(Token::Gt, Token::Ge)
                }
            }
            b'=' => self.maybe_eq(Token::Assign, Token::EqEq),
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::Ne
                } else {
                    return self.err(pos, "unexpected character '!'");
                }
            }
            other => {
                return self.err(pos, format!("unexpected character {:?}", other as char));
            }
        };
        self.emit(pos, tok);
        Ok(())
    }

    fn maybe_eq(&mut self, plain: Token, with_eq: Token) -> Token {
        if self.peek() == Some(b'=') {
            self.bump();
            with_eq
        } else {
            plain
        }
    }
}
