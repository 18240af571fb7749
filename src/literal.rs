//! Strict parser for object-print style literals.
//!
//! Some upstream producers serialized metadata with a generic object printer
//! instead of a JSON encoder, yielding text such as
//! `{'filter_name': 'r', 'extras': {'n': 3}, 'ok': True}`. This module
//! recovers such text into [`serde_json::Value`] without evaluating anything.
//!
//! Accepted grammar: dicts, lists, tuples (as arrays), single- or double-quoted
//! strings with an optional `u`/`b` prefix, integers and finite floats,
//! `True`/`False`/`None` and their JSON spellings. Dict keys may additionally
//! be bare identifiers or numbers. Every other name is rejected.

use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 128;

/// Failure to recover a literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid literal at offset {offset}: {message}")]
pub struct LiteralError {
    /// Byte offset where parsing stopped.
    pub offset: usize,
    /// What was expected or rejected.
    pub message: String,
}

/// Parse a whole string as a literal value.
pub fn parse(text: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser { src: text, pos: 0 };
    let value = parser.value(0)?;
    parser.skip_ws();
    if parser.pos != text.len() {
        return Err(parser.error("trailing characters after literal"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.src[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.skip_ws();
        match self.peek() {
            Some('{') => self.dict(depth),
            Some('[') => self.sequence(']', depth),
            Some('(') => self.sequence(')', depth),
            Some('\'' | '"') => self.string().map(Value::String),
            Some(ch) if ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.') => {
                self.number().map(Value::Number)
            }
            Some(ch) if is_ident_start(ch) => {
                if self.at_prefixed_string() {
                    self.bump();
                    return self.string().map(Value::String);
                }
                let start = self.pos;
                let name = self.ident();
                match name {
                    "True" | "true" => Ok(Value::Bool(true)),
                    "False" | "false" => Ok(Value::Bool(false)),
                    "None" | "null" => Ok(Value::Null),
                    other => Err(LiteralError {
                        offset: start,
                        message: format!("unsupported name `{other}`"),
                    }),
                }
            }
            Some(other) => Err(self.error(format!("unexpected character `{other}`"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn dict(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                break;
            }
            let key = self.key()?;
            self.skip_ws();
            if self.bump() != Some(':') {
                return Err(self.error("expected `:` after dict key"));
            }
            let value = self.value(depth + 1)?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => break,
                _ => return Err(self.error("expected `,` or `}` in dict")),
            }
        }
        Ok(Value::Object(map))
    }

    fn key(&mut self) -> Result<String, LiteralError> {
        match self.peek() {
            Some('\'' | '"') => self.string(),
            Some(ch) if ch.is_ascii_digit() || ch == '-' => {
                self.number().map(|number| number.to_string())
            }
            Some(ch) if is_ident_start(ch) => {
                if self.at_prefixed_string() {
                    self.bump();
                    return self.string();
                }
                Ok(self.ident().to_string())
            }
            _ => Err(self.error("expected dict key")),
        }
    }

    fn sequence(&mut self, close: char, depth: usize) -> Result<Value, LiteralError> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                break;
            }
            items.push(self.value(depth + 1)?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(ch) if ch == close => break,
                _ => return Err(self.error(format!("expected `,` or `{close}`"))),
            }
        }
        Ok(Value::Array(items))
    }

    fn at_prefixed_string(&self) -> bool {
        matches!(self.peek(), Some('u' | 'U' | 'b' | 'B'))
            && matches!(self.peek_second(), Some('\'' | '"'))
    }

    fn ident(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|ch| ch.is_alphanumeric() || ch == '_')
        {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let Some(quote) = self.bump() else {
            return Err(self.error("expected string"));
        };
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(ch) if ch == quote => return Ok(out),
                Some('\\') => self.escape(&mut out)?,
                Some(ch) => out.push(ch),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        match self.bump() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('0') => out.push('\0'),
            Some('x') => out.push(self.hex_char(2)?),
            Some('u') => out.push(self.hex_char(4)?),
            Some('U') => out.push(self.hex_char(8)?),
            Some('\n') => {}
            Some(ch @ ('\\' | '\'' | '"' | '/')) => out.push(ch),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => return Err(self.error("unterminated escape")),
        }
        Ok(())
    }

    fn hex_char(&mut self, digits: usize) -> Result<char, LiteralError> {
        let start = self.pos;
        for _ in 0..digits {
            match self.bump() {
                Some(ch) if ch.is_ascii_hexdigit() => {}
                _ => return Err(self.error("invalid hex escape")),
            }
        }
        u32::from_str_radix(&self.src[start..self.pos], 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("escape is not a valid character"))
    }

    fn number(&mut self) -> Result<Number, LiteralError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-' | '.' | 'e' | 'E'))
        {
            self.bump();
        }
        let text = self.src[start..self.pos].trim_start_matches('+');
        let invalid = || LiteralError {
            offset: start,
            message: format!("invalid number `{}`", &self.src[start..self.pos]),
        };
        if text.contains(['.', 'e', 'E']) {
            let float = text.parse::<f64>().map_err(|_| invalid())?;
            return Number::from_f64(float).ok_or_else(invalid);
        }
        if let Ok(int) = text.parse::<i64>() {
            return Ok(Number::from(int));
        }
        if let Ok(int) = text.parse::<u64>() {
            return Ok(Number::from(int));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .ok_or_else(invalid)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}
