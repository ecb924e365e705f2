//! JSON (RFC 8259).
//!
//! Map keys are always written as strings: numbers, booleans and null are
//! quoted when they appear in key position. Byte strings are written as
//! standard base64 text, and extension values as their converted value.
//!
//! On decode, quoted numbers and booleans are accepted wherever a number or
//! boolean is expected, so map keys of any scalar type round-trip.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::codec::{DecDriver, DecReader, EncDriver, ExtMode, Number, ValueKind};
use crate::error::DecodeError;
use crate::handle::{BasicHandle, Handle};

use super::{basic_accessors, peek_required};

const FORMAT: &str = "json";

#[derive(Debug, Clone, Default)]
pub struct JsonHandle {
    basic: BasicHandle,
    /// Indentation per nesting level: spaces when positive, tabs when
    /// negative, compact output when zero.
    pub indent: i8,
    /// Write `<`, `>` and `&` literally instead of as `\u00XX` escapes.
    pub html_chars_as_is: bool,
}

impl Handle for JsonHandle {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn is_binary(&self) -> bool {
        false
    }

    basic_accessors!();

    fn enc_driver(&self) -> Box<dyn EncDriver + '_> {
        Box::new(JsonEncDriver {
            indent: self.indent,
            html_chars_as_is: self.html_chars_as_is,
            in_key: false,
            stack: Vec::new(),
        })
    }

    fn dec_driver(&self) -> Box<dyn DecDriver + '_> {
        Box::new(JsonDecDriver)
    }
}

struct JsonEncDriver {
    indent: i8,
    html_chars_as_is: bool,
    in_key: bool,
    // One entry per open container: whether it has elements yet.
    stack: Vec<bool>,
}

const HEX: &[u8; 16] = b"0123456789abcdef";

impl JsonEncDriver {
    fn newline(&self, w: &mut Vec<u8>) {
        if self.indent == 0 {
            return;
        }
        w.push(b'\n');
        let (ch, per) = if self.indent < 0 {
            (b'\t', self.indent.unsigned_abs() as usize)
        } else {
            (b' ', self.indent as usize)
        };
        w.resize(w.len() + per * self.stack.len(), ch);
    }

    fn elem(&mut self, w: &mut Vec<u8>, first: bool) {
        if !first {
            w.push(b',');
        }
        if let Some(top) = self.stack.last_mut() {
            *top = true;
        }
        self.newline(w);
    }

    fn begin(&mut self, w: &mut Vec<u8>, c: u8) {
        w.push(c);
        self.stack.push(false);
    }

    fn end(&mut self, w: &mut Vec<u8>, c: u8) {
        let non_empty = self.stack.pop().unwrap_or(false);
        if non_empty {
            self.newline(w);
        }
        w.push(c);
    }

    // Scalars other than strings are quoted in key position.
    fn scalar(&mut self, w: &mut Vec<u8>, text: &str) {
        if self.in_key {
            w.push(b'"');
            w.extend_from_slice(text.as_bytes());
            w.push(b'"');
        } else {
            w.extend_from_slice(text.as_bytes());
        }
    }

    fn quote(&self, w: &mut Vec<u8>, s: &str) {
        w.push(b'"');
        let bytes = s.as_bytes();
        let mut start = 0;
        for (i, c) in s.char_indices() {
            let esc: Option<&[u8]> = match c {
                '"' => Some(b"\\\""),
                '\\' => Some(b"\\\\"),
                '\n' => Some(b"\\n"),
                '\r' => Some(b"\\r"),
                '\t' => Some(b"\\t"),
                '\u{8}' => Some(b"\\b"),
                '\u{c}' => Some(b"\\f"),
                '<' | '>' | '&' if !self.html_chars_as_is => Some(b""),
                c if (c as u32) < 0x20 => Some(b""),
                '\u{2028}' => Some(b"\\u2028"),
                '\u{2029}' => Some(b"\\u2029"),
                _ => None,
            };
            let Some(esc) = esc else { continue };
            w.extend_from_slice(&bytes[start..i]);
            if esc.is_empty() {
                let b = c as u32 as u8;
                w.extend_from_slice(b"\\u00");
                w.push(HEX[(b >> 4) as usize]);
                w.push(HEX[(b & 0xf) as usize]);
            } else {
                w.extend_from_slice(esc);
            }
            start = i + c.len_utf8();
        }
        w.extend_from_slice(&bytes[start..]);
        w.push(b'"');
    }
}

impl EncDriver for JsonEncDriver {
    fn encode_nil(&mut self, w: &mut Vec<u8>) {
        if self.in_key {
            w.extend_from_slice(b"\"\"");
        } else {
            w.extend_from_slice(b"null");
        }
    }

    fn encode_bool(&mut self, w: &mut Vec<u8>, v: bool) {
        self.scalar(w, if v { "true" } else { "false" });
    }

    fn encode_int(&mut self, w: &mut Vec<u8>, v: i64) {
        self.scalar(w, &v.to_string());
    }

    fn encode_uint(&mut self, w: &mut Vec<u8>, v: u64) {
        self.scalar(w, &v.to_string());
    }

    fn encode_f32(&mut self, w: &mut Vec<u8>, v: f32) {
        if v.is_finite() {
            self.scalar(w, &format!("{:?}", v));
        } else {
            self.scalar(w, "null");
        }
    }

    fn encode_f64(&mut self, w: &mut Vec<u8>, v: f64) {
        if v.is_finite() {
            self.scalar(w, &format!("{:?}", v));
        } else {
            self.scalar(w, "null");
        }
    }

    fn encode_str(&mut self, w: &mut Vec<u8>, v: &str) {
        self.quote(w, v);
    }

    fn encode_bytes(&mut self, w: &mut Vec<u8>, v: &[u8]) {
        w.push(b'"');
        w.extend_from_slice(STANDARD.encode(v).as_bytes());
        w.push(b'"');
    }

    fn ext_mode(&self) -> ExtMode {
        ExtMode::Value
    }

    fn write_array_start(&mut self, w: &mut Vec<u8>, _len: usize) {
        self.begin(w, b'[');
    }

    fn write_array_elem(&mut self, w: &mut Vec<u8>, first: bool) {
        self.elem(w, first);
    }

    fn write_array_end(&mut self, w: &mut Vec<u8>) {
        self.end(w, b']');
    }

    fn write_map_start(&mut self, w: &mut Vec<u8>, _len: usize) {
        self.begin(w, b'{');
    }

    fn write_map_elem_key(&mut self, w: &mut Vec<u8>, first: bool) {
        self.elem(w, first);
        self.in_key = true;
    }

    fn write_map_elem_value(&mut self, w: &mut Vec<u8>) {
        self.in_key = false;
        w.push(b':');
        if self.indent != 0 {
            w.push(b' ');
        }
    }

    fn write_map_end(&mut self, w: &mut Vec<u8>) {
        self.end(w, b'}');
    }

    fn reset(&mut self) {
        self.in_key = false;
        self.stack.clear();
    }
}

struct JsonDecDriver;

fn syntax(r: &dyn DecReader, message: impl Into<String>) -> DecodeError {
    DecodeError::Syntax {
        format: FORMAT,
        offset: r.num_read(),
        message: message.into(),
    }
}

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_number_byte(b: u8) -> bool {
    matches!(b, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E')
}

fn skip_ws(r: &mut dyn DecReader) -> Result<(), DecodeError> {
    while let Some(b) = r.peek_byte()? {
        if !is_ws(b) {
            break;
        }
        r.read_byte()?;
    }
    Ok(())
}

/// Skip whitespace and peek the next significant byte.
fn peek_sig(r: &mut dyn DecReader) -> Result<u8, DecodeError> {
    skip_ws(r)?;
    peek_required(r)
}

fn expect_byte(r: &mut dyn DecReader, want: u8) -> Result<(), DecodeError> {
    let got = peek_sig(r)?;
    if got != want {
        return Err(syntax(
            r,
            format!("expected '{}', found '{}'", want as char, got as char),
        ));
    }
    r.read_byte()?;
    Ok(())
}

fn expect_literal(r: &mut dyn DecReader, lit: &'static [u8]) -> Result<(), DecodeError> {
    for &want in lit {
        let got = r.read_byte()?;
        if got != want {
            return Err(syntax(
                r,
                format!("invalid literal, expected {}", String::from_utf8_lossy(lit)),
            ));
        }
    }
    Ok(())
}

fn read_number_token(r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    while let Some(b) = r.peek_byte()? {
        if !is_number_byte(b) {
            break;
        }
        out.push(r.read_byte()?);
    }
    Ok(out)
}

// Always consumes four bytes; `None` when any of them is not a hex digit.
fn read_hex4(r: &mut dyn DecReader) -> Result<Option<u32>, DecodeError> {
    let mut v = Some(0u32);
    for _ in 0..4 {
        let d = (r.read_byte()? as char).to_digit(16);
        v = v.zip(d).map(|(v, d)| (v << 4) | d);
    }
    Ok(v)
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Decode one escape, the backslash already consumed. A malformed or
/// unpaired `\u` escape decodes to U+FFFD.
fn read_escape(r: &mut dyn DecReader, out: &mut Vec<u8>) -> Result<(), DecodeError> {
    let mut high = None;
    loop {
        let c = match r.read_byte()? {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => match read_hex4(r)? {
                Some(hi @ 0xd800..=0xdbff) => {
                    if high.replace(hi).is_some() {
                        push_char(out, char::REPLACEMENT_CHARACTER);
                    }
                    if r.peek_byte()? == Some(b'\\') {
                        r.read_byte()?;
                        continue;
                    }
                    high = None;
                    char::REPLACEMENT_CHARACTER
                }
                Some(lo @ 0xdc00..=0xdfff) => match high.take() {
                    Some(hi) => char::from_u32(0x10000 + ((hi - 0xd800) << 10) + (lo - 0xdc00))
                        .unwrap_or(char::REPLACEMENT_CHARACTER),
                    None => char::REPLACEMENT_CHARACTER,
                },
                Some(cp) => char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER),
                None => char::REPLACEMENT_CHARACTER,
            },
            other => return Err(syntax(r, format!("invalid escape '\\{}'", other as char))),
        };
        if high.take().is_some() {
            push_char(out, char::REPLACEMENT_CHARACTER);
        }
        push_char(out, c);
        return Ok(());
    }
}

/// Read a quoted string, the opening quote not yet consumed.
fn read_quoted(r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
    r.read_byte()?;
    let mut out = Vec::new();
    loop {
        match r.read_byte()? {
            b'"' => return Ok(out),
            b'\\' => read_escape(r, &mut out)?,
            b => out.push(b),
        }
    }
}

fn parse_number(r: &dyn DecReader, token: &[u8]) -> Result<Number, DecodeError> {
    let text = std::str::from_utf8(token).map_err(|_| syntax(r, "invalid number"))?;
    let bad = || syntax(r, format!("invalid number '{}'", text));
    if text.is_empty() {
        return Err(bad());
    }
    if text.contains(['.', 'e', 'E']) {
        return text.parse::<f64>().map(Number::Float).map_err(|_| bad());
    }
    let n = if text.starts_with('-') {
        text.parse::<i64>().map(Number::Int)
    } else {
        text.parse::<u64>().map(Number::Uint)
    };
    // Integers outside 64 bits degrade to a float.
    n.or_else(|_| text.parse::<f64>().map(Number::Float))
        .map_err(|_| bad())
}

impl DecDriver for JsonDecDriver {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn skip_insignificant(&mut self, r: &mut dyn DecReader) -> Result<(), DecodeError> {
        skip_ws(r)
    }

    fn next_kind(&mut self, r: &mut dyn DecReader) -> Result<ValueKind, DecodeError> {
        let kind = match peek_sig(r)? {
            b'n' => ValueKind::Nil,
            b't' | b'f' => ValueKind::Bool,
            b'"' => ValueKind::Str,
            b'[' => ValueKind::Array,
            b'{' => ValueKind::Map,
            b'-' => ValueKind::Int,
            b'0'..=b'9' => ValueKind::Uint,
            b => return Err(syntax(r, format!("unexpected character '{}'", b as char))),
        };
        Ok(kind)
    }

    fn try_nil(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        skip_ws(r)?;
        if r.peek_byte()? == Some(b'n') {
            expect_literal(r, b"null")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn decode_bool(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        match peek_sig(r)? {
            b't' => {
                expect_literal(r, b"true")?;
                Ok(true)
            }
            b'f' => {
                expect_literal(r, b"false")?;
                Ok(false)
            }
            b'"' => match read_quoted(r)?.as_slice() {
                b"true" => Ok(true),
                b"false" => Ok(false),
                other => Err(DecodeError::mismatch(
                    "bool",
                    format!("string \"{}\"", String::from_utf8_lossy(other)),
                )),
            },
            b => Err(DecodeError::mismatch("bool", describe(b))),
        }
    }

    fn decode_number(&mut self, r: &mut dyn DecReader) -> Result<Number, DecodeError> {
        let token = match peek_sig(r)? {
            b'"' => read_quoted(r)?,
            b'-' | b'0'..=b'9' => read_number_token(r)?,
            b => return Err(DecodeError::mismatch("number", describe(b))),
        };
        parse_number(r, &token)
    }

    fn decode_raw_str(&mut self, r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
        match peek_sig(r)? {
            b'"' => read_quoted(r),
            b'-' | b'0'..=b'9' => read_number_token(r),
            b't' => expect_literal(r, b"true").map(|_| b"true".to_vec()),
            b'f' => expect_literal(r, b"false").map(|_| b"false".to_vec()),
            b => Err(DecodeError::mismatch("string", describe(b))),
        }
    }

    fn decode_bytes(&mut self, r: &mut dyn DecReader) -> Result<Vec<u8>, DecodeError> {
        if peek_sig(r)? != b'"' {
            let b = peek_sig(r)?;
            return Err(DecodeError::mismatch("bytes", describe(b)));
        }
        let text = read_quoted(r)?;
        STANDARD
            .decode(&text)
            .map_err(|e| syntax(r, format!("invalid base64: {}", e)))
    }

    fn ext_mode(&self) -> ExtMode {
        ExtMode::Value
    }

    fn read_array_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        match peek_sig(r)? {
            b'[' => {
                r.read_byte()?;
                Ok(None)
            }
            b => Err(DecodeError::mismatch("array", describe(b))),
        }
    }

    fn read_array_elem(&mut self, r: &mut dyn DecReader, index: usize) -> Result<(), DecodeError> {
        if index > 0 {
            expect_byte(r, b',')?;
        }
        Ok(())
    }

    fn read_array_end(&mut self, r: &mut dyn DecReader) -> Result<(), DecodeError> {
        expect_byte(r, b']')
    }

    fn read_map_start(&mut self, r: &mut dyn DecReader) -> Result<Option<usize>, DecodeError> {
        match peek_sig(r)? {
            b'{' => {
                r.read_byte()?;
                Ok(None)
            }
            b => Err(DecodeError::mismatch("map", describe(b))),
        }
    }

    fn read_map_elem_key(&mut self, r: &mut dyn DecReader, index: usize) -> Result<(), DecodeError> {
        if index > 0 {
            expect_byte(r, b',')?;
        }
        Ok(())
    }

    fn read_map_elem_value(&mut self, r: &mut dyn DecReader) -> Result<(), DecodeError> {
        expect_byte(r, b':')
    }

    fn read_map_end(&mut self, r: &mut dyn DecReader) -> Result<(), DecodeError> {
        expect_byte(r, b'}')
    }

    fn check_break(&mut self, r: &mut dyn DecReader) -> Result<bool, DecodeError> {
        Ok(matches!(peek_sig(r)?, b']' | b'}'))
    }
}

fn describe(b: u8) -> &'static str {
    match b {
        b'n' => "null",
        b't' | b'f' => "bool",
        b'"' => "string",
        b'[' => "array",
        b'{' => "map",
        b'-' | b'0'..=b'9' => "number",
        _ => "invalid input",
    }
}
