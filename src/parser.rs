//! Token-level parser: turns lexer output into COS objects.
//!
//! The parser is offset-driven: callers position it at a byte offset (from the
//! xref table, an object-stream header, or a recovery scan) and pull one value
//! or one indirect object. Stream payload lengths may be indirect; those are
//! resolved through a caller-supplied lookup so the parser never depends on
//! the full document resolver.

use std::collections::{HashMap, VecDeque};

use crate::model::Object;
use crate::tokenizer::{Lexer, Token};

/// Resolves an indirect `/Length` reference to a byte count, or `None`.
pub(crate) type LengthFn<'r> = &'r dyn Fn(u32, u16) -> Option<usize>;

pub(crate) fn no_length_lookup(_obj_num: u32, _gen_num: u16) -> Option<usize> {
    None
}

pub(crate) struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    buffer: VecDeque<Token>,
}

impl<'a> ObjectParser<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(input),
            buffer: VecDeque::new(),
        }
    }

    pub(crate) fn at(input: &'a [u8], offset: usize) -> Self {
        let mut lexer = Lexer::new(input);
        lexer.set_position(offset);
        Self {
            lexer,
            buffer: VecDeque::new(),
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.lexer.position()
    }

    /// Parse `num gen obj <value> endobj` at the current position.
    pub(crate) fn parse_indirect(&mut self, length_of: LengthFn) -> Option<(u32, u16, Object)> {
        let obj_num = match self.next_token()? {
            Token::Integer(v) if v >= 0 => v as u32,
            _ => return None,
        };
        let gen_num = match self.next_token()? {
            Token::Integer(v) if (0..=u16::MAX as i64).contains(&v) => v as u16,
            _ => return None,
        };
        match self.next_token()? {
            Token::Keyword(kw) if kw == "obj" => {}
            _ => return None,
        }
        let value = self.parse_object(length_of)?;
        // Tolerate junk between the value and `endobj`.
        while let Some(token) = self.peek(1) {
            let at_end = matches!(token, Token::Keyword(kw) if kw == "endobj");
            let _ = self.next_token();
            if at_end {
                break;
            }
        }
        Some((obj_num, gen_num, value))
    }

    pub(crate) fn parse_object(&mut self, length_of: LengthFn) -> Option<Object> {
        match self.next_token()? {
            Token::Null => Some(Object::Null),
            Token::Boolean(v) => Some(Object::Boolean(v)),
            Token::Integer(v) => self.parse_number_or_reference(v),
            Token::Real(v) => Some(Object::Real(v)),
            Token::String(v) => Some(Object::String(v)),
            Token::HexString(v) => Some(Object::String(v)),
            Token::Name(v) => Some(Object::Name(v)),
            Token::ArrayStart => Some(Object::Array(self.parse_array(length_of))),
            Token::DictStart => self.parse_dict_or_stream(length_of),
            _ => None,
        }
    }

    fn parse_number_or_reference(&mut self, first: i64) -> Option<Object> {
        let second = match self.peek(1) {
            Some(Token::Integer(v)) => Some(*v),
            _ => None,
        };
        if let Some(second) = second {
            let is_ref = matches!(self.peek(2), Some(Token::Keyword(kw)) if kw == "R");
            if is_ref && first >= 0 && (0..=u16::MAX as i64).contains(&second) {
                let _ = self.next_token();
                let _ = self.next_token();
                return Some(Object::Reference {
                    obj_num: first as u32,
                    gen_num: second as u16,
                });
            }
        }
        Some(Object::Integer(first))
    }

    fn parse_array(&mut self, length_of: LengthFn) -> Vec<Object> {
        let mut items = Vec::new();
        loop {
            match self.peek(1) {
                Some(Token::ArrayEnd) => {
                    let _ = self.next_token();
                    break;
                }
                None => break,
                _ => {}
            }
            if let Some(obj) = self.parse_object(length_of) {
                items.push(obj);
            } else {
                let _ = self.next_token();
            }
        }
        items
    }

    fn parse_dict_or_stream(&mut self, length_of: LengthFn) -> Option<Object> {
        let mut dict = HashMap::new();
        loop {
            match self.peek(1) {
                Some(Token::DictEnd) => {
                    let _ = self.next_token();
                    break;
                }
                None => break,
                _ => {}
            }
            let key = match self.next_token() {
                Some(Token::Name(v)) => v,
                _ => break,
            };
            match self.parse_object(length_of) {
                // Keys are unique; the first occurrence wins on duplicates.
                Some(value) => {
                    dict.entry(key).or_insert(value);
                }
                None => break,
            }
        }

        let at_stream = matches!(self.peek(1), Some(Token::Keyword(kw)) if kw == "stream");
        if !at_stream {
            return Some(Object::Dictionary(dict));
        }
        let _ = self.next_token();

        let length = match dict.get("Length") {
            Some(Object::Integer(v)) if *v >= 0 => usize::try_from(*v).ok(),
            Some(Object::Reference { obj_num, gen_num }) => length_of(*obj_num, *gen_num),
            _ => None,
        };
        let payload_start = self.lexer.position();
        let mut data = match length {
            Some(length) => self.lexer.consume_stream(length),
            None => self.lexer.consume_stream_until_endstream(),
        };

        if length.is_some() {
            let at_marker = matches!(
                self.peek(1),
                Some(Token::Keyword(kw)) if kw == "endstream" || kw == "endobj"
            );
            if !at_marker {
                // The declared length was wrong; rescan for the real terminator.
                self.buffer.clear();
                self.lexer.set_position(payload_start);
                data = self.lexer.consume_stream_until_endstream();
            }
        }
        if matches!(self.peek(1), Some(Token::Keyword(kw)) if kw == "endstream") {
            let _ = self.next_token();
        }
        Some(Object::Stream { dict, data })
    }

    fn next_token(&mut self) -> Option<Token> {
        if let Some(token) = self.buffer.pop_front() {
            return Some(token);
        }
        self.lexer.next_token()
    }

    pub(crate) fn next_raw_token(&mut self) -> Option<Token> {
        self.next_token()
    }

    fn peek(&mut self, n: usize) -> Option<&Token> {
        while self.buffer.len() < n {
            let token = self.lexer.next_token()?;
            self.buffer.push_back(token);
        }
        self.buffer.get(n - 1)
    }
}

/// Parse a single value at `offset` with no stream-length lookup.
pub(crate) fn parse_object_at(input: &[u8], offset: usize) -> Option<Object> {
    ObjectParser::at(input, offset).parse_object(&no_length_lookup)
}

/// Read `num gen obj <integer> endobj` at `offset`, verifying the header
/// matches the expected object. Used for indirect `/Length` targets.
pub(crate) fn parse_integer_object_at(
    input: &[u8],
    offset: usize,
    expected_obj_num: u32,
    expected_gen_num: u16,
) -> Option<usize> {
    let mut lexer = Lexer::new(input);
    lexer.set_position(offset);
    match lexer.next_token()? {
        Token::Integer(v) if v == expected_obj_num as i64 => {}
        _ => return None,
    }
    match lexer.next_token()? {
        Token::Integer(v) if v == expected_gen_num as i64 => {}
        _ => return None,
    }
    match lexer.next_token()? {
        Token::Keyword(kw) if kw == "obj" => {}
        _ => return None,
    }
    match lexer.next_token()? {
        Token::Integer(v) if v > 0 => usize::try_from(v).ok(),
        _ => None,
    }
}
