//! Cross-reference structures: classic tables, xref streams, and the
//! full-scan fallback used when the xref machinery is corrupt.
//!
//! Sections are walked newest-first (following `/Prev`); within the merged
//! table the first entry seen for an object number wins, which makes the most
//! recent incremental update authoritative.

use std::collections::HashMap;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::filters::{self, FilterSpec};
use crate::model::Object;
use crate::parser::{no_length_lookup, ObjectParser};
use crate::tokenizer::{is_delim, is_whitespace, Lexer, Token};

const MAX_SUBSECTION_COUNT: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    Free,
    InUse { offset: usize, gen: u16 },
    Compressed { stream_num: u32, index: usize },
}

/// One parsed xref section: its entries, its trailer dictionary, and the
/// `/Prev` offset when the section belongs to an incremental-update chain.
#[derive(Debug)]
pub(crate) struct XrefSection {
    pub entries: Vec<(u32, XrefEntry)>,
    pub trailer: HashMap<String, Object>,
    pub prev: Option<usize>,
}

/// Parse the section at `offset`, dispatching on the first token: the `xref`
/// keyword selects a classic table, an integer an xref stream.
pub(crate) fn parse_section_at(input: &[u8], offset: usize) -> Result<XrefSection> {
    if offset >= input.len() {
        return Err(Error::parse_at("xref offset past end of file", offset));
    }
    let mut lexer = Lexer::new(input);
    lexer.set_position(offset);
    match lexer.next_token() {
        Some(Token::Keyword(kw)) if kw == "xref" => parse_classic_table(input, offset),
        Some(Token::Integer(_)) => parse_xref_stream(input, offset),
        _ => Err(Error::parse_at("no xref table or stream at offset", offset)),
    }
}

fn parse_classic_table(input: &[u8], offset: usize) -> Result<XrefSection> {
    let mut parser = ObjectParser::at(input, offset);
    match parser.next_raw_token() {
        Some(Token::Keyword(kw)) if kw == "xref" => {}
        _ => return Err(Error::parse_at("expected xref keyword", offset)),
    }

    let mut entries = Vec::new();
    loop {
        match parser.next_raw_token() {
            Some(Token::Integer(first)) if first >= 0 => {
                let count = match parser.next_raw_token() {
                    Some(Token::Integer(v)) if (0..=MAX_SUBSECTION_COUNT).contains(&v) => v,
                    _ => return Err(Error::parse("malformed xref subsection header")),
                };
                for i in 0..count {
                    let entry_offset = match parser.next_raw_token() {
                        Some(Token::Integer(v)) if v >= 0 => v as usize,
                        _ => return Err(Error::parse("malformed xref entry offset")),
                    };
                    let gen = match parser.next_raw_token() {
                        Some(Token::Integer(v)) if (0..=u16::MAX as i64).contains(&v) => v as u16,
                        _ => return Err(Error::parse("malformed xref entry generation")),
                    };
                    let entry = match parser.next_raw_token() {
                        Some(Token::Keyword(kw)) if kw == "n" => XrefEntry::InUse {
                            offset: entry_offset,
                            gen,
                        },
                        Some(Token::Keyword(kw)) if kw == "f" => XrefEntry::Free,
                        _ => return Err(Error::parse("malformed xref entry type")),
                    };
                    entries.push(((first + i) as u32, entry));
                }
            }
            Some(Token::Keyword(kw)) if kw == "trailer" => {
                let trailer = parser
                    .parse_object(&no_length_lookup)
                    .and_then(|obj| obj.as_dict().cloned())
                    .ok_or_else(|| Error::parse("missing trailer dictionary"))?;
                let prev = trailer_prev(&trailer);
                return Ok(XrefSection {
                    entries,
                    trailer,
                    prev,
                });
            }
            _ => return Err(Error::parse("unterminated xref table")),
        }
    }
}

fn parse_xref_stream(input: &[u8], offset: usize) -> Result<XrefSection> {
    let (_, _, obj) = ObjectParser::at(input, offset)
        .parse_indirect(&no_length_lookup)
        .ok_or_else(|| Error::parse_at("no indirect object at xref stream offset", offset))?;
    let Object::Stream { dict, data } = obj else {
        return Err(Error::parse_at("xref stream object is not a stream", offset));
    };

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|arr| arr.iter().filter_map(Object::as_usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 {
        return Err(Error::parse("xref stream /W must hold three widths"));
    }
    let size = dict
        .get("Size")
        .and_then(Object::as_i64)
        .ok_or_else(|| Error::parse("xref stream is missing /Size"))?;

    let index: Vec<i64> = dict
        .get("Index")
        .and_then(Object::as_array)
        .map(|arr| arr.iter().filter_map(Object::as_i64).collect())
        .unwrap_or_else(|| vec![0, size]);
    if index.len() % 2 != 0 {
        return Err(Error::parse("xref stream /Index length must be even"));
    }

    // Filters of an xref stream are necessarily direct: there is no xref to
    // resolve references through yet.
    let decoded = filters::decode(&data, &direct_filter_specs(&dict))?;

    let record_len = widths.iter().sum::<usize>();
    if record_len == 0 {
        return Err(Error::parse("xref stream /W widths sum to zero"));
    }

    let mut entries = Vec::new();
    let mut cursor = 0usize;
    for pair in index.chunks(2) {
        let (first, count) = (pair[0], pair[1]);
        if first < 0 || !(0..=MAX_SUBSECTION_COUNT).contains(&count) {
            return Err(Error::parse("xref stream /Index out of range"));
        }
        for i in 0..count {
            if cursor + record_len > decoded.len() {
                warn!("xref stream payload is short, keeping parsed entries");
                break;
            }
            let record = &decoded[cursor..cursor + record_len];
            cursor += record_len;

            let (f1, rest) = record.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            // A zero-width first field defaults the entry type to in-use.
            let entry_type = if widths[0] == 0 { 1 } else { be_value(f1) };
            let field2 = be_value(f2);
            let field3 = be_value(f3);

            let entry = match entry_type {
                0 => XrefEntry::Free,
                1 => XrefEntry::InUse {
                    offset: field2 as usize,
                    gen: field3.min(u16::MAX as u64) as u16,
                },
                2 => XrefEntry::Compressed {
                    stream_num: field2.min(u32::MAX as u64) as u32,
                    index: field3 as usize,
                },
                other => {
                    debug!("ignoring xref stream entry of unknown type {}", other);
                    continue;
                }
            };
            entries.push(((first + i) as u32, entry));
        }
    }

    let prev = trailer_prev(&dict);
    Ok(XrefSection {
        entries,
        trailer: dict,
        prev,
    })
}

fn trailer_prev(trailer: &HashMap<String, Object>) -> Option<usize> {
    trailer
        .get("Prev")
        .and_then(Object::as_i64)
        .and_then(|v| usize::try_from(v).ok())
}

fn be_value(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Build the filter chain from direct `/Filter` and `/DecodeParms` values
/// only; indirect entries are skipped.
pub(crate) fn direct_filter_specs(dict: &HashMap<String, Object>) -> Vec<FilterSpec> {
    let parms_for = |i: usize| -> Option<HashMap<String, Object>> {
        match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
            Some(Object::Dictionary(d)) if i == 0 => Some(d.clone()),
            Some(Object::Array(arr)) => arr.get(i).and_then(|o| o.as_dict().cloned()),
            _ => None,
        }
    };
    match dict.get("Filter") {
        Some(Object::Name(name)) => vec![FilterSpec {
            name: name.clone(),
            parms: parms_for(0),
        }],
        Some(Object::Array(arr)) => arr
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                entry.as_name().map(|name| FilterSpec {
                    name: name.to_string(),
                    parms: parms_for(i),
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Recovery scan for documents whose xref machinery is unusable.
///
/// Stage one reindexes every `num gen obj` header in the buffer (first
/// occurrence wins); stage two hunts for a trailer dictionary carrying
/// `/Root`, falling back to any recovered dict that looks like a catalog or
/// xref stream dictionary.
pub(crate) fn scan_objects(
    input: &[u8],
) -> (HashMap<u32, XrefEntry>, Option<HashMap<String, Object>>) {
    let mut entries: HashMap<u32, XrefEntry> = HashMap::new();
    for marker in memchr::memmem::find_iter(input, b" obj") {
        let after = marker + 4;
        if after < input.len() && !is_delim(input[after]) && !is_whitespace(input[after]) {
            continue;
        }
        let Some((num_start, obj_num, gen)) = read_header_backwards(input, marker) else {
            continue;
        };
        entries
            .entry(obj_num)
            .or_insert(XrefEntry::InUse {
                offset: num_start,
                gen,
            });
    }

    let mut trailer = None;
    for marker in memchr::memmem::find_iter(input, b"trailer") {
        let candidate = ObjectParser::at(input, marker + b"trailer".len())
            .parse_object(&no_length_lookup)
            .and_then(|obj| obj.as_dict().cloned());
        match candidate {
            Some(dict) if dict.contains_key("Root") => {
                trailer = Some(dict);
                break;
            }
            // Malformed trailer candidates are skipped; the scan continues.
            _ => continue,
        }
    }

    if trailer.is_none() {
        trailer = promote_trailer_from_objects(input, &entries);
    }
    (entries, trailer)
}

fn read_header_backwards(input: &[u8], marker: usize) -> Option<(usize, u32, u16)> {
    let gen_end = marker;
    let mut gen_start = gen_end;
    while gen_start > 0 && input[gen_start - 1].is_ascii_digit() {
        gen_start -= 1;
    }
    if gen_start == gen_end {
        return None;
    }
    if gen_start == 0 || !is_whitespace(input[gen_start - 1]) {
        return None;
    }

    let mut num_end = gen_start - 1;
    while num_end > 0 && is_whitespace(input[num_end - 1]) {
        num_end -= 1;
    }
    let mut num_start = num_end;
    while num_start > 0 && input[num_start - 1].is_ascii_digit() {
        num_start -= 1;
    }
    if num_start == num_end {
        return None;
    }
    if num_start > 0 && !is_whitespace(input[num_start - 1]) && !is_delim(input[num_start - 1]) {
        return None;
    }

    let obj_num = ascii_number(&input[num_start..num_end])?;
    let gen = ascii_number(&input[gen_start..gen_end])?;
    if obj_num > u32::MAX as u64 || gen > u16::MAX as u64 {
        return None;
    }
    Some((num_start, obj_num as u32, gen as u16))
}

fn ascii_number(digits: &[u8]) -> Option<u64> {
    if digits.is_empty() {
        return None;
    }
    let mut value = 0u64;
    for &byte in digits {
        value = value.checked_mul(10)?.checked_add((byte - b'0') as u64)?;
    }
    Some(value)
}

fn promote_trailer_from_objects(
    input: &[u8],
    entries: &HashMap<u32, XrefEntry>,
) -> Option<HashMap<String, Object>> {
    let mut ordered: Vec<(&u32, &XrefEntry)> = entries.iter().collect();
    ordered.sort_by_key(|(num, _)| **num);
    for (_, entry) in ordered {
        let XrefEntry::InUse { offset, .. } = entry else {
            continue;
        };
        let Some((_, _, obj)) = ObjectParser::at(input, *offset).parse_indirect(&no_length_lookup)
        else {
            continue;
        };
        let Some(dict) = obj.as_dict() else { continue };
        let is_xref_dict = dict.get("Type").and_then(Object::as_name) == Some("XRef");
        if is_xref_dict || dict.contains_key("Root") {
            debug!("promoted a recovered dictionary as the trailer");
            return Some(dict.clone());
        }
    }
    None
}
