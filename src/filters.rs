//! Stream filter decoding: Flate, ASCIIHex, ASCII85, LZW, PNG predictor.
//!
//! The document layer materializes the `/Filter` + `/DecodeParms` chain into
//! [`FilterSpec`]s (resolving any indirect entries) so this module stays free
//! of object resolution. Filters apply left to right. Unknown filters pass
//! bytes through unchanged; that tolerance keeps image-only streams from
//! aborting text extraction.

use std::collections::HashMap;
use std::io::Read;

use log::warn;

use crate::error::{Error, Result};
use crate::model::Object;

#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub name: String,
    pub parms: Option<HashMap<String, Object>>,
}

pub fn decode(data: &[u8], filters: &[FilterSpec]) -> Result<Vec<u8>> {
    let mut current = data.to_vec();
    for filter in filters {
        current = match filter.name.as_str() {
            "FlateDecode" | "Fl" => flate_decode(&current)?,
            "ASCIIHexDecode" | "AHx" => ascii_hex_decode(&current),
            "ASCII85Decode" | "A85" => ascii85_decode(&current),
            "LZWDecode" | "LZW" => {
                let early_change = filter
                    .parms
                    .as_ref()
                    .and_then(|p| p.get("EarlyChange"))
                    .and_then(Object::as_i64)
                    .unwrap_or(1);
                lzw_decode(&current, early_change != 0)
            }
            other => {
                warn!("unknown stream filter {}, passing bytes through", other);
                current
            }
        };
        if let Some(parms) = &filter.parms {
            current = apply_predictor(current, parms);
        }
    }
    Ok(current)
}

/// Inflate a zlib payload; retry as raw deflate when the zlib wrapper is
/// damaged, and accept a truncated prefix before giving up.
fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match flate2::read::ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => return Ok(out),
        Err(_) => {}
    }

    let mut raw = Vec::new();
    if flate2::read::DeflateDecoder::new(data).read_to_end(&mut raw).is_ok() {
        return Ok(raw);
    }
    if !out.is_empty() {
        warn!("zlib stream is damaged, keeping {} decoded bytes", out.len());
        return Ok(out);
    }
    Err(Error::parse("flate payload is not decodable"))
}

fn ascii_hex_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pending: Option<u8> = None;
    for &byte in data {
        if byte == b'>' {
            break;
        }
        let nibble = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => continue,
        };
        match pending.take() {
            Some(high) => out.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }
    if let Some(high) = pending {
        out.push(high << 4);
    }
    out
}

fn ascii85_decode(data: &[u8]) -> Vec<u8> {
    let mut input = data;
    if input.starts_with(b"<~") {
        input = &input[2..];
    }

    let mut out = Vec::new();
    let mut group = [0u8; 5];
    let mut count = 0usize;
    let mut i = 0usize;
    while i < input.len() {
        let byte = input[i];
        i += 1;
        match byte {
            b'~' => break,
            b'z' if count == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[count] = byte - b'!';
                count += 1;
                if count == 5 {
                    push_ascii85_group(&mut out, &group, 5);
                    count = 0;
                }
            }
            _ => {}
        }
    }
    if count > 1 {
        // Pad the final group with 'u' and truncate to the carried bytes.
        for slot in group.iter_mut().skip(count) {
            *slot = 84;
        }
        push_ascii85_group(&mut out, &group, count);
    }
    out
}

fn push_ascii85_group(out: &mut Vec<u8>, group: &[u8; 5], digits: usize) {
    let mut value = 0u32;
    for &digit in group {
        value = value.wrapping_mul(85).wrapping_add(digit as u32);
    }
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[..digits - 1]);
}

fn lzw_decode(data: &[u8], early_change: bool) -> Vec<u8> {
    const CLEAR: usize = 256;
    const EOI: usize = 257;

    let mut out = Vec::new();
    let mut table: Vec<Vec<u8>> = Vec::new();
    reset_lzw_table(&mut table);
    let mut code_width = 9usize;
    let mut prev: Option<Vec<u8>> = None;
    let mut reader = BitReader::new(data);

    while let Some(code) = reader.read(code_width) {
        let code = code as usize;
        if code == CLEAR {
            reset_lzw_table(&mut table);
            code_width = 9;
            prev = None;
            continue;
        }
        if code == EOI {
            break;
        }

        let entry = if code < table.len() {
            table[code].clone()
        } else if let Some(prev) = &prev {
            // KwKwK case: the code being defined by this very output.
            let mut entry = prev.clone();
            entry.push(prev[0]);
            entry
        } else {
            break;
        };

        out.extend_from_slice(&entry);
        if let Some(prev) = prev.take() {
            let mut new_entry = prev;
            new_entry.push(entry[0]);
            table.push(new_entry);
        }
        prev = Some(entry);

        let occupied = table.len() + if early_change { 1 } else { 0 };
        if occupied >= (1 << code_width) && code_width < 12 {
            code_width += 1;
        }
    }
    out
}

fn reset_lzw_table(table: &mut Vec<Vec<u8>>) {
    table.clear();
    for byte in 0u16..258 {
        // 256 and 257 hold the clear/EOI markers; keep them as placeholders
        // so appended entries start at 258.
        table.push(if byte < 256 { vec![byte as u8] } else { Vec::new() });
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn read(&mut self, width: usize) -> Option<u32> {
        if self.bit_pos + width > self.data.len() * 8 {
            return None;
        }
        let mut value = 0u32;
        for _ in 0..width {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - self.bit_pos % 8)) & 1;
            value = (value << 1) | bit as u32;
            self.bit_pos += 1;
        }
        Some(value)
    }
}

/// PNG-predictor postprocessing for `/Predictor >= 10`.
fn apply_predictor(data: Vec<u8>, parms: &HashMap<String, Object>) -> Vec<u8> {
    let predictor = parms
        .get("Predictor")
        .and_then(Object::as_i64)
        .unwrap_or(1);
    if predictor < 10 {
        return data;
    }
    let columns = parms.get("Columns").and_then(Object::as_i64).unwrap_or(1);
    if columns <= 0 {
        // Guards against maliciously crafted parameters.
        return data;
    }
    let colors = parms.get("Colors").and_then(Object::as_i64).unwrap_or(1).max(1);
    let bits = parms
        .get("BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8)
        .max(1);
    let row_len = ((columns * colors * bits + 7) / 8) as usize;
    let bytes_per_pixel = (((colors * bits) + 7) / 8).max(1) as usize;
    if row_len == 0 {
        return data;
    }

    let mut out = Vec::with_capacity(data.len());
    let mut prior_row = vec![0u8; row_len];
    let mut offset = 0usize;
    while offset + 1 <= data.len() {
        let tag = data[offset];
        offset += 1;
        let available = (data.len() - offset).min(row_len);
        if available == 0 {
            break;
        }
        let mut row = data[offset..offset + available].to_vec();
        row.resize(row_len, 0);
        offset += available;

        for i in 0..row_len {
            let left = if i >= bytes_per_pixel {
                row[i - bytes_per_pixel]
            } else {
                0
            };
            let up = prior_row[i];
            let up_left = if i >= bytes_per_pixel {
                prior_row[i - bytes_per_pixel]
            } else {
                0
            };
            row[i] = match tag {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add((((left as u16) + (up as u16)) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                _ => row[i],
            };
        }
        out.extend_from_slice(&row);
        prior_row = row;
    }
    out
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn spec(name: &str) -> FilterSpec {
        FilterSpec {
            name: name.to_string(),
            parms: None,
        }
    }

    #[test]
    fn flate_roundtrip() {
        let raw = b"BT /F1 12 Tf (Hello) Tj ET";
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(raw).expect("compress");
        let compressed = encoder.finish().expect("finish");
        let decoded = decode(&compressed, &[spec("FlateDecode")]).expect("decode");
        assert_eq!(decoded, raw);
    }

    #[test]
    fn flate_garbage_is_a_parse_error() {
        let err = decode(b"\xff\xfe\x00definitely-not-deflate", &[spec("FlateDecode")]);
        assert!(matches!(err, Err(Error::Parse { .. })));
    }

    #[test]
    fn ascii_hex_padding_and_terminator() {
        assert_eq!(decode(b"4>", &[spec("ASCIIHexDecode")]).unwrap(), vec![0x40]);
        assert_eq!(
            decode(b"48 65 6c 6C 6f>", &[spec("AHx")]).unwrap(),
            b"Hello".to_vec()
        );
    }

    #[test]
    fn ascii85_full_and_partial_groups() {
        assert_eq!(decode(b"<~9jqo^~>", &[spec("ASCII85Decode")]).unwrap(), b"Man ");
        assert_eq!(decode(b"9jqo~>", &[spec("A85")]).unwrap(), b"Man");
    }

    #[test]
    fn ascii85_z_shorthand() {
        assert_eq!(
            decode(b"z9jqo^~>", &[spec("ASCII85Decode")]).unwrap(),
            [&[0u8, 0, 0, 0], &b"Man "[..]].concat()
        );
    }

    struct BitWriter {
        bytes: Vec<u8>,
        bit_len: usize,
    }

    impl BitWriter {
        fn new() -> Self {
            Self {
                bytes: Vec::new(),
                bit_len: 0,
            }
        }

        fn push(&mut self, code: u32, width: usize) {
            for i in (0..width).rev() {
                if self.bit_len % 8 == 0 {
                    self.bytes.push(0);
                }
                let bit = ((code >> i) & 1) as u8;
                let last = self.bytes.last_mut().unwrap();
                *last |= bit << (7 - self.bit_len % 8);
                self.bit_len += 1;
            }
        }
    }

    #[test]
    fn lzw_literals_and_eoi() {
        let mut w = BitWriter::new();
        w.push(256, 9); // clear
        w.push(b'A' as u32, 9);
        w.push(b'B' as u32, 9);
        w.push(257, 9); // EOI
        let decoded = decode(&w.bytes, &[spec("LZWDecode")]).unwrap();
        assert_eq!(decoded, b"AB");
    }

    #[test]
    fn lzw_kwkwk_case() {
        // 256 A 258 257 decodes to "A" + "AA": code 258 is defined by its own
        // first use.
        let mut w = BitWriter::new();
        w.push(256, 9);
        w.push(b'A' as u32, 9);
        w.push(258, 9);
        w.push(257, 9);
        let decoded = decode(&w.bytes, &[spec("LZW")]).unwrap();
        assert_eq!(decoded, b"AAA");
    }

    #[test]
    fn png_up_predictor_unfilters_rows() {
        // Two 3-byte rows, filter tag 2 (Up).
        let data = vec![2, 1, 2, 3, 2, 1, 1, 1];
        let parms = HashMap::from([
            ("Predictor".to_string(), Object::Integer(12)),
            ("Columns".to_string(), Object::Integer(3)),
        ]);
        let out = apply_predictor(data, &parms);
        assert_eq!(out, vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn png_sub_predictor_uses_prior_pixel() {
        let data = vec![1, 10, 10, 10];
        let parms = HashMap::from([
            ("Predictor".to_string(), Object::Integer(11)),
            ("Columns".to_string(), Object::Integer(3)),
        ]);
        let out = apply_predictor(data, &parms);
        assert_eq!(out, vec![10, 20, 30]);
    }

    #[test]
    fn zero_columns_predictor_is_a_no_op() {
        let data = vec![9, 9, 9];
        let parms = HashMap::from([
            ("Predictor".to_string(), Object::Integer(12)),
            ("Columns".to_string(), Object::Integer(0)),
        ]);
        assert_eq!(apply_predictor(data.clone(), &parms), data);
    }

    #[test]
    fn unknown_filter_passes_through() {
        let data = b"jpeg-bytes".to_vec();
        assert_eq!(decode(&data, &[spec("DCTDecode")]).unwrap(), data);
    }
}
