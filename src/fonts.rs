//! Per-font resolution: ToUnicode CMaps, encoding vectors, `/Differences`
//! overrides, simple and CID width tables, and the byte-string decode used
//! by the content interpreter.

use std::collections::HashMap;
use std::rc::Rc;

use crate::cmap::{self, ToUnicodeCMap};
use crate::document::Document;
use crate::encoding;
use crate::model::Object;

const SIMPLE_DEFAULT_WIDTH: f64 = 600.0;
const CID_DEFAULT_WIDTH: f64 = 1000.0;

#[derive(Debug, Clone)]
pub(crate) struct CidWidthRange {
    start: u32,
    end: u32,
    width: f64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FontInfo {
    pub base_font: String,
    to_unicode: Option<ToUnicodeCMap>,
    encoding: Option<&'static [u16; 256]>,
    differences: HashMap<u32, char>,
    pub is_identity: bool,
    first_char: i64,
    widths: Vec<f64>,
    cid_widths: Vec<CidWidthRange>,
    default_width: f64,
}

/// Decoded run of one show-string: the Unicode text plus the metrics the
/// interpreter needs to advance the text matrix.
#[derive(Debug, Default)]
pub(crate) struct DecodedText {
    pub text: String,
    /// Total glyph width in ems (width table units / 1000).
    pub width_ems: f64,
    pub char_count: usize,
    pub space_count: usize,
}

impl FontInfo {
    /// Decode a show-string's bytes, picking the first applicable rule:
    /// ToUnicode, then Differences/base encoding, then two-byte identity,
    /// then plain ASCII passthrough.
    pub(crate) fn decode(&self, bytes: &[u8]) -> DecodedText {
        let mut out = DecodedText::default();
        if let Some(cmap) = &self.to_unicode {
            self.for_each_code(bytes, |code| {
                match cmap.lookup(code) {
                    Some(mapped) => out.text.push_str(mapped),
                    // Unmapped printable codes pass through as themselves.
                    None => {
                        if code >= 0x20 {
                            if let Some(ch) = char::from_u32(code) {
                                out.text.push(ch);
                            }
                        }
                    }
                }
                self.account(code, &mut out);
            });
            return out;
        }

        if self.encoding.is_some() || !self.differences.is_empty() {
            for &byte in bytes {
                let code = byte as u32;
                if let Some(&ch) = self.differences.get(&code) {
                    out.text.push(ch);
                } else if let Some(ch) = self
                    .encoding
                    .and_then(|table| encoding::vector_char(table, code))
                {
                    out.text.push(ch);
                } else if (0x20..=0x7E).contains(&byte) {
                    out.text.push(byte as char);
                }
                self.account(code, &mut out);
            }
            return out;
        }

        if self.is_identity {
            self.for_each_code(bytes, |code| {
                if code >= 0x20 {
                    if let Some(ch) = char::from_u32(code) {
                        out.text.push(ch);
                    }
                }
                self.account(code, &mut out);
            });
            return out;
        }

        for &byte in bytes {
            if byte >= 0x20 {
                out.text.push(byte as char);
            }
            self.account(byte as u32, &mut out);
        }
        out
    }

    fn for_each_code<F: FnMut(u32)>(&self, bytes: &[u8], mut f: F) {
        if self.is_identity {
            let mut chunks = bytes.chunks_exact(2);
            for pair in &mut chunks {
                f(u16::from_be_bytes([pair[0], pair[1]]) as u32);
            }
            if let [last] = chunks.remainder() {
                f(*last as u32);
            }
        } else {
            for &byte in bytes {
                f(byte as u32);
            }
        }
    }

    fn account(&self, code: u32, out: &mut DecodedText) {
        out.width_ems += self.width_units(code) / 1000.0;
        out.char_count += 1;
        // Word spacing applies to the single-byte space code only.
        if code == 32 {
            out.space_count += 1;
        }
    }

    fn width_units(&self, code: u32) -> f64 {
        let index = code as i64 - self.first_char;
        if index >= 0 && (index as usize) < self.widths.len() {
            let width = self.widths[index as usize];
            if width > 0.0 {
                return width;
            }
        }
        for range in &self.cid_widths {
            if code >= range.start && code <= range.end {
                return range.width;
            }
        }
        self.default_width
    }

    /// True when the font carries real metrics rather than the fallback
    /// default width.
    pub(crate) fn has_metric_widths(&self) -> bool {
        !self.widths.is_empty() || !self.cid_widths.is_empty()
    }
}

pub(crate) fn build_font_map(
    doc: &Document,
    resources: Option<&HashMap<String, Object>>,
) -> HashMap<String, Rc<FontInfo>> {
    let mut out = HashMap::new();
    let Some(resources) = resources else {
        return out;
    };
    let font_dict = match resources.get("Font").map(|f| doc.resolve(f)) {
        Some(Object::Dictionary(dict)) => dict,
        _ => return out,
    };
    for (name, font_obj) in &font_dict {
        if let Some(info) = build_font_info(doc, font_obj) {
            out.insert(name.clone(), Rc::new(info));
        }
    }
    out
}

pub(crate) fn build_font_info(doc: &Document, font_obj: &Object) -> Option<FontInfo> {
    let font = doc.resolve(font_obj);
    let dict = font.as_dict()?;

    let base_font = dict
        .get("BaseFont")
        .and_then(Object::as_name)
        .unwrap_or_default()
        .to_string();
    let subtype = dict.get("Subtype").and_then(Object::as_name);
    let is_type0 = subtype == Some("Type0");

    let to_unicode = dict
        .get("ToUnicode")
        .and_then(|obj| doc.decode_stream_tolerant(obj))
        .map(|data| cmap::parse_cmap(&data))
        .filter(|cmap| !cmap.is_empty());

    let mut info = FontInfo {
        base_font,
        to_unicode,
        encoding: None,
        differences: HashMap::new(),
        is_identity: is_type0,
        first_char: 0,
        widths: Vec::new(),
        cid_widths: Vec::new(),
        default_width: SIMPLE_DEFAULT_WIDTH,
    };

    if is_type0 {
        build_cid_metrics(doc, dict, &mut info);
        return Some(info);
    }

    match dict.get("Encoding").map(|e| doc.resolve(e)) {
        Some(Object::Name(name)) => info.encoding = encoding::encoding_vector(&name),
        Some(Object::Dictionary(enc_dict)) => {
            info.encoding = enc_dict
                .get("BaseEncoding")
                .and_then(Object::as_name)
                .and_then(encoding::encoding_vector);
            if let Some(differences) = enc_dict.get("Differences").map(|d| doc.resolve(d)) {
                parse_differences(&differences, &mut info.differences);
            }
            if info.encoding.is_none() && info.differences.is_empty() {
                info.encoding = Some(&encoding::WIN_ANSI);
            }
        }
        _ => {
            // No /Encoding: WinAnsi is the fallback for simple fonts.
            info.encoding = Some(&encoding::WIN_ANSI);
        }
    }
    if info.encoding.is_none() && !info.differences.is_empty() {
        info.encoding = Some(&encoding::WIN_ANSI);
    }

    info.first_char = dict
        .get("FirstChar")
        .map(|v| doc.resolve(v))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    info.widths = match dict.get("Widths").map(|w| doc.resolve(w)) {
        Some(Object::Array(widths)) => widths
            .iter()
            .map(|w| doc.resolve(w).as_f64().unwrap_or(0.0))
            .collect(),
        _ => Vec::new(),
    };

    let missing_width = font_descriptor_missing_width(doc, dict);
    info.default_width = missing_width.unwrap_or(SIMPLE_DEFAULT_WIDTH);
    apply_mean_width_fallback(&mut info);
    Some(info)
}

fn build_cid_metrics(doc: &Document, dict: &HashMap<String, Object>, info: &mut FontInfo) {
    let descendant = dict
        .get("DescendantFonts")
        .map(|d| doc.resolve(d))
        .and_then(|d| d.as_array().and_then(|arr| arr.first().cloned()))
        .map(|first| doc.resolve(&first));
    let Some(descendant_dict) = descendant.as_ref().and_then(Object::as_dict) else {
        info.default_width = CID_DEFAULT_WIDTH;
        return;
    };

    let dw = descendant_dict
        .get("DW")
        .map(|v| doc.resolve(v))
        .and_then(|v| v.as_f64())
        .unwrap_or(CID_DEFAULT_WIDTH);
    if let Some(w) = descendant_dict.get("W").map(|w| doc.resolve(w)) {
        if let Object::Array(entries) = w {
            let resolved: Vec<Object> = entries.iter().map(|e| doc.resolve(e)).collect();
            info.cid_widths = parse_cid_widths(&resolved);
        }
    }
    // MissingWidth tightens the /DW default when the descriptor carries it.
    info.default_width = font_descriptor_missing_width(doc, descendant_dict).unwrap_or(dw);
    apply_mean_width_fallback(info);
}

fn font_descriptor_missing_width(doc: &Document, dict: &HashMap<String, Object>) -> Option<f64> {
    let descriptor = dict.get("FontDescriptor").map(|d| doc.resolve(d))?;
    descriptor
        .as_dict()?
        .get("MissingWidth")
        .map(|v| doc.resolve(v))
        .and_then(|v| v.as_f64())
}

/// A zero default with explicit widths present would make every unmapped
/// glyph collapse to zero advance; substitute the mean instead.
fn apply_mean_width_fallback(info: &mut FontInfo) {
    if info.default_width != 0.0 {
        return;
    }
    let explicit: Vec<f64> = info
        .widths
        .iter()
        .copied()
        .chain(info.cid_widths.iter().map(|r| r.width))
        .filter(|w| *w > 0.0)
        .collect();
    if !explicit.is_empty() {
        info.default_width = explicit.iter().sum::<f64>() / explicit.len() as f64;
    }
}

fn parse_differences(differences: &Object, out: &mut HashMap<u32, char>) {
    let Some(entries) = differences.as_array() else {
        return;
    };
    let mut next_code: Option<u32> = None;
    for entry in entries {
        match entry {
            Object::Integer(code) if (0..=255).contains(code) => {
                next_code = Some(*code as u32);
            }
            Object::Name(glyph_name) => {
                if let Some(code) = next_code {
                    if let Some(ch) = encoding::glyph_name_to_char(glyph_name) {
                        out.insert(code, ch);
                    }
                    next_code = if code < 255 { Some(code + 1) } else { None };
                }
            }
            _ => {}
        }
    }
}

/// `/W` array: `start [w1 w2 ...]` lists per-code widths, `start end w`
/// spans a range.
fn parse_cid_widths(entries: &[Object]) -> Vec<CidWidthRange> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let Some(start) = entries[i].as_i64().filter(|v| *v >= 0) else {
            i += 1;
            continue;
        };
        let start = start as u32;
        match entries.get(i + 1) {
            Some(Object::Array(widths)) => {
                let mut code = start;
                for width in widths {
                    if let Some(width) = width.as_f64() {
                        out.push(CidWidthRange {
                            start: code,
                            end: code,
                            width,
                        });
                    }
                    code = code.saturating_add(1);
                }
                i += 2;
            }
            Some(end_obj) if end_obj.as_i64().is_some() => {
                let end = end_obj.as_i64().unwrap_or(start as i64).max(0) as u32;
                let Some(width) = entries.get(i + 2).and_then(Object::as_f64) else {
                    break;
                };
                out.push(CidWidthRange {
                    start,
                    end: end.max(start),
                    width,
                });
                i += 3;
            }
            _ => i += 1,
        }
    }
    out
}
