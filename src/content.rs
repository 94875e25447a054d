//! Content-stream interpreter: runs the PDF text state machine over a page's
//! (and its Form XObjects') content and emits positioned text runs.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::fonts::{self, FontInfo};
use crate::model::Object;
use crate::tokenizer::{Lexer, Token};

const MAX_FORM_DEPTH: usize = 10;

/// One emission of `Tj` / `TJ` / `'` / `"`: decoded text plus the device
/// position and metrics the assembler sorts and spaces by.
#[derive(Debug, Clone)]
pub struct TextItem {
    pub text: String,
    pub x: f64,
    pub y: f64,
    /// Font size scaled by the text matrix.
    pub font_size: f64,
    pub base_font: String,
    /// Rendered width in device units.
    pub width: f64,
    /// Counter bumped at every `BT`; keeps per-text-object runs grouped
    /// through the reading-order sort.
    pub text_object: u32,
    pub has_metric_width: bool,
}

/// A `/Link` annotation target: its normalized rectangle and URI.
#[derive(Debug, Clone)]
pub struct LinkRect {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub uri: String,
}

impl LinkRect {
    pub(crate) fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

/// 3x2 affine matrix in PDF's row-vector convention: composition order is
/// always `new · current`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub(crate) fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub(crate) fn translate(tx: f64, ty: f64) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::identity()
        }
    }

    pub(crate) fn multiply(self, current: Matrix) -> Matrix {
        Matrix {
            a: self.a * current.a + self.b * current.c,
            b: self.a * current.b + self.b * current.d,
            c: self.c * current.a + self.d * current.c,
            d: self.c * current.b + self.d * current.d,
            e: self.e * current.a + self.f * current.c + current.e,
            f: self.e * current.b + self.f * current.d + current.f,
        }
    }
}

#[derive(Clone)]
struct TextState {
    font: Option<Rc<FontInfo>>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horiz_scaling: f64,
    leading: f64,
    rise: f64,
    render_mode: i64,
    tm: Matrix,
    tlm: Matrix,
}

impl TextState {
    fn new() -> Self {
        Self {
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horiz_scaling: 100.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
            tm: Matrix::identity(),
            tlm: Matrix::identity(),
        }
    }
}

/// Extract the positioned runs of one page, recursing through Form XObjects.
pub(crate) fn page_items(doc: &Document, index: usize) -> Result<Vec<TextItem>> {
    let page = doc
        .page(index)
        .ok_or_else(|| Error::parse(format!("page {} does not exist", index + 1)))?
        .clone();
    let dict = page
        .as_dict()
        .ok_or_else(|| Error::parse("page object is not a dictionary"))?;

    let resources = match dict.get("Resources").map(|r| doc.resolve(r)) {
        Some(Object::Dictionary(resources)) => Some(resources),
        _ => None,
    };
    let content = page_content_bytes(doc, dict)?;

    let mut items = Vec::new();
    let mut text_object = 0u32;
    run_content(
        doc,
        resources.as_ref(),
        &content,
        Matrix::identity(),
        TextState::new(),
        0,
        &mut text_object,
        &mut items,
    );
    Ok(items)
}

/// Concatenate the page's content streams (`/Contents` may be one stream or
/// an array of streams).
fn page_content_bytes(doc: &Document, page: &HashMap<String, Object>) -> Result<Vec<u8>> {
    let Some(contents) = page.get("Contents") else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    match doc.resolve(contents) {
        Object::Array(parts) => {
            for part in &parts {
                out.extend_from_slice(&doc.decode_stream(part)?);
                out.push(b'\n');
            }
        }
        stream @ Object::Stream { .. } => {
            out = doc.decode_stream(&stream)?;
        }
        _ => {}
    }
    Ok(out)
}

/// `Link` annotations of a page: `/Subtype /Link`, `/A` with `/S /URI`.
pub(crate) fn page_links(doc: &Document, index: usize) -> Vec<LinkRect> {
    let mut out = Vec::new();
    let Some(dict) = doc.page(index).and_then(Object::as_dict) else {
        return out;
    };
    let Some(Object::Array(annots)) = dict.get("Annots").map(|a| doc.resolve(a)) else {
        return out;
    };
    for annot in &annots {
        let annot = doc.resolve(annot);
        let Some(adict) = annot.as_dict() else { continue };
        if adict.get("Subtype").and_then(Object::as_name) != Some("Link") {
            continue;
        }
        let Some(action) = adict.get("A").map(|a| doc.resolve(a)) else {
            continue;
        };
        let Some(action) = action.as_dict() else { continue };
        if action.get("S").and_then(Object::as_name) != Some("URI") {
            continue;
        }
        let uri = match action.get("URI").map(|u| doc.resolve(u)) {
            // URIs are 7-bit by spec; Latin-1 keeps damaged ones readable.
            Some(Object::String(bytes)) => bytes.iter().map(|&b| b as char).collect::<String>(),
            _ => continue,
        };
        let Some(rect) = adict.get("Rect").map(|r| doc.resolve(r)) else {
            continue;
        };
        let Some(rect) = rect.as_array() else { continue };
        if rect.len() < 4 {
            continue;
        }
        let coords: Vec<f64> = rect.iter().filter_map(Object::as_f64).collect();
        if coords.len() < 4 {
            continue;
        }
        out.push(LinkRect {
            x_min: coords[0].min(coords[2]),
            y_min: coords[1].min(coords[3]),
            x_max: coords[0].max(coords[2]),
            y_max: coords[1].max(coords[3]),
            uri,
        });
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn run_content(
    doc: &Document,
    resources: Option<&HashMap<String, Object>>,
    content: &[u8],
    ctm_initial: Matrix,
    state_initial: TextState,
    depth: usize,
    text_object: &mut u32,
    items: &mut Vec<TextItem>,
) {
    let fonts = fonts::build_font_map(doc, resources);
    let xobjects = resources
        .and_then(|r| r.get("XObject"))
        .map(|x| doc.resolve(x))
        .and_then(|x| x.as_dict().cloned());
    let ext_gstates = resources
        .and_then(|r| r.get("ExtGState"))
        .map(|g| doc.resolve(g))
        .and_then(|g| g.as_dict().cloned());

    let mut ctm = ctm_initial;
    let mut state = state_initial;
    let mut stack: Vec<(TextState, Matrix)> = Vec::new();
    let mut reader = OpReader::new(content);
    let mut operands: Vec<Object> = Vec::with_capacity(8);

    while let Some(op) = reader.next_op(&mut operands) {
        match op.as_str() {
            "BT" => {
                state.tm = Matrix::identity();
                state.tlm = Matrix::identity();
                *text_object += 1;
            }
            "ET" => {}
            "Tf" => {
                if operands.len() >= 2 {
                    if let Some(name) = operands[0].as_name() {
                        state.font = fonts.get(name).cloned();
                    }
                    state.font_size = num(&operands[1]);
                }
            }
            "Tc" => set_from_operand(&operands, &mut state.char_spacing),
            "Tw" => set_from_operand(&operands, &mut state.word_spacing),
            "Tz" => set_from_operand(&operands, &mut state.horiz_scaling),
            "TL" => set_from_operand(&operands, &mut state.leading),
            "Ts" => set_from_operand(&operands, &mut state.rise),
            "Tr" => state.render_mode = operands.first().and_then(Object::as_i64).unwrap_or(0),
            "Td" => {
                if operands.len() == 2 {
                    translate_line(&mut state, num(&operands[0]), num(&operands[1]));
                }
            }
            "TD" => {
                if operands.len() == 2 {
                    state.leading = -num(&operands[1]);
                    translate_line(&mut state, num(&operands[0]), num(&operands[1]));
                }
            }
            "Tm" => {
                if operands.len() == 6 {
                    let m = matrix_from_operands(&operands);
                    state.tm = m;
                    state.tlm = m;
                }
            }
            "T*" => next_line(&mut state),
            "Tj" => {
                if let Some(Object::String(bytes)) = operands.first() {
                    emit_run(doc, &mut state, &ctm, bytes, *text_object, items);
                }
            }
            "'" => {
                next_line(&mut state);
                if let Some(Object::String(bytes)) = operands.first() {
                    emit_run(doc, &mut state, &ctm, bytes, *text_object, items);
                }
            }
            "\"" => {
                if operands.len() >= 3 {
                    state.word_spacing = num(&operands[0]);
                    state.char_spacing = num(&operands[1]);
                    next_line(&mut state);
                    if let Some(Object::String(bytes)) = operands.get(2) {
                        emit_run(doc, &mut state, &ctm, bytes, *text_object, items);
                    }
                }
            }
            "TJ" => {
                if let Some(Object::Array(parts)) = operands.first() {
                    for part in parts {
                        match part {
                            Object::String(bytes) => {
                                emit_run(doc, &mut state, &ctm, bytes, *text_object, items);
                            }
                            Object::Integer(_) | Object::Real(_) => {
                                let adjust = part.as_f64().unwrap_or(0.0);
                                state.tm.e -= (adjust / 1000.0)
                                    * state.font_size
                                    * (state.horiz_scaling / 100.0);
                            }
                            _ => {}
                        }
                    }
                }
            }
            "q" => stack.push((state.clone(), ctm)),
            "Q" => {
                if let Some((prev_state, prev_ctm)) = stack.pop() {
                    state = prev_state;
                    ctm = prev_ctm;
                }
            }
            "cm" => {
                if operands.len() == 6 {
                    ctm = matrix_from_operands(&operands).multiply(ctm);
                }
            }
            "gs" => {
                if let (Some(Object::Name(name)), Some(gstates)) =
                    (operands.first(), ext_gstates.as_ref())
                {
                    apply_ext_gstate(doc, gstates, name, &mut state);
                }
            }
            "Do" => {
                if let (Some(Object::Name(name)), Some(xobjects)) =
                    (operands.first(), xobjects.as_ref())
                {
                    run_form_xobject(
                        doc,
                        resources,
                        xobjects,
                        name,
                        ctm,
                        &state,
                        depth,
                        text_object,
                        items,
                    );
                }
            }
            _ => {}
        }
    }
}

fn translate_line(state: &mut TextState, tx: f64, ty: f64) {
    state.tlm = Matrix::translate(tx, ty).multiply(state.tlm);
    state.tm = state.tlm;
}

fn next_line(state: &mut TextState) {
    let leading = state.leading;
    translate_line_by(state, -leading);
}

fn translate_line_by(state: &mut TextState, ty: f64) {
    state.tlm = Matrix::translate(0.0, ty).multiply(state.tlm);
    state.tm = state.tlm;
}

fn emit_run(
    doc: &Document,
    state: &mut TextState,
    ctm: &Matrix,
    bytes: &[u8],
    text_object: u32,
    items: &mut Vec<TextItem>,
) {
    let Some(font) = state.font.clone() else {
        return;
    };
    let decoded = font.decode(bytes);

    let invisible = state.render_mode == 3 && !doc.options().include_invisible_text;
    if !decoded.text.is_empty() && !invisible {
        let tm = state.tm;
        // The only valid device mapping: (e, f) through the CTM.
        let x = tm.e * ctm.a + tm.f * ctm.c + ctm.e;
        let y = tm.e * ctm.b + tm.f * ctm.d + ctm.f;
        let scale = if tm.d != 0.0 { tm.d.abs() } else { tm.a.abs() };
        items.push(TextItem {
            text: decoded.text,
            x,
            y,
            font_size: state.font_size * scale,
            base_font: font.base_font.clone(),
            width: decoded.width_ems * state.font_size * tm.a.abs(),
            text_object,
            has_metric_width: font.has_metric_widths(),
        });
    }

    let advance = (decoded.width_ems * state.font_size
        + decoded.char_count as f64 * state.char_spacing
        + decoded.space_count as f64 * state.word_spacing)
        * (state.horiz_scaling / 100.0);
    state.tm.e += advance;
}

fn apply_ext_gstate(
    doc: &Document,
    gstates: &HashMap<String, Object>,
    name: &str,
    state: &mut TextState,
) {
    let Some(Object::Dictionary(gstate)) = gstates.get(name).map(|g| doc.resolve(g)) else {
        return;
    };
    let Some(Object::Array(font_entry)) = gstate.get("Font").map(|f| doc.resolve(f)) else {
        return;
    };
    if font_entry.len() != 2 {
        return;
    }
    if let Some(info) = fonts::build_font_info(doc, &font_entry[0]) {
        state.font = Some(Rc::new(info));
        state.font_size = font_entry[1].as_f64().unwrap_or(state.font_size);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_form_xobject(
    doc: &Document,
    resources: Option<&HashMap<String, Object>>,
    xobjects: &HashMap<String, Object>,
    name: &str,
    ctm: Matrix,
    state: &TextState,
    depth: usize,
    text_object: &mut u32,
    items: &mut Vec<TextItem>,
) {
    if depth >= MAX_FORM_DEPTH {
        debug!("form XObject recursion depth reached, skipping {}", name);
        return;
    }
    let Some(xobj) = xobjects.get(name).map(|x| doc.resolve(x)) else {
        return;
    };
    let Object::Stream { dict, .. } = &xobj else {
        return;
    };
    if dict.get("Subtype").and_then(Object::as_name) != Some("Form") {
        return;
    }
    let Some(content) = doc.decode_stream_tolerant(&xobj) else {
        return;
    };

    let form_matrix = dict
        .get("Matrix")
        .map(|m| doc.resolve(m))
        .and_then(|m| m.as_array().and_then(matrix_from_array))
        .unwrap_or_else(Matrix::identity);
    // The form's own resources shadow the parent's.
    let form_resources = match dict.get("Resources").map(|r| doc.resolve(r)) {
        Some(Object::Dictionary(own)) => Some(own),
        _ => resources.cloned(),
    };

    run_content(
        doc,
        form_resources.as_ref(),
        &content,
        form_matrix.multiply(ctm),
        state.clone(),
        depth + 1,
        text_object,
        items,
    );
}

fn matrix_from_operands(operands: &[Object]) -> Matrix {
    Matrix {
        a: num(&operands[0]),
        b: num(&operands[1]),
        c: num(&operands[2]),
        d: num(&operands[3]),
        e: num(&operands[4]),
        f: num(&operands[5]),
    }
}

fn matrix_from_array(entries: &[Object]) -> Option<Matrix> {
    if entries.len() != 6 {
        return None;
    }
    Some(Matrix {
        a: entries[0].as_f64()?,
        b: entries[1].as_f64()?,
        c: entries[2].as_f64()?,
        d: entries[3].as_f64()?,
        e: entries[4].as_f64()?,
        f: entries[5].as_f64()?,
    })
}

fn num(obj: &Object) -> f64 {
    obj.as_f64().unwrap_or(0.0)
}

fn set_from_operand(operands: &[Object], slot: &mut f64) {
    if let Some(value) = operands.first().and_then(Object::as_f64) {
        *slot = value;
    }
}

/// Pull operator + operands pairs out of a content stream. Inline images
/// (`BI … ID … EI`) are skipped wholesale.
struct OpReader<'a> {
    lexer: Lexer<'a>,
}

impl<'a> OpReader<'a> {
    fn new(content: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(content),
        }
    }

    fn next_op(&mut self, operands: &mut Vec<Object>) -> Option<String> {
        operands.clear();
        while let Some(token) = self.lexer.next_token() {
            match token {
                Token::Keyword(op) => {
                    if op == "BI" {
                        self.skip_inline_image();
                        operands.clear();
                        continue;
                    }
                    return Some(op);
                }
                other => {
                    if let Some(obj) = self.operand_from_token(other) {
                        operands.push(obj);
                    }
                }
            }
        }
        None
    }

    fn operand_from_token(&mut self, token: Token) -> Option<Object> {
        match token {
            Token::Null => Some(Object::Null),
            Token::Boolean(v) => Some(Object::Boolean(v)),
            Token::Integer(v) => Some(Object::Integer(v)),
            Token::Real(v) => Some(Object::Real(v)),
            Token::String(v) => Some(Object::String(v)),
            Token::HexString(v) => Some(Object::String(v)),
            Token::Name(v) => Some(Object::Name(v)),
            Token::ArrayStart => {
                let mut parts = Vec::new();
                while let Some(inner) = self.lexer.next_token() {
                    if inner == Token::ArrayEnd {
                        break;
                    }
                    if let Some(obj) = self.operand_from_token(inner) {
                        parts.push(obj);
                    }
                }
                Some(Object::Array(parts))
            }
            Token::DictStart => {
                // Inline-image and marked-content dictionaries: parse and
                // discard structure, keeping operand parity intact.
                let mut dict = HashMap::new();
                loop {
                    let key = match self.lexer.next_token() {
                        Some(Token::Name(key)) => key,
                        Some(Token::DictEnd) | None => break,
                        Some(_) => continue,
                    };
                    let Some(value_token) = self.lexer.next_token() else {
                        break;
                    };
                    if value_token == Token::DictEnd {
                        break;
                    }
                    if let Some(value) = self.operand_from_token(value_token) {
                        dict.insert(key, value);
                    }
                }
                Some(Object::Dictionary(dict))
            }
            _ => None,
        }
    }

    fn skip_inline_image(&mut self) {
        while let Some(token) = self.lexer.next_token() {
            if let Token::Keyword(op) = token {
                if op == "ID" {
                    self.lexer.skip_inline_image_data();
                    return;
                }
            }
        }
    }
}
