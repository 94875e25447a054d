//! Document bootstrap and on-demand object resolution.
//!
//! A `Document` owns the input bytes, the merged xref table, the trailer and
//! an object cache keyed by `(obj_num, gen_num)`. Objects are parsed lazily
//! from their xref offsets, decrypted in place when a security handler is
//! active, and cached immutably. Pages borrow the document, so handles can
//! never outlive the buffer they point into.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::assemble;
use crate::content;
use crate::encoding;
use crate::error::{Error, Result};
use crate::filters::{self, FilterSpec};
use crate::markdown;
use crate::model::Object;
use crate::parser::{self, ObjectParser};
use crate::pdf_crypto::{CryptoError, Encryption};
use crate::tokenizer::{Lexer, Token};
use crate::xref::{self, XrefEntry};

const MAX_RESOLVE_DEPTH: usize = 100;
const MAX_XREF_SECTIONS: usize = 64;

/// Extraction configuration, fixed at parse time.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Separator between page texts in [`Document::text`].
    pub page_separator: String,
    /// Remove DocuSign/IIO-style anchor tokens from assembled text.
    pub strip_form_placeholders: bool,
    /// Keep runs drawn with text render mode 3.
    pub include_invisible_text: bool,
    /// Reserved. Only the empty password is ever attempted; a document that
    /// needs a real one is reported as unsupported regardless of this value.
    pub password: Option<Vec<u8>>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            page_separator: "\n\n".to_string(),
            strip_form_placeholders: true,
            include_invisible_text: false,
            password: None,
        }
    }
}

/// Document information dictionary fields, plus the page count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub mod_date: Option<String>,
    pub page_count: usize,
}

#[derive(Debug)]
pub struct Document {
    data: Vec<u8>,
    xref: HashMap<u32, XrefEntry>,
    trailer: HashMap<String, Object>,
    encryption: Option<Encryption>,
    cache: RefCell<HashMap<(u32, u16), Object>>,
    loading: RefCell<HashSet<(u32, u16)>>,
    pages: Vec<Object>,
    options: LoadOptions,
}

impl Document {
    pub fn parse(data: Vec<u8>) -> Result<Document> {
        Self::parse_with_options(data, LoadOptions::default())
    }

    pub fn parse_with_options(data: Vec<u8>, options: LoadOptions) -> Result<Document> {
        let header_window = &data[..data.len().min(1024)];
        if memchr::memmem::find(header_window, b"%PDF-").is_none() {
            debug!("no %PDF- header in the first 1 KiB, relying on xref position");
        }

        let mut doc = Document {
            data,
            xref: HashMap::new(),
            trailer: HashMap::new(),
            encryption: None,
            cache: RefCell::new(HashMap::new()),
            loading: RefCell::new(HashSet::new()),
            pages: Vec::new(),
            options,
        };

        if let Err(err) = doc.load_xref_chain() {
            warn!("xref chain unusable ({}), scanning for objects", err);
            doc.recover_by_scan();
        } else if !doc.trailer.contains_key("Root") {
            warn!("trailer chain has no /Root, scanning for objects");
            doc.recover_by_scan();
        }
        if !doc.trailer.contains_key("Root") {
            return Err(Error::parse("document has no /Root catalog"));
        }

        doc.setup_encryption()?;
        doc.collect_pages();
        Ok(doc)
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub(crate) fn page(&self, index: usize) -> Option<&Object> {
        self.pages.get(index)
    }

    /// Plain text for one page (1-based pages are exposed as 0-based
    /// indices). Structural failures inside the page surface here.
    pub fn page_text(&self, index: usize) -> Result<String> {
        let items = content::page_items(self, index)?;
        Ok(assemble::assemble_text(&items, &self.options))
    }

    /// Positioned text runs for one page, in content-stream order.
    pub fn page_items(&self, index: usize) -> Result<Vec<content::TextItem>> {
        content::page_items(self, index)
    }

    /// Structured lines for one page, with styling spans and link targets.
    pub fn page_lines(&self, index: usize) -> Result<Vec<assemble::Line>> {
        let items = content::page_items(self, index)?;
        let links = content::page_links(self, index);
        Ok(assemble::assemble_lines(&items, &links, &self.options))
    }

    /// Whole-document plain text. Pages whose extraction failed are skipped
    /// (their errors remain reachable through [`Document::page_text`]), and
    /// empty pages do not contribute separators.
    pub fn text(&self) -> String {
        let mut pages = Vec::new();
        for index in 0..self.page_count() {
            match self.page_text(index) {
                Ok(text) if !text.is_empty() => pages.push(text),
                Ok(_) => {}
                Err(err) => warn!("skipping page {}: {}", index + 1, err),
            }
        }
        pages.join(&self.options.page_separator)
    }

    /// Whole-document GitHub-flavored Markdown.
    pub fn markdown(&self) -> String {
        markdown::render_document(self)
    }

    pub fn metadata(&self) -> Metadata {
        let mut out = Metadata {
            page_count: self.page_count(),
            ..Metadata::default()
        };
        let info = match self.trailer.get("Info").map(|obj| self.resolve(obj)) {
            Some(Object::Dictionary(dict)) => dict,
            _ => return out,
        };
        let text_field = |key: &str| -> Option<String> {
            info.get(key)
                .map(|obj| self.resolve(obj))
                .and_then(|obj| match obj {
                    Object::String(bytes) => Some(encoding::decode_text_string(&bytes)),
                    _ => None,
                })
        };
        out.title = text_field("Title");
        out.author = text_field("Author");
        out.subject = text_field("Subject");
        out.keywords = text_field("Keywords");
        out.creator = text_field("Creator");
        out.producer = text_field("Producer");
        out.creation_date = text_field("CreationDate");
        out.mod_date = text_field("ModDate");
        out
    }

    /// Fetch an object by number, parsing and decrypting on first use.
    /// Failures yield `Null`; object-level damage never aborts the document.
    pub fn get_object(&self, obj_num: u32, gen_num: u16) -> Object {
        if let Some(cached) = self.cache.borrow().get(&(obj_num, gen_num)) {
            return cached.clone();
        }
        if !self.loading.borrow_mut().insert((obj_num, gen_num)) {
            // An object stream that claims to contain itself.
            return Object::Null;
        }
        let parsed = self.load_object(obj_num, gen_num).unwrap_or(Object::Null);
        self.loading.borrow_mut().remove(&(obj_num, gen_num));
        self.cache
            .borrow_mut()
            .insert((obj_num, gen_num), parsed.clone());
        parsed
    }

    /// Follow references through the cache. Resolution depth is capped; at
    /// the cap a cycle resolves to `Null` instead of looping.
    pub fn resolve(&self, obj: &Object) -> Object {
        self.resolve_depth(obj, 0)
    }

    fn resolve_depth(&self, obj: &Object, depth: usize) -> Object {
        if depth >= MAX_RESOLVE_DEPTH {
            return Object::Null;
        }
        match obj {
            Object::Reference { obj_num, gen_num } => {
                let target = self.get_object(*obj_num, *gen_num);
                match target {
                    Object::Reference { .. } => self.resolve_depth(&target, depth + 1),
                    other => other,
                }
            }
            other => other.clone(),
        }
    }

    /// Decode a stream object's payload through its filter chain.
    pub(crate) fn decode_stream(&self, obj: &Object) -> Result<Vec<u8>> {
        match self.resolve(obj) {
            Object::Stream { dict, data } => filters::decode(&data, &self.filter_specs(&dict)),
            _ => Err(Error::parse("expected a stream object")),
        }
    }

    /// Like [`decode_stream`], but content-tolerant: damage yields `None`.
    pub(crate) fn decode_stream_tolerant(&self, obj: &Object) -> Option<Vec<u8>> {
        self.decode_stream(obj).ok()
    }

    fn filter_specs(&self, dict: &HashMap<String, Object>) -> Vec<FilterSpec> {
        let parms_obj = dict
            .get("DecodeParms")
            .or_else(|| dict.get("DP"))
            .map(|p| self.resolve(p));
        let parms_for = |i: usize| -> Option<HashMap<String, Object>> {
            match &parms_obj {
                Some(Object::Dictionary(d)) if i == 0 => Some(d.clone()),
                Some(Object::Array(arr)) => arr
                    .get(i)
                    .map(|entry| self.resolve(entry))
                    .and_then(|entry| entry.as_dict().cloned()),
                _ => None,
            }
        };
        match dict.get("Filter").map(|f| self.resolve(f)) {
            Some(Object::Name(name)) => vec![FilterSpec {
                name,
                parms: parms_for(0),
            }],
            Some(Object::Array(arr)) => arr
                .iter()
                .enumerate()
                .filter_map(|(i, entry)| {
                    self.resolve(entry).as_name().map(|name| FilterSpec {
                        name: name.to_string(),
                        parms: parms_for(i),
                    })
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn load_xref_chain(&mut self) -> Result<()> {
        let lexer = Lexer::new(&self.data);
        let marker = lexer
            .find_last(b"startxref")
            .ok_or_else(|| Error::parse("no startxref marker"))?;
        let mut tail = Lexer::new(&self.data);
        tail.set_position(marker + b"startxref".len());
        let first_offset = match tail.next_token() {
            Some(Token::Integer(v)) if v >= 0 => v as usize,
            _ => return Err(Error::parse_at("no offset after startxref", marker)),
        };

        let mut visited = HashSet::new();
        let mut next = Some(first_offset);
        let mut is_newest = true;
        while let Some(offset) = next {
            if !visited.insert(offset) || visited.len() > MAX_XREF_SECTIONS {
                warn!("circular or runaway /Prev chain, stopping at {}", offset);
                break;
            }
            let section = match xref::parse_section_at(&self.data, offset) {
                Ok(section) => section,
                Err(err) if is_newest => return Err(err),
                Err(err) => {
                    // An older update being damaged only loses stale entries.
                    warn!("skipping damaged /Prev section at {}: {}", offset, err);
                    break;
                }
            };
            is_newest = false;
            for (num, entry) in section.entries {
                self.xref.entry(num).or_insert(entry);
            }
            for (key, value) in section.trailer {
                self.trailer.entry(key).or_insert(value);
            }
            next = section.prev;
        }
        Ok(())
    }

    fn recover_by_scan(&mut self) {
        self.xref.clear();
        self.trailer.clear();
        self.cache.borrow_mut().clear();
        let (entries, trailer) = xref::scan_objects(&self.data);
        debug!("recovery scan indexed {} objects", entries.len());
        self.xref = entries;
        if let Some(trailer) = trailer {
            self.trailer = trailer;
        }
        self.index_scanned_object_streams();
    }

    /// After a recovery scan, object streams still hide compressed objects.
    /// Register their members as compressed entries, gaps only.
    fn index_scanned_object_streams(&mut self) {
        let mut container_nums: Vec<u32> = self
            .xref
            .iter()
            .filter_map(|(num, entry)| match entry {
                XrefEntry::InUse { .. } => Some(*num),
                _ => None,
            })
            .collect();
        container_nums.sort_unstable();

        let mut additions: Vec<(u32, XrefEntry)> = Vec::new();
        for num in container_nums {
            let obj = self.get_object(num, 0);
            let Object::Stream { dict, .. } = &obj else {
                continue;
            };
            if dict.get("Type").and_then(Object::as_name) != Some("ObjStm") {
                continue;
            }
            let Ok(decoded) = self.decode_stream(&obj) else {
                continue;
            };
            for (index, (child_num, _)) in self.object_stream_pairs(dict, &decoded).iter().enumerate()
            {
                if !self.xref.contains_key(child_num) {
                    additions.push((
                        *child_num,
                        XrefEntry::Compressed {
                            stream_num: num,
                            index,
                        },
                    ));
                }
            }
        }
        for (num, entry) in additions {
            self.xref.entry(num).or_insert(entry);
        }
    }

    fn setup_encryption(&mut self) -> Result<()> {
        let Some(encrypt_obj) = self.trailer.get("Encrypt").cloned() else {
            return Ok(());
        };
        let encrypt_ref = encrypt_obj.as_reference();
        let encrypt_dict = match self.resolve(&encrypt_obj) {
            Object::Dictionary(dict) => dict,
            _ => return Err(Error::parse("/Encrypt is not a dictionary")),
        };
        let file_id = self.first_file_id().ok_or_else(|| {
            Error::Unsupported("encrypted PDF is missing a file identifier (/ID)".to_string())
        })?;

        match Encryption::unlock(&encrypt_dict, encrypt_ref, file_id) {
            Ok(encryption) => {
                self.encryption = Some(encryption);
                // Anything cached before the unlock never went through the
                // handler; drop it so strings decrypt on reload.
                self.cache.borrow_mut().clear();
                Ok(())
            }
            Err(CryptoError::Unsupported(msg)) => Err(Error::Unsupported(msg)),
            Err(CryptoError::Malformed(msg)) => Err(Error::parse(msg)),
        }
    }

    fn first_file_id(&self) -> Option<Vec<u8>> {
        let id = self.trailer.get("ID").map(|obj| self.resolve(obj))?;
        let first = id.as_array()?.first().map(|obj| self.resolve(obj))?;
        match first {
            Object::String(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }

    fn load_object(&self, obj_num: u32, gen_num: u16) -> Option<Object> {
        match self.xref.get(&obj_num)? {
            XrefEntry::Free => None,
            XrefEntry::InUse { offset, .. } => {
                let length_of =
                    |num: u32, gen: u16| -> Option<usize> { self.lookup_stream_length(num, gen) };
                let (parsed_num, parsed_gen, mut obj) =
                    ObjectParser::at(&self.data, *offset).parse_indirect(&length_of)?;
                if parsed_num != obj_num {
                    debug!(
                        "xref offset for object {} framed object {} instead",
                        obj_num, parsed_num
                    );
                    return None;
                }
                if let Some(encryption) = &self.encryption {
                    if encryption.encrypt_ref() != Some((obj_num, gen_num)) {
                        decrypt_object(&mut obj, parsed_num, parsed_gen, encryption);
                    }
                }
                Some(obj)
            }
            XrefEntry::Compressed { stream_num, index } => {
                self.load_compressed_object(obj_num, *stream_num, *index)
            }
        }
    }

    /// Read the integer value of `num gen obj <int> endobj` directly from its
    /// xref offset, bypassing the resolver. Used for indirect `/Length`.
    fn lookup_stream_length(&self, obj_num: u32, gen_num: u16) -> Option<usize> {
        match self.xref.get(&obj_num)? {
            XrefEntry::InUse { offset, .. } => {
                parser::parse_integer_object_at(&self.data, *offset, obj_num, gen_num)
            }
            _ => None,
        }
    }

    fn load_compressed_object(
        &self,
        obj_num: u32,
        stream_num: u32,
        index: usize,
    ) -> Option<Object> {
        let container = self.get_object(stream_num, 0);
        let Object::Stream { dict, .. } = &container else {
            return None;
        };
        if dict.get("Type").and_then(Object::as_name) != Some("ObjStm") {
            return None;
        }
        // The container payload was decrypted as a whole when loaded;
        // member objects are never individually encrypted.
        let decoded = self.decode_stream_tolerant(&container)?;
        let pairs = self.object_stream_pairs(dict, &decoded);
        let first = dict.get("First").and_then(Object::as_usize)?;

        let (num, offset) = pairs
            .get(index)
            .copied()
            .filter(|(num, _)| *num == obj_num)
            .or_else(|| pairs.iter().copied().find(|(num, _)| *num == obj_num))?;
        debug_assert_eq!(num, obj_num);
        parser::parse_object_at(&decoded, first.checked_add(offset)?)
    }

    fn object_stream_pairs(
        &self,
        dict: &HashMap<String, Object>,
        decoded: &[u8],
    ) -> Vec<(u32, usize)> {
        let n = dict.get("N").and_then(Object::as_usize).unwrap_or(0);
        let mut lexer = Lexer::new(decoded);
        let mut pairs = Vec::with_capacity(n);
        for _ in 0..n {
            let num = match lexer.next_token() {
                Some(Token::Integer(v)) if v >= 0 => v as u32,
                _ => break,
            };
            let offset = match lexer.next_token() {
                Some(Token::Integer(v)) if v >= 0 => v as usize,
                _ => break,
            };
            pairs.push((num, offset));
        }
        pairs
    }

    fn collect_pages(&mut self) {
        let root = match self.trailer.get("Root").map(|obj| self.resolve(obj)) {
            Some(Object::Dictionary(dict)) => dict,
            _ => return,
        };
        let Some(pages_root) = root.get("Pages").cloned() else {
            return;
        };
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.walk_page_tree(&pages_root, None, None, None, &mut visited, &mut pages);
        self.pages = pages;
    }

    fn walk_page_tree(
        &self,
        node: &Object,
        inherited_resources: Option<Object>,
        inherited_media_box: Option<Object>,
        inherited_rotate: Option<Object>,
        visited: &mut HashSet<(u32, u16)>,
        out: &mut Vec<Object>,
    ) {
        if let Some(reference) = node.as_reference() {
            if !visited.insert(reference) {
                return;
            }
        }
        let node = self.resolve(node);
        let Some(dict) = node.as_dict() else { return };

        let resources = dict
            .get("Resources")
            .map(|r| self.resolve(r))
            .or(inherited_resources);
        let media_box = dict
            .get("MediaBox")
            .map(|b| self.resolve(b))
            .or(inherited_media_box);
        let rotate = dict
            .get("Rotate")
            .map(|r| self.resolve(r))
            .or(inherited_rotate);

        let node_type = dict.get("Type").and_then(Object::as_name);
        let is_leaf = match node_type {
            Some("Page") => true,
            Some("Pages") => false,
            // Missing /Type: the presence of /Kids decides.
            _ => !dict.contains_key("Kids"),
        };

        if is_leaf {
            let mut page_dict = dict.clone();
            if let Some(resources) = resources {
                page_dict.entry("Resources".to_string()).or_insert(resources);
            }
            if let Some(media_box) = media_box {
                page_dict.entry("MediaBox".to_string()).or_insert(media_box);
            }
            if let Some(rotate) = rotate {
                page_dict.entry("Rotate".to_string()).or_insert(rotate);
            }
            out.push(Object::Dictionary(page_dict));
            return;
        }

        let Some(Object::Array(kids)) = dict.get("Kids").map(|k| self.resolve(k)) else {
            return;
        };
        for kid in &kids {
            self.walk_page_tree(
                kid,
                resources.clone(),
                media_box.clone(),
                rotate.clone(),
                visited,
                out,
            );
        }
    }
}

/// Recursively decrypt every string and stream payload inside `obj`.
///
/// XRef streams are excluded by the format; Metadata streams are excluded
/// when the document leaves metadata in the clear.
fn decrypt_object(obj: &mut Object, obj_num: u32, gen_num: u16, encryption: &Encryption) {
    match obj {
        Object::String(bytes) => {
            match encryption.decrypt_string(obj_num, gen_num, bytes) {
                Ok(decrypted) => *bytes = decrypted,
                // Incremental updates can interleave clear-text strings with
                // AES-encrypted ones; keep the original bytes in that case.
                Err(err) => debug!("string decryption failed, keeping bytes: {}", err),
            }
        }
        Object::Array(items) => {
            for item in items {
                decrypt_object(item, obj_num, gen_num, encryption);
            }
        }
        Object::Dictionary(dict) => {
            for value in dict.values_mut() {
                decrypt_object(value, obj_num, gen_num, encryption);
            }
        }
        Object::Stream { dict, data } => {
            for value in dict.values_mut() {
                decrypt_object(value, obj_num, gen_num, encryption);
            }
            let stream_type = dict.get("Type").and_then(Object::as_name);
            if stream_type == Some("XRef") {
                return;
            }
            if stream_type == Some("Metadata") && !encryption.encrypt_metadata() {
                return;
            }
            match encryption.decrypt_stream(obj_num, gen_num, data) {
                Ok(decrypted) => *data = decrypted,
                Err(err) => debug!("stream decryption failed, keeping bytes: {}", err),
            }
        }
        _ => {}
    }
}
