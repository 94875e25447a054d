//! Markdown rendering: headings by font-size ratio, span emphasis, links,
//! list normalization, and pipe tables substituted for detected table
//! blocks.

use std::sync::OnceLock;

use log::warn;
use regex::Regex;

use crate::assemble::{Line, Span};
use crate::content;
use crate::document::Document;
use crate::layout::{self, Table};

const H1_RATIO: f64 = 2.0;
const H2_RATIO: f64 = 1.6;
const H3_RATIO: f64 = 1.3;
const H4_RATIO: f64 = 1.15;
const MAX_HEADING_CHARS: usize = 200;

pub(crate) fn render_document(doc: &Document) -> String {
    let mut pages = Vec::new();
    for index in 0..doc.page_count() {
        let items = match content::page_items(doc, index) {
            Ok(items) => items,
            Err(err) => {
                warn!("skipping page {} in markdown: {}", index + 1, err);
                continue;
            }
        };
        let links = content::page_links(doc, index);
        let lines = crate::assemble::assemble_lines(&items, &links, doc.options());
        let tables = layout::detect_tables(&items, layout::page_width(doc, index));
        let rendered = render_page(&lines, &tables);
        if !rendered.is_empty() {
            pages.push(rendered);
        }
    }
    pages.join(&doc.options().page_separator)
}

pub(crate) fn render_page(lines: &[Line], tables: &[Table]) -> String {
    let body_size = body_font_size(lines);
    let mut out = String::new();
    let mut emitted_tables = vec![false; tables.len()];

    for line in lines {
        if let Some(table_index) = tables.iter().position(|table| table.contains_y(line.y)) {
            // The table band swallows its source lines; emit the pipe table
            // at the first line inside it.
            if !emitted_tables[table_index] {
                emitted_tables[table_index] = true;
                push_blank_line(&mut out);
                out.push_str(&render_table(&tables[table_index]));
                out.push('\n');
            }
            continue;
        }

        if let Some(level) = heading_level(line, body_size) {
            push_blank_line(&mut out);
            out.push_str(&"#".repeat(level));
            out.push(' ');
            out.push_str(line.text.trim());
            out.push_str("\n\n");
            continue;
        }

        let rendered = render_spans(line);
        let rendered = normalize_list_prefix(&rendered);
        out.push_str(rendered.trim_end());
        out.push('\n');
        if line.blank_after {
            out.push('\n');
        }
    }

    // Tables below every assembled line still render.
    for (index, table) in tables.iter().enumerate() {
        if !emitted_tables[index] {
            push_blank_line(&mut out);
            out.push_str(&render_table(table));
            out.push('\n');
        }
    }

    collapse_blank_runs(out.trim())
}

fn body_font_size(lines: &[Line]) -> f64 {
    let mut weights: Vec<(f64, usize)> = Vec::new();
    for line in lines {
        let chars = line.text.chars().count();
        match weights
            .iter_mut()
            .find(|(size, _)| (*size - line.font_size).abs() < 0.01)
        {
            Some((_, weight)) => *weight += chars,
            None => weights.push((line.font_size, chars)),
        }
    }
    weights
        .into_iter()
        .max_by_key(|(_, weight)| *weight)
        .map(|(size, _)| size)
        .unwrap_or(12.0)
}

fn heading_level(line: &Line, body_size: f64) -> Option<usize> {
    if body_size <= 0.0 || line.font_size <= 0.0 {
        return None;
    }
    let text = line.text.trim();
    if text.is_empty() || text.chars().count() > MAX_HEADING_CHARS {
        return None;
    }
    if text.ends_with(',') || text.ends_with(';') {
        return None;
    }
    let ratio = line.font_size / body_size;
    if ratio >= H1_RATIO {
        Some(1)
    } else if ratio >= H2_RATIO {
        Some(2)
    } else if ratio >= H3_RATIO {
        Some(3)
    } else if ratio >= H4_RATIO {
        Some(4)
    } else {
        None
    }
}

fn render_spans(line: &Line) -> String {
    let all_bold = !line.spans.is_empty()
        && line
            .spans
            .iter()
            .all(|span| span.bold || span.text.trim().is_empty());
    let all_italic = !line.spans.is_empty()
        && line
            .spans
            .iter()
            .all(|span| span.italic || span.text.trim().is_empty());

    if all_bold || all_italic {
        // A uniformly styled line wraps once instead of per span.
        let mut inner = String::new();
        for span in &line.spans {
            inner.push_str(&span_body(span));
        }
        return wrap_emphasis(inner.trim(), all_bold, all_italic);
    }

    let mut out = String::new();
    for span in &line.spans {
        let body = span_body(span);
        if span.bold || span.italic {
            let (leading, core, trailing) = split_whitespace_edges(&body);
            out.push_str(leading);
            if !core.is_empty() {
                out.push_str(&wrap_emphasis(core, span.bold, span.italic));
            }
            out.push_str(trailing);
        } else {
            out.push_str(&body);
        }
    }
    out
}

fn span_body(span: &Span) -> String {
    match &span.link {
        Some(uri) => {
            let text = span.text.trim();
            if text.is_empty() {
                String::new()
            } else {
                format!("[{}]({})", text, uri)
            }
        }
        None => autolink(&span.text),
    }
}

fn wrap_emphasis(text: &str, bold: bool, italic: bool) -> String {
    if text.is_empty() {
        return String::new();
    }
    match (bold, italic) {
        (true, true) => format!("***{}***", text),
        (true, false) => format!("**{}**", text),
        (false, true) => format!("*{}*", text),
        (false, false) => text.to_string(),
    }
}

fn split_whitespace_edges(text: &str) -> (&str, &str, &str) {
    let trimmed_start = text.trim_start();
    let leading = &text[..text.len() - trimmed_start.len()];
    let core = trimmed_start.trim_end();
    let trailing = &trimmed_start[core.len()..];
    (leading, core, trailing)
}

/// Bare `http(s)` URLs in unlinked text become GFM autolinks.
fn autolink(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"https?://[^\s<>()]+").expect("url pattern"));
    re.replace_all(text, "<$0>").into_owned()
}

/// Normalize bullet glyphs and numeric/alpha prefixes to Markdown lists.
fn normalize_list_prefix(text: &str) -> String {
    static BULLET: OnceLock<Regex> = OnceLock::new();
    static NUMBERED: OnceLock<Regex> = OnceLock::new();
    static ALPHA: OnceLock<Regex> = OnceLock::new();

    let bullet = BULLET.get_or_init(|| {
        Regex::new(r"^\s*[\u{2022}\u{2023}\u{25E6}\u{2043}\u{2219}\-\*]\s+").expect("bullet")
    });
    if bullet.is_match(text) {
        return bullet.replace(text, "- ").into_owned();
    }

    let numbered =
        NUMBERED.get_or_init(|| Regex::new(r"^\s*(\d{1,3})[.)]\s+").expect("numbered"));
    if let Some(captures) = numbered.captures(text) {
        let number = captures.get(1).map(|m| m.as_str()).unwrap_or("1");
        return numbered
            .replace(text, format!("{}. ", number).as_str())
            .into_owned();
    }

    let alpha = ALPHA.get_or_init(|| Regex::new(r"^\s*[a-z]\)\s+").expect("alpha"));
    if alpha.is_match(text) {
        return alpha.replace(text, "- ").into_owned();
    }
    text.to_string()
}

fn render_table(table: &Table) -> String {
    let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut body_rows: &[Vec<String>] = &table.rows;

    if table.has_header {
        push_table_row(&mut out, &table.rows[0], columns);
        body_rows = &table.rows[1..];
    } else {
        push_table_row(&mut out, &vec![String::new(); columns], columns);
    }
    out.push('|');
    for _ in 0..columns {
        out.push_str(" --- |");
    }
    out.push('\n');
    for row in body_rows {
        push_table_row(&mut out, row, columns);
    }
    out
}

fn push_table_row(out: &mut String, row: &[String], columns: usize) {
    out.push('|');
    for index in 0..columns {
        let cell = row.get(index).map(String::as_str).unwrap_or("");
        out.push(' ');
        out.push_str(&cell.replace('|', "\\|"));
        out.push_str(" |");
    }
    out.push('\n');
}

fn push_blank_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with("\n\n") {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newline_run = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push('\n');
            }
        } else {
            newline_run = 0;
            out.push(ch);
        }
    }
    out.trim_matches('\n').to_string()
}
