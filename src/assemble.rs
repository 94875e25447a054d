//! Text assembly: reorders positioned runs into reading order, infers
//! word/line/paragraph boundaries from font metrics and positions, and
//! produces either plain text or the structured line model the Markdown and
//! table passes consume.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

use crate::content::{LinkRect, TextItem};
use crate::document::LoadOptions;

const DEFAULT_FONT_SIZE: f64 = 12.0;
const LINE_BREAK_RATIO: f64 = 0.5;
const PARAGRAPH_BREAK_RATIO: f64 = 1.8;
const BACKJUMP_RATIO: f64 = -2.0;
const METRIC_SPACE_RATIO: f64 = 0.15;
const FALLBACK_CHAR_WIDTH_RATIO: f64 = 0.5;

/// A styled fragment of a line.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub link: Option<String>,
}

/// One assembled line: its text, styled spans, dominant font size, baseline
/// y, and whether a paragraph break follows.
#[derive(Debug, Clone)]
pub struct Line {
    pub text: String,
    pub spans: Vec<Span>,
    pub font_size: f64,
    pub y: f64,
    pub blank_after: bool,
}

pub(crate) fn assemble_text(items: &[TextItem], options: &LoadOptions) -> String {
    let lines = assemble_lines(items, &[], options);
    let mut out = String::new();
    for line in &lines {
        out.push_str(&line.text);
        out.push('\n');
        if line.blank_after {
            out.push('\n');
        }
    }
    clean_text(&out)
}

pub(crate) fn assemble_lines(
    items: &[TextItem],
    links: &[LinkRect],
    options: &LoadOptions,
) -> Vec<Line> {
    let sorted = sort_reading_order(items);
    let mut builder = LineBuilder::new(links);
    for item in &sorted {
        builder.push(item);
    }
    let mut lines = builder.finish();
    if options.strip_form_placeholders {
        strip_placeholders_from_lines(&mut lines);
    }
    lines
}

/// Text-object-aware three-phase sort.
///
/// Runs are y-sorted, clustered into lines, then ordered within each line by
/// text-object group so that overlapping `BT`/`ET` objects on a shared
/// baseline never interleave character by character.
fn sort_reading_order(items: &[TextItem]) -> Vec<TextItem> {
    let mut indexed: Vec<(usize, &TextItem)> = items.iter().enumerate().collect();
    indexed.sort_by(|a, b| b.1.y.partial_cmp(&a.1.y).unwrap_or(Ordering::Equal));

    let mut lines: Vec<Vec<(usize, &TextItem)>> = Vec::new();
    for entry in indexed {
        let starts_new_line = match lines.last().and_then(|line| line.last()) {
            Some((_, prev)) => {
                let font_size = nonzero_font_size(prev.font_size);
                (entry.1.y - prev.y).abs() > LINE_BREAK_RATIO * font_size
            }
            None => true,
        };
        if starts_new_line {
            lines.push(Vec::new());
        }
        lines.last_mut().expect("line exists").push(entry);
    }

    let mut out = Vec::with_capacity(items.len());
    for line in &mut lines {
        // Group by text object: groups sort by their leftmost x, members
        // keep content-stream order.
        let mut groups: Vec<(u32, f64, Vec<(usize, &TextItem)>)> = Vec::new();
        for (index, item) in line.drain(..) {
            match groups.iter_mut().find(|(id, _, _)| *id == item.text_object) {
                Some((_, min_x, members)) => {
                    if item.x < *min_x {
                        *min_x = item.x;
                    }
                    members.push((index, item));
                }
                None => groups.push((item.text_object, item.x, vec![(index, item)])),
            }
        }
        groups.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        for (_, _, mut members) in groups {
            members.sort_by_key(|(index, _)| *index);
            out.extend(members.into_iter().map(|(_, item)| item.clone()));
        }
    }
    out
}

fn nonzero_font_size(size: f64) -> f64 {
    if size > 0.0 {
        size
    } else {
        DEFAULT_FONT_SIZE
    }
}

/// Space heuristic between two runs on the same line. With a real metric
/// width on the previous run a small positive gap means a word boundary;
/// without one, estimate the prior run's width from its character count.
pub(crate) fn should_insert_space(
    x_gap: f64,
    pos_gap: f64,
    last_text_len: usize,
    font_size: f64,
    last_has_metric_width: bool,
) -> bool {
    if last_has_metric_width {
        x_gap > METRIC_SPACE_RATIO * font_size
    } else {
        let estimate = last_text_len.max(1) as f64 * font_size * FALLBACK_CHAR_WIDTH_RATIO;
        pos_gap > estimate
    }
}

struct LineBuilder<'a> {
    links: &'a [LinkRect],
    lines: Vec<Line>,
    spans: Vec<Span>,
    size_weights: Vec<(f64, usize)>,
    line_y: f64,
    last_x: f64,
    last_y: f64,
    last_font_size: f64,
    last_width: f64,
    last_text_len: usize,
    last_has_metric_width: bool,
    started: bool,
}

impl<'a> LineBuilder<'a> {
    fn new(links: &'a [LinkRect]) -> Self {
        Self {
            links,
            lines: Vec::new(),
            spans: Vec::new(),
            size_weights: Vec::new(),
            line_y: 0.0,
            last_x: 0.0,
            last_y: 0.0,
            last_font_size: 0.0,
            last_width: 0.0,
            last_text_len: 0,
            last_has_metric_width: false,
            started: false,
        }
    }

    fn push(&mut self, item: &TextItem) {
        let mut needs_space = false;
        if !self.started {
            self.line_y = item.y;
        } else {
            let font_size = nonzero_font_size(self.last_font_size);
            let dy = (item.y - self.last_y).abs();
            if dy > LINE_BREAK_RATIO * font_size {
                let paragraph = dy > PARAGRAPH_BREAK_RATIO * font_size;
                self.flush_line(paragraph);
                self.line_y = item.y;
            } else {
                let x_gap = item.x - (self.last_x + self.last_width);
                let pos_gap = item.x - self.last_x;
                needs_space = x_gap < BACKJUMP_RATIO * font_size
                    || should_insert_space(
                        x_gap,
                        pos_gap,
                        self.last_text_len,
                        font_size,
                        self.last_has_metric_width,
                    );
            }
        }

        self.append_item(item, needs_space);
        self.started = true;
        self.last_x = item.x;
        self.last_y = item.y;
        self.last_font_size = item.font_size;
        self.last_width = item.width;
        self.last_text_len = item.text.chars().count();
        self.last_has_metric_width = item.has_metric_width;
    }

    fn append_item(&mut self, item: &TextItem, needs_space: bool) {
        let bold = looks_bold(&item.base_font);
        let italic = looks_italic(&item.base_font);
        let link = self
            .links
            .iter()
            .find(|rect| rect.contains(item.x + item.width / 2.0, item.y))
            .map(|rect| rect.uri.clone());

        let char_weight = item.text.chars().count();
        match self
            .size_weights
            .iter_mut()
            .find(|(size, _)| (*size - item.font_size).abs() < 0.01)
        {
            Some((_, weight)) => *weight += char_weight,
            None => self.size_weights.push((item.font_size, char_weight)),
        }

        if needs_space {
            match self.spans.last_mut() {
                Some(span) => span.text.push(' '),
                None => self.spans.push(Span {
                    text: " ".to_string(),
                    bold,
                    italic,
                    link: link.clone(),
                }),
            }
        }
        match self.spans.last_mut() {
            Some(span) if span.bold == bold && span.italic == italic && span.link == link => {
                span.text.push_str(&item.text);
            }
            _ => self.spans.push(Span {
                text: item.text.clone(),
                bold,
                italic,
                link,
            }),
        }
    }

    fn flush_line(&mut self, paragraph_after: bool) {
        if self.spans.is_empty() {
            return;
        }
        let text: String = self.spans.iter().map(|span| span.text.as_str()).collect();
        let font_size = self
            .size_weights
            .iter()
            .max_by(|a, b| a.1.cmp(&b.1))
            .map(|(size, _)| *size)
            .unwrap_or(DEFAULT_FONT_SIZE);
        self.lines.push(Line {
            text,
            spans: std::mem::take(&mut self.spans),
            font_size,
            y: self.line_y,
            blank_after: paragraph_after,
        });
        self.size_weights.clear();
    }

    fn finish(mut self) -> Vec<Line> {
        self.flush_line(false);
        self.lines
    }
}

pub(crate) fn looks_bold(font_name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)bold|black|heavy").expect("bold pattern"))
        .is_match(font_name)
}

pub(crate) fn looks_italic(font_name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)italic|oblique").expect("italic pattern"))
        .is_match(font_name)
}

/// DocuSign/IIO anchor shapes: `\name1\` self-closing, `\name1` open tag,
/// and a lone ` \` orphaned closer.
fn placeholder_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\\[A-Za-z][A-Za-z0-9_]*\d*\\|\\[A-Za-z][A-Za-z0-9_]*\d+")
            .expect("placeholder pattern")
    })
}

fn orphan_closer_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)(^|\s)\\($|\s)").expect("orphan pattern"))
}

pub(crate) fn strip_placeholders(text: &str) -> String {
    let stripped = placeholder_pattern().replace_all(text, "");
    orphan_closer_pattern()
        .replace_all(&stripped, "$1")
        .into_owned()
}

fn strip_placeholders_from_lines(lines: &mut Vec<Line>) {
    for line in lines.iter_mut() {
        for span in line.spans.iter_mut() {
            span.text = strip_placeholders(&span.text);
        }
        line.spans.retain(|span| !span.text.is_empty());
        line.text = line.spans.iter().map(|span| span.text.as_str()).collect();
    }
    lines.retain(|line| !line.text.trim().is_empty());
}

/// Collapse runs of non-newline whitespace, strip spaces before newlines,
/// cap consecutive newlines at two, then trim.
pub(crate) fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut newline_run = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            pending_space = false;
            if newline_run < 2 {
                out.push('\n');
            }
            newline_run += 1;
        } else if ch.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() && !out.ends_with('\n') {
                out.push(' ');
            }
            pending_space = false;
            newline_run = 0;
            out.push(ch);
        }
    }
    out.trim_matches('\n').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(text: &str, x: f64, y: f64, width: f64, text_object: u32) -> TextItem {
        TextItem {
            text: text.to_string(),
            x,
            y,
            font_size: 12.0,
            base_font: "Helvetica".to_string(),
            width,
            text_object,
            has_metric_width: true,
        }
    }

    fn options() -> LoadOptions {
        LoadOptions::default()
    }

    #[test]
    fn items_sort_top_down_then_left_right() {
        let items = vec![
            item("world", 60.0, 700.0, 30.0, 2),
            item("Below", 10.0, 650.0, 30.0, 3),
            item("Hello", 10.0, 700.0, 40.0, 1),
        ];
        let text = assemble_text(&items, &options());
        assert_eq!(text, "Hello world\nBelow");
    }

    #[test]
    fn text_objects_do_not_interleave_on_a_shared_baseline() {
        // Two BT/ET objects overlapping one baseline: a DocuSign-style
        // overlay. Per-object runs must stay contiguous.
        let items = vec![
            item("Jef", 200.0, 500.0, 18.0, 2),
            item("Peter", 10.0, 500.0, 30.0, 1),
            item("f", 218.0, 500.2, 6.0, 2),
            item("Horst", 44.0, 500.1, 32.0, 1),
        ];
        let text = assemble_text(&items, &options());
        assert_eq!(text, "Peter Horst Jeff");
    }

    #[test]
    fn metric_gap_inserts_exactly_one_space() {
        let items = vec![
            item("Amount", 10.0, 700.0, 42.0, 1),
            item("due", 60.0, 700.0, 20.0, 1),
        ];
        assert_eq!(assemble_text(&items, &options()), "Amount due");
    }

    #[test]
    fn kerning_sized_gaps_stay_joined() {
        let items = vec![
            item("Nov", 10.0, 700.0, 21.0, 1),
            item("ember", 31.5, 700.0, 33.0, 1),
        ];
        assert_eq!(assemble_text(&items, &options()), "November");
    }

    #[test]
    fn backward_jump_inserts_a_space() {
        let items = vec![
            item("right", 300.0, 700.0, 30.0, 1),
            item("left", 10.0, 700.0, 20.0, 1),
        ];
        // Same text object, same line, big negative gap.
        assert_eq!(assemble_text(&items, &options()), "right left");
    }

    #[test]
    fn paragraph_gap_emits_a_blank_line() {
        let items = vec![
            item("First", 10.0, 700.0, 30.0, 1),
            item("Second", 10.0, 660.0, 40.0, 1),
        ];
        assert_eq!(assemble_text(&items, &options()), "First\n\nSecond");
    }

    #[test]
    fn fallback_width_estimate_controls_spacing() {
        let mut a = item("abcdef", 10.0, 700.0, 0.0, 1);
        a.has_metric_width = false;
        // Estimate: 6 chars * 12pt * 0.5 = 36. A 20pt gap joins, a 40pt gap
        // splits.
        let joined = vec![a.clone(), item("gh", 30.0, 700.0, 10.0, 1)];
        assert_eq!(assemble_text(&joined, &options()), "abcdefgh");
        let split = vec![a, item("gh", 50.0, 700.0, 10.0, 1)];
        assert_eq!(assemble_text(&split, &options()), "abcdef gh");
    }

    #[test]
    fn placeholders_are_stripped_by_default() {
        let items = vec![
            item("\\signature1\\", 10.0, 700.0, 40.0, 1),
            item("Peter Horst", 60.0, 700.0, 60.0, 1),
            item("\\namehere1", 10.0, 650.0, 40.0, 1),
            item("Jeff Miller", 10.0, 600.0, 60.0, 1),
        ];
        let text = assemble_text(&items, &options());
        assert!(text.contains("Peter Horst"));
        assert!(text.contains("Jeff Miller"));
        assert!(!text.contains("signature1"));
        assert!(!text.contains("namehere1"));
        assert!(!text.contains('\\'));
    }

    #[test]
    fn placeholders_survive_when_stripping_is_off() {
        let items = vec![item("\\signature1\\", 10.0, 700.0, 40.0, 1)];
        let options = LoadOptions {
            strip_form_placeholders: false,
            ..LoadOptions::default()
        };
        assert_eq!(assemble_text(&items, &options), "\\signature1\\");
    }

    #[test]
    fn orphaned_closers_are_removed() {
        assert_eq!(strip_placeholders("Chief \\ Officer"), "Chief Officer");
        assert_eq!(
            strip_placeholders("\\IIO_Finance_Contact_Name_1\\ Alice"),
            " Alice"
        );
    }

    #[test]
    fn spans_carry_style_and_merge_on_equal_style() {
        let mut bold = item("Total:", 10.0, 700.0, 36.0, 1);
        bold.base_font = "Helvetica-Bold".to_string();
        let items = vec![bold, item("42", 60.0, 700.0, 14.0, 1)];
        let lines = assemble_lines(&items, &[], &options());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].spans.len(), 2);
        assert!(lines[0].spans[0].bold);
        assert!(!lines[0].spans[1].bold);
        assert_eq!(lines[0].text, "Total: 42");
    }

    #[test]
    fn links_attach_by_item_center() {
        let links = vec![LinkRect {
            x_min: 0.0,
            y_min: 690.0,
            x_max: 100.0,
            y_max: 710.0,
            uri: "https://example.com".to_string(),
        }];
        let items = vec![
            item("here", 10.0, 700.0, 30.0, 1),
            item("outside", 200.0, 700.0, 40.0, 1),
        ];
        let lines = assemble_lines(&items, &links, &options());
        assert_eq!(
            lines[0].spans[0].link.as_deref(),
            Some("https://example.com")
        );
        assert_eq!(lines[0].spans[1].link, None);
    }

    #[test]
    fn dominant_font_size_wins_by_character_weight() {
        let mut big = item("A", 10.0, 700.0, 8.0, 1);
        big.font_size = 24.0;
        let items = vec![big, item("long run of body text", 20.0, 700.0, 130.0, 1)];
        let lines = assemble_lines(&items, &[], &options());
        assert!((lines[0].font_size - 12.0).abs() < 1e-9);
    }

    #[test]
    fn clean_text_normalizes_whitespace() {
        assert_eq!(clean_text("a  b\t c \n\n\n\nd  "), "a b c\n\nd");
    }
}
