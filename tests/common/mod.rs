#![allow(dead_code)]

use glean::{Document, LoadOptions};

/// Assembles a classic-xref PDF from numbered object bodies. Object numbers
/// must be unique; gaps become free xref entries.
pub struct PdfBuilder {
    objects: Vec<(u32, Vec<u8>)>,
    trailer_extra: String,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            trailer_extra: String::new(),
        }
    }

    pub fn object(&mut self, num: u32, body: impl AsRef<[u8]>) -> &mut Self {
        self.objects.push((num, body.as_ref().to_vec()));
        self
    }

    pub fn stream_object(&mut self, num: u32, dict_extra: &str, payload: &[u8]) -> &mut Self {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!("<< /Length {} {} >>\nstream\n", payload.len(), dict_extra).as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\nendstream");
        self.objects.push((num, body));
        self
    }

    pub fn trailer_extra(&mut self, extra: &str) -> &mut Self {
        self.trailer_extra = extra.to_string();
        self
    }

    pub fn build(&self, root_num: u32) -> Vec<u8> {
        let mut out: Vec<u8> = b"%PDF-1.7\n".to_vec();
        let max_num = self.objects.iter().map(|(num, _)| *num).max().unwrap_or(0);
        let mut offsets = vec![None; max_num as usize + 1];
        for (num, body) in &self.objects {
            offsets[*num as usize] = Some(out.len());
            out.extend_from_slice(format!("{} 0 obj\n", num).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_pos = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", max_num + 1).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for num in 1..=max_num {
            match offsets[num as usize] {
                Some(offset) => {
                    out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes())
                }
                None => out.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root {} 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                max_num + 1,
                root_num,
                self.trailer_extra,
                xref_pos
            )
            .as_bytes(),
        );
        out
    }
}

pub const HELVETICA_FONT: &str =
    "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>";

/// Helvetica with its real `/Widths` table so spacing heuristics see metric
/// advances.
pub fn helvetica_with_widths() -> String {
    let widths: Vec<String> = (32u32..=126)
        .map(|code| helvetica_width(code).to_string())
        .collect();
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding \
         /FirstChar 32 /LastChar 126 /Widths [{}] >>",
        widths.join(" ")
    )
}

/// AFM widths for the printable ASCII range of Helvetica.
pub fn helvetica_width(code: u32) -> u32 {
    match code {
        32 => 278,
        33 => 278,
        34 => 355,
        35..=36 => 556,
        37 => 889,
        38 => 667,
        39 => 191,
        40..=41 => 333,
        42 => 389,
        43 => 584,
        44 => 278,
        45 => 333,
        46..=47 => 278,
        48..=57 => 556,
        58..=59 => 278,
        60..=62 => 584,
        63 => 556,
        64 => 1015,
        65..=66 => 667,
        67..=68 => 722,
        69 => 667,
        70 => 611,
        71 => 778,
        72 => 722,
        73 => 278,
        74 => 500,
        75 => 667,
        76 => 556,
        77 => 833,
        78 => 722,
        79 => 778,
        80 => 667,
        81 => 778,
        82 => 722,
        83 => 667,
        84 => 611,
        85 => 722,
        86 => 667,
        87 => 944,
        88..=89 => 667,
        90 => 611,
        91 => 278,
        92 => 278,
        93 => 278,
        94 => 469,
        95 => 556,
        96 => 222,
        97 => 556,
        98 => 556,
        99 => 500,
        100..=101 => 556,
        102 => 278,
        103..=104 => 556,
        105..=106 => 222,
        107 => 500,
        108 => 222,
        109 => 833,
        110..=113 => 556,
        114 => 333,
        115 => 500,
        116 => 278,
        117 => 556,
        118 => 500,
        119 => 722,
        120..=122 => 500,
        123 => 334,
        124 => 260,
        125 => 334,
        126 => 584,
        _ => 556,
    }
}

/// One-page document with the given content stream and a plain Helvetica
/// resource under `/F1`.
pub fn single_page_pdf(content: &str) -> Vec<u8> {
    single_page_pdf_with_font(content, HELVETICA_FONT)
}

pub fn single_page_pdf_with_font(content: &str, font: &str) -> Vec<u8> {
    let mut builder = PdfBuilder::new();
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>",
        )
        .stream_object(4, "", content.as_bytes())
        .object(5, font);
    builder.build(1)
}

pub fn parse(bytes: Vec<u8>) -> Document {
    Document::parse(bytes).expect("failed to parse fixture")
}

pub fn parse_with_options(bytes: Vec<u8>, options: LoadOptions) -> glean::Result<Document> {
    Document::parse_with_options(bytes, options)
}
