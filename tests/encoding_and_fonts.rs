mod common;

use common::{parse, single_page_pdf_with_font, PdfBuilder};

fn type0_pdf(descendant: &str, to_unicode: Option<&str>, content: &str) -> Vec<u8> {
    let mut builder = PdfBuilder::new();
    let font = match to_unicode {
        Some(_) => {
            "<< /Type /Font /Subtype /Type0 /BaseFont /ABCDEF+TestCID \
             /Encoding /Identity-H /DescendantFonts [10 0 R] /ToUnicode 11 0 R >>"
        }
        None => {
            "<< /Type /Font /Subtype /Type0 /BaseFont /ABCDEF+TestCID \
             /Encoding /Identity-H /DescendantFonts [10 0 R] >>"
        }
    };
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>",
        )
        .stream_object(4, "", content.as_bytes())
        .object(5, font)
        .object(10, descendant);
    if let Some(cmap) = to_unicode {
        builder.stream_object(11, "", cmap.as_bytes());
    }
    builder.build(1)
}

const DESCENDANT: &str = "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /TestCID \
    /DW 1000 /W [1 [500 600 550]] >>";

#[test]
fn type0_font_decodes_through_its_tounicode_cmap() {
    let cmap = "/CIDInit /ProcSet findresource begin\n\
        begincodespacerange <0000> <FFFF> endcodespacerange\n\
        beginbfchar <0001> <0048> <0002> <0069> endbfchar\n\
        end";
    let doc = parse(type0_pdf(
        DESCENDANT,
        Some(cmap),
        "BT /F1 12 Tf 72 700 Td <00010002> Tj ET",
    ));
    assert_eq!(doc.text(), "Hi");
}

#[test]
fn bfrange_maps_consecutive_codes() {
    let cmap = "begincodespacerange <0000> <FFFF> endcodespacerange\n\
        beginbfrange <0010> <0012> <0041> endbfrange";
    let doc = parse(type0_pdf(
        DESCENDANT,
        Some(cmap),
        "BT /F1 12 Tf 72 700 Td <001000110012> Tj ET",
    ));
    assert_eq!(doc.text(), "ABC");
}

#[test]
fn identity_without_tounicode_passes_code_points_through() {
    let doc = parse(type0_pdf(
        DESCENDANT,
        None,
        "BT /F1 12 Tf 72 700 Td <00480069> Tj ET",
    ));
    assert_eq!(doc.text(), "Hi");
}

#[test]
fn differences_override_the_base_encoding() {
    let font = "<< /Type /Font /Subtype /Type1 /BaseFont /Custom \
        /Encoding << /BaseEncoding /WinAnsiEncoding \
        /Differences [65 /bullet 66 /uni20AC] >> >>";
    let doc = parse(single_page_pdf_with_font(
        "BT /F1 12 Tf 72 700 Td (AB C) Tj ET",
        font,
    ));
    assert_eq!(doc.text(), "\u{2022}\u{20AC} C");
}

#[test]
fn glyph_names_resolve_via_the_glyph_list() {
    let font = "<< /Type /Font /Subtype /Type1 /BaseFont /Custom \
        /Encoding << /Differences [97 /eacute 98 /emdash] >> >>";
    let doc = parse(single_page_pdf_with_font(
        "BT /F1 12 Tf 72 700 Td (ab) Tj ET",
        font,
    ));
    assert_eq!(doc.text(), "é\u{2014}");
}

#[test]
fn mac_roman_encoding_maps_high_bytes() {
    let font = "<< /Type /Font /Subtype /Type1 /BaseFont /Custom \
        /Encoding /MacRomanEncoding >>";
    // 0xA5 is the bullet in MacRoman.
    let doc = parse(single_page_pdf_with_font(
        "BT /F1 12 Tf 72 700 Td (\\245) Tj ET",
        font,
    ));
    assert_eq!(doc.text(), "\u{2022}");
}

#[test]
fn win_ansi_is_the_fallback_without_an_encoding_entry() {
    let font = "<< /Type /Font /Subtype /TrueType /BaseFont /SomeFont >>";
    // 0x93 is a left double quotation mark in WinAnsi.
    let doc = parse(single_page_pdf_with_font(
        "BT /F1 12 Tf 72 700 Td (\\223quoted\\224) Tj ET",
        font,
    ));
    assert_eq!(doc.text(), "\u{201C}quoted\u{201D}");
}

#[test]
fn ext_gstate_can_set_the_font() {
    let mut builder = PdfBuilder::new();
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 5 0 R >> /ExtGState << /GS1 12 0 R >> >> \
             /Contents 4 0 R >>",
        )
        .stream_object(4, "", b"BT /GS1 gs 72 700 Td (StateFont text) Tj ET")
        .object(
            5,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        )
        .object(12, "<< /Font [5 0 R 10] >>");
    let doc = parse(builder.build(1));
    assert_eq!(doc.text(), "StateFont text");
    let items = doc.page_items(0).expect("items");
    assert!((items[0].font_size - 10.0).abs() < 1e-9);
}

#[test]
fn cid_widths_drive_spacing_for_identity_fonts() {
    // Codes 1..=3 are 500/600/550 units wide; two runs placed a full em
    // apart must keep their word gap.
    let content = "BT /F1 12 Tf 1 0 0 1 72 700 Tm <0001> Tj 1 0 0 1 100 700 Tm <0002> Tj ET";
    let doc = parse(type0_pdf(DESCENDANT, None, content));
    let items = doc.page_items(0).expect("items");
    assert_eq!(items.len(), 2);
    // 500/1000 * 12pt = 6pt rendered width for the first run.
    assert!((items[0].width - 6.0).abs() < 1e-9);
    assert!(items[0].has_metric_width);
}
