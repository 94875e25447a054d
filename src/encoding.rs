//! Character encodings: the standard 256-entry vectors selected by
//! `/Encoding` names, the Adobe Glyph List subset used by `/Differences`,
//! and PDFDocEncoding for metadata strings.

/// Resolve an `/Encoding` name to its 256-entry vector. A zero entry means
/// "no mapping". MacExpertEncoding carries expert-set glyphs with no direct
/// Unicode vector; it resolves to the Standard vector here.
pub(crate) fn encoding_vector(name: &str) -> Option<&'static [u16; 256]> {
    match name {
        "WinAnsiEncoding" => Some(&WIN_ANSI),
        "MacRomanEncoding" => Some(&MAC_ROMAN),
        "StandardEncoding" | "MacExpertEncoding" => Some(&STANDARD),
        _ => None,
    }
}

pub(crate) fn vector_char(table: &[u16; 256], code: u32) -> Option<char> {
    if code > 0xFF {
        return None;
    }
    let mapped = table[code as usize];
    if mapped == 0 {
        return None;
    }
    char::from_u32(mapped as u32)
}

/// Map a glyph name to Unicode: `uniXXXX`/`uXXXX[XX]` hex forms, single
/// printable-character names, then the AGL subset table.
pub(crate) fn glyph_name_to_char(name: &str) -> Option<char> {
    if let Some(hex) = name.strip_prefix("uni") {
        if hex.len() >= 4 {
            if let Ok(value) = u32::from_str_radix(&hex[..4], 16) {
                return char::from_u32(value);
            }
        }
    }
    if let Some(hex) = name.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            if let Ok(value) = u32::from_str_radix(hex, 16) {
                return char::from_u32(value);
            }
        }
    }
    let mut chars = name.chars();
    if let (Some(single), None) = (chars.next(), chars.next()) {
        if single.is_ascii_graphic() {
            return Some(single);
        }
    }
    agl_char(name)
}

fn agl_char(name: &str) -> Option<char> {
    let code = match name {
        "space" | "nonbreakingspace" | "nbspace" => 0x0020,
        "exclam" => 0x0021,
        "quotedbl" => 0x0022,
        "numbersign" => 0x0023,
        "dollar" => 0x0024,
        "percent" => 0x0025,
        "ampersand" => 0x0026,
        "quotesingle" => 0x0027,
        "parenleft" => 0x0028,
        "parenright" => 0x0029,
        "asterisk" => 0x002A,
        "plus" => 0x002B,
        "comma" => 0x002C,
        "hyphen" | "minus" => 0x002D,
        "period" => 0x002E,
        "slash" => 0x002F,
        "zero" => 0x0030,
        "one" => 0x0031,
        "two" => 0x0032,
        "three" => 0x0033,
        "four" => 0x0034,
        "five" => 0x0035,
        "six" => 0x0036,
        "seven" => 0x0037,
        "eight" => 0x0038,
        "nine" => 0x0039,
        "colon" => 0x003A,
        "semicolon" => 0x003B,
        "less" => 0x003C,
        "equal" => 0x003D,
        "greater" => 0x003E,
        "question" => 0x003F,
        "at" => 0x0040,
        "bracketleft" => 0x005B,
        "backslash" => 0x005C,
        "bracketright" => 0x005D,
        "asciicircum" => 0x005E,
        "underscore" => 0x005F,
        "grave" => 0x0060,
        "braceleft" => 0x007B,
        "bar" => 0x007C,
        "braceright" => 0x007D,
        "asciitilde" => 0x007E,
        "exclamdown" => 0x00A1,
        "cent" => 0x00A2,
        "sterling" => 0x00A3,
        "currency" => 0x00A4,
        "yen" => 0x00A5,
        "brokenbar" => 0x00A6,
        "section" => 0x00A7,
        "dieresis" => 0x00A8,
        "copyright" => 0x00A9,
        "ordfeminine" => 0x00AA,
        "guillemotleft" => 0x00AB,
        "logicalnot" => 0x00AC,
        "registered" => 0x00AE,
        "macron" => 0x00AF,
        "degree" => 0x00B0,
        "plusminus" => 0x00B1,
        "acute" => 0x00B4,
        "mu" => 0x00B5,
        "paragraph" => 0x00B6,
        "periodcentered" => 0x00B7,
        "cedilla" => 0x00B8,
        "ordmasculine" => 0x00BA,
        "guillemotright" => 0x00BB,
        "onequarter" => 0x00BC,
        "onehalf" => 0x00BD,
        "threequarters" => 0x00BE,
        "questiondown" => 0x00BF,
        "Agrave" => 0x00C0,
        "Aacute" => 0x00C1,
        "Acircumflex" => 0x00C2,
        "Atilde" => 0x00C3,
        "Adieresis" => 0x00C4,
        "Aring" => 0x00C5,
        "AE" => 0x00C6,
        "Ccedilla" => 0x00C7,
        "Egrave" => 0x00C8,
        "Eacute" => 0x00C9,
        "Ecircumflex" => 0x00CA,
        "Edieresis" => 0x00CB,
        "Igrave" => 0x00CC,
        "Iacute" => 0x00CD,
        "Icircumflex" => 0x00CE,
        "Idieresis" => 0x00CF,
        "Eth" => 0x00D0,
        "Ntilde" => 0x00D1,
        "Ograve" => 0x00D2,
        "Oacute" => 0x00D3,
        "Ocircumflex" => 0x00D4,
        "Otilde" => 0x00D5,
        "Odieresis" => 0x00D6,
        "multiply" => 0x00D7,
        "Oslash" => 0x00D8,
        "Ugrave" => 0x00D9,
        "Uacute" => 0x00DA,
        "Ucircumflex" => 0x00DB,
        "Udieresis" => 0x00DC,
        "Yacute" => 0x00DD,
        "Thorn" => 0x00DE,
        "germandbls" => 0x00DF,
        "agrave" => 0x00E0,
        "aacute" => 0x00E1,
        "acircumflex" => 0x00E2,
        "atilde" => 0x00E3,
        "adieresis" => 0x00E4,
        "aring" => 0x00E5,
        "ae" => 0x00E6,
        "ccedilla" => 0x00E7,
        "egrave" => 0x00E8,
        "eacute" => 0x00E9,
        "ecircumflex" => 0x00EA,
        "edieresis" => 0x00EB,
        "igrave" => 0x00EC,
        "iacute" => 0x00ED,
        "icircumflex" => 0x00EE,
        "idieresis" => 0x00EF,
        "eth" => 0x00F0,
        "ntilde" => 0x00F1,
        "ograve" => 0x00F2,
        "oacute" => 0x00F3,
        "ocircumflex" => 0x00F4,
        "otilde" => 0x00F5,
        "odieresis" => 0x00F6,
        "divide" => 0x00F7,
        "oslash" => 0x00F8,
        "ugrave" => 0x00F9,
        "uacute" => 0x00FA,
        "ucircumflex" => 0x00FB,
        "udieresis" => 0x00FC,
        "yacute" => 0x00FD,
        "thorn" => 0x00FE,
        "ydieresis" => 0x00FF,
        "Lslash" => 0x0141,
        "lslash" => 0x0142,
        "OE" => 0x0152,
        "oe" => 0x0153,
        "Scaron" => 0x0160,
        "scaron" => 0x0161,
        "Ydieresis" => 0x0178,
        "Zcaron" => 0x017D,
        "zcaron" => 0x017E,
        "florin" => 0x0192,
        "circumflex" => 0x02C6,
        "caron" => 0x02C7,
        "breve" => 0x02D8,
        "dotaccent" => 0x02D9,
        "ring" => 0x02DA,
        "ogonek" => 0x02DB,
        "tilde" => 0x02DC,
        "hungarumlaut" => 0x02DD,
        "endash" => 0x2013,
        "emdash" => 0x2014,
        "quoteleft" => 0x2018,
        "quoteright" => 0x2019,
        "quotesinglbase" => 0x201A,
        "quotedblleft" => 0x201C,
        "quotedblright" => 0x201D,
        "quotedblbase" => 0x201E,
        "dagger" => 0x2020,
        "daggerdbl" => 0x2021,
        "bullet" => 0x2022,
        "ellipsis" => 0x2026,
        "perthousand" => 0x2030,
        "guilsinglleft" => 0x2039,
        "guilsinglright" => 0x203A,
        "fraction" => 0x2044,
        "Euro" => 0x20AC,
        "trademark" => 0x2122,
        "partialdiff" => 0x2202,
        "Delta" => 0x2206,
        "summation" => 0x2211,
        "radical" => 0x221A,
        "infinity" => 0x221E,
        "notequal" => 0x2260,
        "lessequal" => 0x2264,
        "greaterequal" => 0x2265,
        "lozenge" => 0x25CA,
        "fi" => 0xFB01,
        "fl" => 0xFB02,
        _ => return None,
    };
    char::from_u32(code)
}

/// Decode a text string from `/Info` or an outline: UTF-16BE with a BOM,
/// UTF-8 with a BOM, otherwise PDFDocEncoding.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(&bytes[3..]).into_owned();
    }
    bytes.iter().filter_map(|&b| pdf_doc_char(b)).collect()
}

/// PDFDocEncoding: Latin-1 except for accent glyphs at 0x18–0x1F and the
/// punctuation block at 0x80–0x9F.
fn pdf_doc_char(code: u8) -> Option<char> {
    let mapped: u32 = match code {
        0x09 | 0x0A | 0x0D => code as u32,
        0x00..=0x17 => return None,
        0x18 => 0x02D8,
        0x19 => 0x02C7,
        0x1A => 0x02C6,
        0x1B => 0x02D9,
        0x1C => 0x02DD,
        0x1D => 0x02DB,
        0x1E => 0x02DA,
        0x1F => 0x02DC,
        0x20..=0x7E => code as u32,
        0x7F => return None,
        0x80 => 0x2022,
        0x81 => 0x2020,
        0x82 => 0x2021,
        0x83 => 0x2026,
        0x84 => 0x2014,
        0x85 => 0x2013,
        0x86 => 0x0192,
        0x87 => 0x2044,
        0x88 => 0x2039,
        0x89 => 0x203A,
        0x8A => 0x2212,
        0x8B => 0x2030,
        0x8C => 0x201E,
        0x8D => 0x201C,
        0x8E => 0x201D,
        0x8F => 0x2018,
        0x90 => 0x2019,
        0x91 => 0x201A,
        0x92 => 0x2122,
        0x93 => 0xFB01,
        0x94 => 0xFB02,
        0x95 => 0x0141,
        0x96 => 0x0152,
        0x97 => 0x0160,
        0x98 => 0x0178,
        0x99 => 0x017D,
        0x9A => 0x0131,
        0x9B => 0x0142,
        0x9C => 0x0153,
        0x9D => 0x0161,
        0x9E => 0x017E,
        0x9F => return None,
        0xA0 => 0x20AC,
        other => other as u32,
    };
    char::from_u32(mapped)
}

pub(crate) const WIN_ANSI: [u16; 256] = [
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0020, 0x0021, 0x0022, 0x0023,
    0x0024, 0x0025, 0x0026, 0x0027, 0x0028, 0x0029, 0x002A, 0x002B, 0x002C, 0x002D, 0x002E, 0x002F,
    0x0030, 0x0031, 0x0032, 0x0033, 0x0034, 0x0035, 0x0036, 0x0037, 0x0038, 0x0039, 0x003A, 0x003B,
    0x003C, 0x003D, 0x003E, 0x003F, 0x0040, 0x0041, 0x0042, 0x0043, 0x0044, 0x0045, 0x0046, 0x0047,
    0x0048, 0x0049, 0x004A, 0x004B, 0x004C, 0x004D, 0x004E, 0x004F, 0x0050, 0x0051, 0x0052, 0x0053,
    0x0054, 0x0055, 0x0056, 0x0057, 0x0058, 0x0059, 0x005A, 0x005B, 0x005C, 0x005D, 0x005E, 0x005F,
    0x0060, 0x0061, 0x0062, 0x0063, 0x0064, 0x0065, 0x0066, 0x0067, 0x0068, 0x0069, 0x006A, 0x006B,
    0x006C, 0x006D, 0x006E, 0x006F, 0x0070, 0x0071, 0x0072, 0x0073, 0x0074, 0x0075, 0x0076, 0x0077,
    0x0078, 0x0079, 0x007A, 0x007B, 0x007C, 0x007D, 0x007E, 0x0000, 0x20AC, 0x0000, 0x201A, 0x0192,
    0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0x0000, 0x017D, 0x0000,
    0x0000, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, 0x02DC, 0x2122, 0x0161, 0x203A,
    0x0153, 0x0000, 0x017E, 0x0178, 0x00A0, 0x00A1, 0x00A2, 0x00A3, 0x00A4, 0x00A5, 0x00A6, 0x00A7,
    0x00A8, 0x00A9, 0x00AA, 0x00AB, 0x00AC, 0x00AD, 0x00AE, 0x00AF, 0x00B0, 0x00B1, 0x00B2, 0x00B3,
    0x00B4, 0x00B5, 0x00B6, 0x00B7, 0x00B8, 0x00B9, 0x00BA, 0x00BB, 0x00BC, 0x00BD, 0x00BE, 0x00BF,
    0x00C0, 0x00C1, 0x00C2, 0x00C3, 0x00C4, 0x00C5, 0x00C6, 0x00C7, 0x00C8, 0x00C9, 0x00CA, 0x00CB,
    0x00CC, 0x00CD, 0x00CE, 0x00CF, 0x00D0, 0x00D1, 0x00D2, 0x00D3, 0x00D4, 0x00D5, 0x00D6, 0x00D7,
    0x00D8, 0x00D9, 0x00DA, 0x00DB, 0x00DC, 0x00DD, 0x00DE, 0x00DF, 0x00E0, 0x00E1, 0x00E2, 0x00E3,
    0x00E4, 0x00E5, 0x00E6, 0x00E7, 0x00E8, 0x00E9, 0x00EA, 0x00EB, 0x00EC, 0x00ED, 0x00EE, 0x00EF,
    0x00F0, 0x00F1, 0x00F2, 0x00F3, 0x00F4, 0x00F5, 0x00F6, 0x00F7, 0x00F8, 0x00F9, 0x00FA, 0x00FB,
    0x00FC, 0x00FD, 0x00FE, 0x00FF,
];

pub(crate) const MAC_ROMAN: [u16; 256] = [
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0020, 0x0021, 0x0022, 0x0023,
    0x0024, 0x0025, 0x0026, 0x0027, 0x0028, 0x0029, 0x002A, 0x002B, 0x002C, 0x002D, 0x002E, 0x002F,
    0x0030, 0x0031, 0x0032, 0x0033, 0x0034, 0x0035, 0x0036, 0x0037, 0x0038, 0x0039, 0x003A, 0x003B,
    0x003C, 0x003D, 0x003E, 0x003F, 0x0040, 0x0041, 0x0042, 0x0043, 0x0044, 0x0045, 0x0046, 0x0047,
    0x0048, 0x0049, 0x004A, 0x004B, 0x004C, 0x004D, 0x004E, 0x004F, 0x0050, 0x0051, 0x0052, 0x0053,
    0x0054, 0x0055, 0x0056, 0x0057, 0x0058, 0x0059, 0x005A, 0x005B, 0x005C, 0x005D, 0x005E, 0x005F,
    0x0060, 0x0061, 0x0062, 0x0063, 0x0064, 0x0065, 0x0066, 0x0067, 0x0068, 0x0069, 0x006A, 0x006B,
    0x006C, 0x006D, 0x006E, 0x006F, 0x0070, 0x0071, 0x0072, 0x0073, 0x0074, 0x0075, 0x0076, 0x0077,
    0x0078, 0x0079, 0x007A, 0x007B, 0x007C, 0x007D, 0x007E, 0x0000, 0x00C4, 0x00C5, 0x00C7, 0x00C9,
    0x00D1, 0x00D6, 0x00DC, 0x00E1, 0x00E0, 0x00E2, 0x00E4, 0x00E3, 0x00E5, 0x00E7, 0x00E9, 0x00E8,
    0x00EA, 0x00EB, 0x00ED, 0x00EC, 0x00EE, 0x00EF, 0x00F1, 0x00F3, 0x00F2, 0x00F4, 0x00F6, 0x00F5,
    0x00FA, 0x00F9, 0x00FB, 0x00FC, 0x2020, 0x00B0, 0x00A2, 0x00A3, 0x00A7, 0x2022, 0x00B6, 0x00DF,
    0x00AE, 0x00A9, 0x2122, 0x00B4, 0x00A8, 0x2260, 0x00C6, 0x00D8, 0x221E, 0x00B1, 0x2264, 0x2265,
    0x00A5, 0x00B5, 0x2202, 0x2211, 0x220F, 0x03C0, 0x222B, 0x00AA, 0x00BA, 0x03A9, 0x00E6, 0x00F8,
    0x00BF, 0x00A1, 0x00AC, 0x221A, 0x0192, 0x2248, 0x2206, 0x00AB, 0x00BB, 0x2026, 0x00A0, 0x00C0,
    0x00C3, 0x00D5, 0x0152, 0x0153, 0x2013, 0x2014, 0x201C, 0x201D, 0x2018, 0x2019, 0x00F7, 0x25CA,
    0x00FF, 0x0178, 0x2044, 0x20AC, 0x2039, 0x203A, 0xFB01, 0xFB02, 0x2021, 0x00B7, 0x201A, 0x201E,
    0x2030, 0x00C2, 0x00CA, 0x00C1, 0x00CB, 0x00C8, 0x00CD, 0x00CE, 0x00CF, 0x00CC, 0x00D3, 0x00D4,
    0xF8FF, 0x00D2, 0x00DA, 0x00DB, 0x00D9, 0x0131, 0x02C6, 0x02DC, 0x00AF, 0x02D8, 0x02D9, 0x02DA,
    0x00B8, 0x02DD, 0x02DB, 0x02C7,
];

pub(crate) const STANDARD: [u16; 256] = [
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0020, 0x0021, 0x0022, 0x0023,
    0x0024, 0x0025, 0x0026, 0x2019, 0x0028, 0x0029, 0x002A, 0x002B, 0x002C, 0x002D, 0x002E, 0x002F,
    0x0030, 0x0031, 0x0032, 0x0033, 0x0034, 0x0035, 0x0036, 0x0037, 0x0038, 0x0039, 0x003A, 0x003B,
    0x003C, 0x003D, 0x003E, 0x003F, 0x0040, 0x0041, 0x0042, 0x0043, 0x0044, 0x0045, 0x0046, 0x0047,
    0x0048, 0x0049, 0x004A, 0x004B, 0x004C, 0x004D, 0x004E, 0x004F, 0x0050, 0x0051, 0x0052, 0x0053,
    0x0054, 0x0055, 0x0056, 0x0057, 0x0058, 0x0059, 0x005A, 0x005B, 0x005C, 0x005D, 0x005E, 0x005F,
    0x2018, 0x0061, 0x0062, 0x0063, 0x0064, 0x0065, 0x0066, 0x0067, 0x0068, 0x0069, 0x006A, 0x006B,
    0x006C, 0x006D, 0x006E, 0x006F, 0x0070, 0x0071, 0x0072, 0x0073, 0x0074, 0x0075, 0x0076, 0x0077,
    0x0078, 0x0079, 0x007A, 0x007B, 0x007C, 0x007D, 0x007E, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x00A1, 0x00A2, 0x00A3, 0x2044, 0x00A5, 0x0192, 0x00A7,
    0x00A4, 0x0027, 0x201C, 0x00AB, 0x2039, 0x203A, 0xFB01, 0xFB02, 0x0000, 0x2013, 0x2020, 0x2021,
    0x00B7, 0x0000, 0x00B6, 0x2022, 0x201A, 0x201E, 0x201D, 0x00BB, 0x2026, 0x2030, 0x0000, 0x00BF,
    0x0000, 0x0060, 0x00B4, 0x02C6, 0x02DC, 0x00AF, 0x02D8, 0x02D9, 0x00A8, 0x0000, 0x02DA, 0x00B8,
    0x0000, 0x02DD, 0x02DB, 0x02C7, 0x2014, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x00C6, 0x0000, 0x00AA,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0141, 0x00D8, 0x0152, 0x00BA, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x00E6, 0x0000, 0x0000, 0x0000, 0x0131, 0x0000, 0x0000, 0x0142, 0x00F8, 0x0153, 0x00DF,
    0x0000, 0x0000, 0x0000, 0x0000,
];
