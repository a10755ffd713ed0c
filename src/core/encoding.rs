//! XML Encoding Detection and Conversion
//!
//! Handles detection of UTF-16 and other encodings based on BOM, byte
//! patterns and the encoding declaration. Converts everything to UTF-8 text
//! before scanning, then sniffs the declared XML version so the matching
//! scanner rules can be selected before the main scan begins.

use super::chars::XmlVersion;

/// Detect the encoding of XML input based on BOM or byte patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
}

impl XmlEncoding {
    /// Detect encoding from byte order mark or initial bytes
    pub fn detect(input: &[u8]) -> Self {
        if input.len() < 2 {
            return XmlEncoding::Utf8;
        }

        match (input[0], input[1]) {
            // UTF-16 LE BOM: 0xFF 0xFE
            (0xFF, 0xFE) => XmlEncoding::Utf16Le,
            // UTF-16 BE BOM: 0xFE 0xFF
            (0xFE, 0xFF) => XmlEncoding::Utf16Be,
            // No BOM - check for UTF-16 pattern (< followed by null or null followed by <)
            (0x00, b'<') => XmlEncoding::Utf16Be,
            (b'<', 0x00) => XmlEncoding::Utf16Le,
            _ => match declared_encoding(input) {
                Some(name) if is_latin1_label(&name) => XmlEncoding::Latin1,
                _ => XmlEncoding::Utf8,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            XmlEncoding::Utf8 => "UTF-8",
            XmlEncoding::Utf16Le => "UTF-16LE",
            XmlEncoding::Utf16Be => "UTF-16BE",
            XmlEncoding::Latin1 => "ISO-8859-1",
        }
    }
}

fn is_latin1_label(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "ISO-8859-1" | "ISO8859-1" | "LATIN1" | "L1" | "US-ASCII" | "ASCII"
    )
}

/// Read the `encoding` pseudo-attribute of an ASCII-compatible XML declaration.
pub fn declared_encoding(input: &[u8]) -> Option<String> {
    let decl = xml_declaration(input)?;
    pseudo_attribute(decl, b"encoding").and_then(|v| String::from_utf8(v.to_vec()).ok())
}

/// Sniff the declared XML version; documents without a declaration are 1.0.
pub fn sniff_version(text: &str) -> XmlVersion {
    xml_declaration(text.as_bytes())
        .and_then(|decl| pseudo_attribute(decl, b"version"))
        .and_then(|v| std::str::from_utf8(v).ok())
        .and_then(XmlVersion::from_declared)
        .unwrap_or_default()
}

/// The bytes between `<?xml` and `?>`, if the input opens with a declaration.
fn xml_declaration(input: &[u8]) -> Option<&[u8]> {
    let input = input.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(input);
    let rest = input.strip_prefix(b"<?xml")?;
    if !matches!(rest.first(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
        return None;
    }
    let end = memchr::memmem::find(rest, b"?>")?;
    Some(&rest[..end])
}

fn pseudo_attribute<'a>(decl: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
    let at = memchr::memmem::find(decl, name)?;
    let mut pos = at + name.len();
    while pos < decl.len() && matches!(decl[pos], b' ' | b'\t' | b'\r' | b'\n') {
        pos += 1;
    }
    if decl.get(pos) != Some(&b'=') {
        return None;
    }
    pos += 1;
    while pos < decl.len() && matches!(decl[pos], b' ' | b'\t' | b'\r' | b'\n') {
        pos += 1;
    }
    let quote = *decl.get(pos)?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let start = pos + 1;
    let len = memchr::memchr(quote, &decl[start..])?;
    Some(&decl[start..start + len])
}

/// Convert raw input bytes to UTF-8 text.
///
/// Strips any byte order mark. Fails if the bytes are not valid in the
/// detected encoding.
pub fn decode(input: Vec<u8>) -> Result<(String, XmlEncoding), String> {
    let encoding = XmlEncoding::detect(&input);

    let text = match encoding {
        XmlEncoding::Utf8 => {
            let bytes = if input.starts_with(&[0xEF, 0xBB, 0xBF]) {
                input[3..].to_vec()
            } else {
                input
            };
            String::from_utf8(bytes).map_err(|e| format!("Invalid UTF-8: {}", e))?
        }
        XmlEncoding::Utf16Le => convert_utf16(&input, [0xFF, 0xFE], u16::from_le_bytes)?,
        XmlEncoding::Utf16Be => convert_utf16(&input, [0xFE, 0xFF], u16::from_be_bytes)?,
        XmlEncoding::Latin1 => input.iter().map(|&b| b as char).collect(),
    };

    Ok((text, encoding))
}

/// Convert UTF-16 to UTF-8 given the BOM to skip and the byte order
fn convert_utf16(
    input: &[u8],
    bom: [u8; 2],
    unit: fn([u8; 2]) -> u16,
) -> Result<String, String> {
    let start = if input.starts_with(&bom) { 2 } else { 0 };
    let bytes = &input[start..];

    if bytes.len() % 2 != 0 {
        return Err("Invalid UTF-16: odd number of bytes".to_string());
    }

    let code_units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| unit([chunk[0], chunk[1]]))
        .collect();

    String::from_utf16(&code_units).map_err(|e| format!("Invalid UTF-16: {}", e))
}
