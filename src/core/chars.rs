//! XML Character Classes
//!
//! Name and character rules for the two supported XML versions. Name
//! productions are shared (XML 1.0 fifth edition adopted the 1.1 ranges);
//! the versions differ in which characters may appear literally and in which
//! characters end a line.

use std::borrow::Cow;
use std::fmt;

/// Declared XML version of a document; selects the scanning rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum XmlVersion {
    #[default]
    V1_0,
    V1_1,
}

impl XmlVersion {
    /// Parse the value of a `version` pseudo-attribute.
    pub fn from_declared(value: &str) -> Option<Self> {
        match value {
            "1.0" => Some(XmlVersion::V1_0),
            "1.1" => Some(XmlVersion::V1_1),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            XmlVersion::V1_0 => "1.0",
            XmlVersion::V1_1 => "1.1",
        }
    }

    /// Check if `c` may appear literally in a document of this version.
    #[inline]
    pub fn is_literal_char(self, c: char) -> bool {
        match self {
            XmlVersion::V1_0 => is_char_10(c),
            XmlVersion::V1_1 => is_char_11(c) && !is_restricted_11(c),
        }
    }

    /// Check if `c` may be produced by a character reference.
    #[inline]
    pub fn is_referenceable_char(self, c: char) -> bool {
        match self {
            XmlVersion::V1_0 => is_char_10(c),
            XmlVersion::V1_1 => is_char_11(c),
        }
    }

    /// Normalize line ends to `\n`.
    ///
    /// 1.0 maps `\r\n` and `\r`; 1.1 additionally maps `\r\u{85}`, `\u{85}`
    /// and `\u{2028}`.
    pub fn normalize_line_ends(self, text: &str) -> Cow<'_, str> {
        let needs = match self {
            XmlVersion::V1_0 => memchr::memchr(b'\r', text.as_bytes()).is_some(),
            XmlVersion::V1_1 => text.contains(['\r', '\u{85}', '\u{2028}']),
        };
        if !needs {
            return Cow::Borrowed(text);
        }

        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\r' => {
                    out.push('\n');
                    match chars.peek() {
                        Some('\n') => {
                            chars.next();
                        }
                        Some('\u{85}') if self == XmlVersion::V1_1 => {
                            chars.next();
                        }
                        _ => {}
                    }
                }
                '\u{85}' | '\u{2028}' if self == XmlVersion::V1_1 => out.push('\n'),
                _ => out.push(c),
            }
        }
        Cow::Owned(out)
    }
}

impl fmt::Display for XmlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline]
fn is_char_10(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}' |
        '\u{20}'..='\u{D7FF}' |
        '\u{E000}'..='\u{FFFD}' |
        '\u{10000}'..='\u{10FFFF}'
    )
}

#[inline]
fn is_char_11(c: char) -> bool {
    matches!(c,
        '\u{1}'..='\u{D7FF}' |
        '\u{E000}'..='\u{FFFD}' |
        '\u{10000}'..='\u{10FFFF}'
    )
}

#[inline]
fn is_restricted_11(c: char) -> bool {
    matches!(c,
        '\u{1}'..='\u{8}' |
        '\u{B}'..='\u{C}' |
        '\u{E}'..='\u{1F}' |
        '\u{7F}'..='\u{84}' |
        '\u{86}'..='\u{9F}'
    )
}

/// NameStartChar production.
#[inline]
pub fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' |
        '\u{D8}'..='\u{F6}' |
        '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' |
        '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' |
        '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' |
        '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' |
        '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

/// NameChar production.
#[inline]
pub fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' |
            '\u{203F}'..='\u{2040}'
        )
}

/// XML whitespace (S production).
#[inline]
pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Check if `s` matches the Name production.
pub fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

/// Check if `s` matches the Nmtoken production.
pub fn is_nmtoken(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_name_char)
}

/// Check if `s` is a name without colons (NCName).
pub fn is_ncname(s: &str) -> bool {
    is_name(s) && !s.contains(':')
}

/// Check if `s` consists only of XML whitespace.
pub fn is_all_whitespace(s: &str) -> bool {
    s.chars().all(is_whitespace)
}

/// Check if `s` is a valid PubidLiteral body.
pub fn is_pubid(s: &str) -> bool {
    s.chars().all(|c| {
        matches!(c,
            ' ' | '\r' | '\n' | 'a'..='z' | 'A'..='Z' | '0'..='9' |
            '-' | '\'' | '(' | ')' | '+' | ',' | '.' | '/' | ':' |
            '=' | '?' | ';' | '!' | '*' | '#' | '@' | '$' | '_' | '%'
        )
    })
}

/// Trim and collapse runs of spaces, as for tokenized attribute types.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for token in s.split(is_whitespace).filter(|t| !t.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert!(is_name("root"));
        assert!(is_name("x:y"));
        assert!(is_name("_a-b.c"));
        assert!(!is_name("1abc"));
        assert!(!is_name(""));
        assert!(is_nmtoken("123"));
        assert!(!is_ncname("a:b"));
    }

    #[test]
    fn test_unicode_names() {
        assert!(is_name("élément"));
        assert!(is_name("名前"));
    }

    #[test]
    fn test_literal_chars_by_version() {
        assert!(!XmlVersion::V1_0.is_literal_char('\u{1}'));
        assert!(!XmlVersion::V1_1.is_literal_char('\u{1}'));
        assert!(XmlVersion::V1_1.is_referenceable_char('\u{1}'));
        assert!(!XmlVersion::V1_0.is_referenceable_char('\u{1}'));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a   b\tc  "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_line_ends_10() {
        let out = XmlVersion::V1_0.normalize_line_ends("a\r\nb\rc\u{85}");
        assert_eq!(out, "a\nb\nc\u{85}");
    }

    #[test]
    fn test_line_ends_11() {
        let out = XmlVersion::V1_1.normalize_line_ends("a\r\u{85}b\u{2028}c\u{85}");
        assert_eq!(out, "a\nb\nc\n");
    }

    #[test]
    fn test_no_line_end_work_borrows() {
        assert!(matches!(
            XmlVersion::V1_0.normalize_line_ends("plain"),
            Cow::Borrowed(_)
        ));
    }
}
