//! XML Entity and Character Reference Decoding
//!
//! Handles the pieces of reference handling that need no grammar:
//! - Built-in entities: &lt; &gt; &amp; &quot; &apos;
//! - Numeric character references: &#123; &#x7B;
//!
//! User-declared entities are expanded by the scanner, which owns the
//! entity table.

/// Names of the five predefined entities.
pub const BUILTIN_ENTITIES: [&str; 5] = ["amp", "lt", "gt", "apos", "quot"];

/// Replacement text of a predefined entity.
#[inline]
pub fn builtin_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

/// Decode the body of a character reference (the text between `&#` and `;`).
///
/// Returns None if the body is malformed or names a code point outside
/// the Unicode scalar range. Character-class checks are left to the caller,
/// since they depend on the document version.
pub fn decode_char_ref(body: &str) -> Option<char> {
    let codepoint = if let Some(hex) = body.strip_prefix('x') {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(hex, 16).ok()?
    } else {
        if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        body.parse::<u32>().ok()?
    };
    char::from_u32(codepoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_entities() {
        assert_eq!(builtin_entity("lt"), Some('<'));
        assert_eq!(builtin_entity("quot"), Some('"'));
        assert_eq!(builtin_entity("nbsp"), None);
        assert!(BUILTIN_ENTITIES.iter().all(|n| builtin_entity(n).is_some()));
    }

    #[test]
    fn test_decimal_reference() {
        assert_eq!(decode_char_ref("65"), Some('A'));
        assert_eq!(decode_char_ref("233"), Some('\u{e9}'));
    }

    #[test]
    fn test_hex_reference() {
        assert_eq!(decode_char_ref("x41"), Some('A'));
        assert_eq!(decode_char_ref("x1F600"), Some('\u{1F600}'));
    }

    #[test]
    fn test_malformed_references() {
        assert_eq!(decode_char_ref(""), None);
        assert_eq!(decode_char_ref("x"), None);
        assert_eq!(decode_char_ref("X41"), None);
        assert_eq!(decode_char_ref("12a"), None);
        assert_eq!(decode_char_ref("xD800"), None);
        assert_eq!(decode_char_ref("x110000"), None);
    }
}
