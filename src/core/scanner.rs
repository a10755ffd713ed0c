//! SIMD-accelerated XML cursor using memchr
//!
//! A position over UTF-8 text. Delimiter searches use memchr (SSE2/AVX2/NEON
//! when available); name reads decode characters so Unicode names work.
//! Every slice it hands out ends on an ASCII delimiter or a decoded character
//! boundary, so slicing the underlying `str` never splits a character.

use memchr::{memchr, memchr2, memmem};

use super::chars::{is_name_char, is_name_start_char};

/// Cursor for XML delimiter detection
pub struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given input
    #[inline]
    pub fn new(input: &'a str) -> Self {
        Scanner { input, pos: 0 }
    }

    /// Create a scanner starting at `pos`
    #[inline]
    pub fn at(input: &'a str, pos: usize) -> Self {
        Scanner { input, pos }
    }

    /// Get the current position
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Set the current position
    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Check if we've reached the end
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Get remaining text
    #[inline]
    pub fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Get a slice from start to end positions
    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.input[start..end]
    }

    /// Peek at current byte without advancing
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    /// Peek at byte at offset from current position
    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    /// Peek at the current character
    #[inline]
    pub fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// Advance by n bytes
    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    /// Advance past the current character, returning it
    #[inline]
    pub fn next_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skip whitespace characters (space, tab, newline, carriage return).
    /// Returns true if anything was skipped.
    #[inline]
    pub fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
        self.pos > start
    }

    /// Find next '<' or '&' (text content boundaries)
    #[inline]
    pub fn find_text_boundary(&self) -> Option<usize> {
        memchr2(b'<', b'&', &self.input.as_bytes()[self.pos..]).map(|i| self.pos + i)
    }

    /// Find next occurrence of a byte sequence
    #[inline]
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        memmem::find(&self.input.as_bytes()[self.pos..], needle).map(|i| self.pos + i)
    }

    /// Find tag end while handling quotes properly
    /// Returns the position of '>' that is not inside quotes
    pub fn find_tag_end_quoted(&self) -> Option<usize> {
        let bytes = self.input.as_bytes();
        let mut pos = self.pos;
        let mut quote: Option<u8> = None;

        while pos < bytes.len() {
            match (bytes[pos], quote) {
                (b'"' | b'\'', None) => quote = Some(bytes[pos]),
                (q, Some(open)) if q == open => quote = None,
                (b'>', None) => return Some(pos),
                _ => {}
            }
            pos += 1;
        }
        None
    }

    /// Check if input starts with a byte sequence at current position
    #[inline]
    pub fn starts_with(&self, needle: &[u8]) -> bool {
        self.input.as_bytes()[self.pos..].starts_with(needle)
    }

    /// Consume `needle` if present
    #[inline]
    pub fn eat(&mut self, needle: &[u8]) -> bool {
        if self.starts_with(needle) {
            self.pos += needle.len();
            true
        } else {
            false
        }
    }

    /// Read text up to `delimiter`, advancing past the delimiter
    pub fn read_until(&mut self, delimiter: &[u8]) -> Option<&'a str> {
        let end = self.find(delimiter)?;
        let slice = &self.input[self.pos..end];
        self.pos = end + delimiter.len();
        Some(slice)
    }

    /// Read an XML Name
    pub fn read_name(&mut self) -> Option<&'a str> {
        let start = self.pos;
        match self.peek_char() {
            Some(c) if is_name_start_char(c) => self.pos += c.len_utf8(),
            _ => return None,
        }
        self.consume_name_chars();
        Some(&self.input[start..self.pos])
    }

    /// Read an XML Nmtoken
    pub fn read_nmtoken(&mut self) -> Option<&'a str> {
        let start = self.pos;
        self.consume_name_chars();
        if self.pos == start {
            None
        } else {
            Some(&self.input[start..self.pos])
        }
    }

    fn consume_name_chars(&mut self) {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            if b < 0x80 {
                if is_name_char(b as char) {
                    self.pos += 1;
                } else {
                    break;
                }
            } else {
                match self.peek_char() {
                    Some(c) if is_name_char(c) => self.pos += c.len_utf8(),
                    _ => break,
                }
            }
        }
    }

    /// Read a single- or double-quoted literal, returning its body
    pub fn read_quoted(&mut self) -> Option<&'a str> {
        let quote = self.peek()?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        let start = self.pos + 1;
        let len = memchr(quote, &self.input.as_bytes()[start..])?;
        self.pos = start + len + 1;
        Some(&self.input[start..start + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_text_boundary() {
        let scanner = Scanner::new("hello &amp; <world>");
        assert_eq!(scanner.find_text_boundary(), Some(6));
    }

    #[test]
    fn test_find_tag_end_quoted() {
        let scanner = Scanner::new("<a attr=\">test\">content");
        assert_eq!(scanner.find_tag_end_quoted(), Some(15));
    }

    #[test]
    fn test_read_name() {
        let mut scanner = Scanner::new("element-name>");
        assert_eq!(scanner.read_name(), Some("element-name"));
        assert_eq!(scanner.position(), 12);
    }

    #[test]
    fn test_read_unicode_name() {
        let mut scanner = Scanner::new("données/>");
        assert_eq!(scanner.read_name(), Some("données"));
        assert_eq!(scanner.peek(), Some(b'/'));
    }

    #[test]
    fn test_read_name_rejects_digit_start() {
        let mut scanner = Scanner::new("1abc");
        assert_eq!(scanner.read_name(), None);
        assert_eq!(scanner.read_nmtoken(), Some("1abc"));
    }

    #[test]
    fn test_skip_whitespace() {
        let mut scanner = Scanner::new("  \t\n hello");
        assert!(scanner.skip_whitespace());
        assert_eq!(scanner.position(), 5);
        assert!(!scanner.skip_whitespace());
    }

    #[test]
    fn test_read_quoted_and_until() {
        let mut scanner = Scanner::new("'single' rest-->tail");
        assert_eq!(scanner.read_quoted(), Some("single"));
        assert_eq!(scanner.read_until(b"-->"), Some(" rest"));
        assert_eq!(scanner.remaining(), "tail");
    }
}
