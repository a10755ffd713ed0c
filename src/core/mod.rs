//! Core XML parsing primitives
//!
//! The building blocks the pipeline stages share:
//! - Scanner: memchr-accelerated cursor over decoded text
//! - Chars: XML 1.0 / 1.1 character and name classes
//! - Entities: built-in and character reference decoding
//! - Encoding: BOM sniffing and UTF-16 / Latin-1 conversion to UTF-8

pub mod chars;
pub mod encoding;
pub mod entities;
pub mod scanner;
