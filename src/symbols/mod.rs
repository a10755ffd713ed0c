//! Symbol Table
//!
//! Interns element, attribute, prefix and namespace strings so equal
//! content maps to one shared handle.
//!
//! Three flavours share one contract ([`SymbolSource`]):
//! - [`SymbolTable`]: plain single-owner table
//! - [`SynchronizedSymbolTable`]: one table shared between parsers under a lock
//! - [`ShadowSymbolTable`]: private layer over a frozen parent, lock-free for
//!   symbols the parent already holds
//!
//! Hashing is defined over characters so a symbol can be looked up from a
//! slice of a larger buffer without first building a `String`.

mod shadow;
mod synchronized;

pub use shadow::ShadowSymbolTable;
pub use synchronized::SynchronizedSymbolTable;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// An interned string.
///
/// Two symbols from the same table are equal exactly when they share storage;
/// equality falls back to content so symbols from different tables still
/// compare sensibly.
#[derive(Clone)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Check whether two symbols are the same interned handle.
    #[inline]
    pub fn ptr_eq(&self, other: &Symbol) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a symbol outside of any table. Used for names synthesized
    /// after a parse, when no table is at hand.
    pub fn detached(text: &str) -> Self {
        Symbol(Arc::from(text))
    }
}

impl PartialEq for Symbol {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Deref for Symbol {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Symbol hash of a string.
///
/// `h = h * 31 + unit` over UTF-16 code units, masked to a non-negative
/// 31-bit value.
#[inline]
pub fn hash(text: &str) -> u32 {
    let mut h: u32 = 0;
    for unit in text.encode_utf16() {
        h = h.wrapping_mul(31).wrapping_add(unit as u32);
    }
    h & 0x7FFF_FFFF
}

/// Symbol hash of `buffer[offset..offset + len]`.
///
/// Agrees with [`hash`] on the same characters. Returns None if the range
/// is out of bounds or does not fall on character boundaries.
#[inline]
pub fn hash_slice(buffer: &str, offset: usize, len: usize) -> Option<u32> {
    buffer.get(offset..offset.checked_add(len)?).map(hash)
}

/// Anything a scanner can intern names through.
pub trait SymbolSource: Send {
    /// Intern `text`, returning the canonical handle.
    fn intern(&mut self, text: &str) -> Symbol;

    /// Look up `text` without adding it.
    fn lookup(&self, text: &str) -> Option<Symbol>;

    /// Intern a slice of a larger buffer.
    fn intern_slice(&mut self, buffer: &str, offset: usize, len: usize) -> Option<Symbol> {
        let text = buffer.get(offset..offset.checked_add(len)?)?;
        Some(self.intern(text))
    }

    /// Number of symbols this source has stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Plain interning table.
///
/// Storage grows monotonically; nothing is ever removed.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Symbols in insertion order
    entries: Vec<Symbol>,
    /// Symbol hash -> indices into `entries` with that hash
    index: HashMap<u32, Vec<u32>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            entries: Vec::with_capacity(256),
            index: HashMap::with_capacity(256),
        }
    }

    /// Intern `text`.
    pub fn intern(&mut self, text: &str) -> Symbol {
        let h = hash(text);
        if let Some(found) = self.find(h, text) {
            return found;
        }
        let symbol = Symbol(Arc::from(text));
        let id = self.entries.len() as u32;
        self.entries.push(symbol.clone());
        self.index.entry(h).or_default().push(id);
        symbol
    }

    /// Intern `buffer[offset..offset + len]`.
    pub fn intern_slice(&mut self, buffer: &str, offset: usize, len: usize) -> Option<Symbol> {
        let text = buffer.get(offset..offset.checked_add(len)?)?;
        Some(self.intern(text))
    }

    /// Look up `text` without adding it.
    pub fn lookup(&self, text: &str) -> Option<Symbol> {
        self.find(hash(text), text)
    }

    /// Look up `buffer[offset..offset + len]` without adding it.
    pub fn lookup_slice(&self, buffer: &str, offset: usize, len: usize) -> Option<Symbol> {
        let text = buffer.get(offset..offset.checked_add(len)?)?;
        self.lookup(text)
    }

    /// Look up by precomputed hash.
    pub fn lookup_hashed(&self, h: u32, text: &str) -> Option<Symbol> {
        self.find(h, text)
    }

    #[inline]
    fn find(&self, h: u32, text: &str) -> Option<Symbol> {
        self.index.get(&h).and_then(|ids| {
            ids.iter()
                .map(|&id| &self.entries[id as usize])
                .find(|s| s.as_str() == text)
                .cloned()
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate symbols in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.iter()
    }
}

impl SymbolSource for SymbolTable {
    fn intern(&mut self, text: &str) -> Symbol {
        SymbolTable::intern(self, text)
    }

    fn lookup(&self, text: &str) -> Option<Symbol> {
        SymbolTable::lookup(self, text)
    }

    fn len(&self) -> usize {
        SymbolTable::len(self)
    }
}

/// How a configuration shares its vocabulary with other parsers.
///
/// Set through the symbol-table property; each parse opens a fresh
/// [`SymbolSource`] from it.
#[derive(Clone)]
pub enum SymbolTableRef {
    /// All parsers intern into one locked table.
    Synchronized(SynchronizedSymbolTable),
    /// Each parse gets a private layer over a frozen parent.
    Shadowed(Arc<SymbolTable>),
}

impl SymbolTableRef {
    /// Open a source for one parse.
    pub fn open(&self) -> Box<dyn SymbolSource> {
        match self {
            SymbolTableRef::Synchronized(table) => Box::new(table.clone()),
            SymbolTableRef::Shadowed(parent) => Box::new(ShadowSymbolTable::new(parent.clone())),
        }
    }
}

impl fmt::Debug for SymbolTableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolTableRef::Synchronized(t) => write!(f, "Synchronized({} symbols)", t.len()),
            SymbolTableRef::Shadowed(p) => write!(f, "Shadowed({} parent symbols)", p.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_intern_returns_same_handle() {
        let mut table = SymbolTable::new();
        let a = table.intern("element");
        let b = table.intern("element");
        assert!(a.ptr_eq(&b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_distinct_strings_distinct_handles() {
        let mut table = SymbolTable::new();
        let a = table.intern("a");
        let b = table.intern("b");
        assert!(!a.ptr_eq(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_intern_slice_matches_intern() {
        let mut table = SymbolTable::new();
        let buffer = "<root attr='v'>";
        let from_slice = table.intern_slice(buffer, 1, 4).unwrap();
        let direct = table.intern("root");
        assert!(from_slice.ptr_eq(&direct));
        assert!(table.intern_slice(buffer, 10, 100).is_none());
    }

    #[test]
    fn test_lookup_does_not_add() {
        let mut table = SymbolTable::new();
        assert!(table.lookup("x").is_none());
        assert_eq!(table.len(), 0);
        let x = table.intern("x");
        assert!(table.lookup("x").unwrap().ptr_eq(&x));
        assert!(table.lookup_slice("axb", 1, 1).unwrap().ptr_eq(&x));
    }

    #[test]
    fn test_hash_known_values() {
        assert_eq!(hash(""), 0);
        assert_eq!(hash("a"), 97);
        assert_eq!(hash("ab"), 97 * 31 + 98);
    }

    #[test]
    fn test_table_ref_synchronized_shares_vocabulary() {
        let shared = SynchronizedSymbolTable::new();
        let table_ref = SymbolTableRef::Synchronized(shared.clone());
        let mut first = table_ref.open();
        let mut second = table_ref.open();
        let a = first.intern("shared");
        let b = second.intern("shared");
        assert!(a.ptr_eq(&b));
        assert_eq!(shared.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_intern_idempotent(s in "\\PC{0,24}") {
            let mut table = SymbolTable::new();
            let a = table.intern(&s);
            let b = table.intern(&s);
            prop_assert!(a.ptr_eq(&b));
            prop_assert_eq!(table.len(), 1);
        }

        #[test]
        fn prop_hash_slice_consistent(
            prefix in "\\PC{0,8}",
            body in "\\PC{0,16}",
            suffix in "\\PC{0,8}"
        ) {
            let buffer = format!("{}{}{}", prefix, body, suffix);
            prop_assert_eq!(hash_slice(&buffer, prefix.len(), body.len()), Some(hash(&body)));
        }
    }
}
