//! Shadow symbol table: private layer over a read-only parent.

use std::sync::Arc;

use super::{hash, Symbol, SymbolSource, SymbolTable};

/// Interns into a private table, deferring to a frozen parent first.
///
/// The parent is never written, so lookups of symbols it already holds take
/// no lock. Only genuinely new names are stored locally.
#[derive(Debug, Clone)]
pub struct ShadowSymbolTable {
    parent: Arc<SymbolTable>,
    local: SymbolTable,
}

impl ShadowSymbolTable {
    pub fn new(parent: Arc<SymbolTable>) -> Self {
        ShadowSymbolTable {
            parent,
            local: SymbolTable::default(),
        }
    }

    pub fn intern(&mut self, text: &str) -> Symbol {
        let h = hash(text);
        if let Some(found) = self.parent.lookup_hashed(h, text) {
            return found;
        }
        self.local.intern(text)
    }

    pub fn lookup(&self, text: &str) -> Option<Symbol> {
        let h = hash(text);
        self.parent
            .lookup_hashed(h, text)
            .or_else(|| self.local.lookup_hashed(h, text))
    }

    /// Number of symbols stored in the private layer.
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    pub fn parent(&self) -> &Arc<SymbolTable> {
        &self.parent
    }
}

impl SymbolSource for ShadowSymbolTable {
    fn intern(&mut self, text: &str) -> Symbol {
        ShadowSymbolTable::intern(self, text)
    }

    fn lookup(&self, text: &str) -> Option<Symbol> {
        ShadowSymbolTable::lookup(self, text)
    }

    fn len(&self) -> usize {
        self.parent.len() + self.local.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parent_with(names: &[&str]) -> Arc<SymbolTable> {
        let mut table = SymbolTable::new();
        for n in names {
            table.intern(n);
        }
        Arc::new(table)
    }

    #[test]
    fn test_parent_symbol_reused() {
        let parent = parent_with(&["root"]);
        let mut shadow = ShadowSymbolTable::new(parent.clone());
        let s = shadow.intern("root");
        assert!(s.ptr_eq(&parent.lookup("root").unwrap()));
        assert_eq!(shadow.local_len(), 0);
    }

    #[test]
    fn test_new_symbols_stay_local() {
        let parent = parent_with(&["root"]);
        let mut shadow = ShadowSymbolTable::new(parent.clone());
        let a = shadow.intern("fresh");
        let b = shadow.intern("fresh");
        assert!(a.ptr_eq(&b));
        assert_eq!(shadow.local_len(), 1);
        assert!(parent.lookup("fresh").is_none());
        assert_eq!(SymbolSource::len(&shadow), 2);
    }

    #[test]
    fn test_sibling_shadows_do_not_share_locals() {
        let parent = parent_with(&[]);
        let mut one = ShadowSymbolTable::new(parent.clone());
        let two = ShadowSymbolTable::new(parent);
        one.intern("only-here");
        assert!(two.lookup("only-here").is_none());
    }

    proptest! {
        #[test]
        fn prop_shadow_never_duplicates_parent(
            names in proptest::collection::vec("[a-z]{1,6}", 1..20)
        ) {
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let parent = parent_with(&refs);
            let mut shadow = ShadowSymbolTable::new(parent.clone());
            for n in &names {
                let s = shadow.intern(n);
                prop_assert!(s.ptr_eq(&parent.lookup(n).unwrap()));
            }
            prop_assert_eq!(shadow.local_len(), 0);
        }
    }
}
