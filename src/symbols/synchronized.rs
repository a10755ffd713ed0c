//! Synchronized symbol table shared across parser instances.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Symbol, SymbolSource, SymbolTable};

/// A [`SymbolTable`] behind a lock.
///
/// Cloning yields another handle to the same table. Every read and write
/// takes the lock.
#[derive(Clone, Default)]
pub struct SynchronizedSymbolTable {
    inner: Arc<Mutex<SymbolTable>>,
}

impl SynchronizedSymbolTable {
    pub fn new() -> Self {
        Self::from_table(SymbolTable::new())
    }

    /// Share an existing table.
    pub fn from_table(table: SymbolTable) -> Self {
        SynchronizedSymbolTable {
            inner: Arc::new(Mutex::new(table)),
        }
    }

    pub fn intern(&self, text: &str) -> Symbol {
        self.inner.lock().intern(text)
    }

    pub fn intern_slice(&self, buffer: &str, offset: usize, len: usize) -> Option<Symbol> {
        self.inner.lock().intern_slice(buffer, offset, len)
    }

    pub fn lookup(&self, text: &str) -> Option<Symbol> {
        self.inner.lock().lookup(text)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the current vocabulary as a read-only parent for shadow tables.
    pub fn freeze(&self) -> Arc<SymbolTable> {
        Arc::new(self.inner.lock().clone())
    }
}

impl SymbolSource for SynchronizedSymbolTable {
    fn intern(&mut self, text: &str) -> Symbol {
        SynchronizedSymbolTable::intern(self, text)
    }

    fn lookup(&self, text: &str) -> Option<Symbol> {
        SynchronizedSymbolTable::lookup(self, text)
    }

    fn intern_slice(&mut self, buffer: &str, offset: usize, len: usize) -> Option<Symbol> {
        SynchronizedSymbolTable::intern_slice(self, buffer, offset, len)
    }

    fn len(&self) -> usize {
        SynchronizedSymbolTable::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_concurrent_interning_yields_one_handle() {
        let table = SynchronizedSymbolTable::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = table.clone();
                thread::spawn(move || {
                    (0..100)
                        .map(|i| t.intern(&format!("name{}", i % 10)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<Symbol>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(table.len(), 10);
        for symbols in &results[1..] {
            for (a, b) in results[0].iter().zip(symbols) {
                assert!(a.ptr_eq(b));
            }
        }
    }

    #[test]
    fn test_freeze_snapshots() {
        let table = SynchronizedSymbolTable::new();
        let a = table.intern("a");
        let frozen = table.freeze();
        table.intern("b");
        assert_eq!(frozen.len(), 1);
        assert!(frozen.lookup("a").unwrap().ptr_eq(&a));
    }
}
