//! Synchronized pass-through over a shared grammar pool.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Grammar, GrammarDescription, GrammarPool, GrammarType, XmlGrammarPool};

/// Serializes every call on the wrapped pool under one lock.
///
/// Clones share both the pool and the lock.
#[derive(Clone)]
pub struct SynchronizedGrammarPool {
    inner: Arc<dyn GrammarPool>,
    lock: Arc<Mutex<()>>,
}

impl SynchronizedGrammarPool {
    pub fn new(inner: Arc<dyn GrammarPool>) -> Self {
        SynchronizedGrammarPool {
            inner,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The wrapped pool.
    pub fn shared(&self) -> &Arc<dyn GrammarPool> {
        &self.inner
    }
}

impl Default for SynchronizedGrammarPool {
    fn default() -> Self {
        Self::new(Arc::new(XmlGrammarPool::new()))
    }
}

impl GrammarPool for SynchronizedGrammarPool {
    fn retrieve_initial_grammar_set(&self, grammar_type: GrammarType) -> Vec<Grammar> {
        let _guard = self.lock.lock();
        self.inner.retrieve_initial_grammar_set(grammar_type)
    }

    fn retrieve_grammar(&self, description: &GrammarDescription) -> Option<Grammar> {
        let _guard = self.lock.lock();
        self.inner.retrieve_grammar(description)
    }

    fn cache_grammars(&self, grammar_type: GrammarType, grammars: &[Grammar]) {
        let _guard = self.lock.lock();
        self.inner.cache_grammars(grammar_type, grammars)
    }

    fn lock_pool(&self) {
        let _guard = self.lock.lock();
        self.inner.lock_pool()
    }

    fn unlock_pool(&self) {
        let _guard = self.lock.lock();
        self.inner.unlock_pool()
    }

    fn clear(&self) {
        let _guard = self.lock.lock();
        self.inner.clear()
    }

    fn is_locked(&self) -> bool {
        let _guard = self.lock.lock();
        self.inner.is_locked()
    }
}
