//! LRU-backed grammar store.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use super::{Grammar, GrammarDescription, GrammarKey, GrammarPool, GrammarType};

struct PoolState {
    grammars: LruCache<GrammarKey, Grammar>,
    locked: bool,
}

/// Default grammar pool.
///
/// Unbounded unless built with [`XmlGrammarPool::bounded`], in which case the
/// least recently retrieved grammar is evicted first.
pub struct XmlGrammarPool {
    state: Mutex<PoolState>,
}

impl XmlGrammarPool {
    pub fn new() -> Self {
        Self::with_cache(LruCache::unbounded())
    }

    /// Pool holding at most `capacity` grammars.
    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self::with_cache(LruCache::new(capacity))
    }

    fn with_cache(grammars: LruCache<GrammarKey, Grammar>) -> Self {
        XmlGrammarPool {
            state: Mutex::new(PoolState {
                grammars,
                locked: false,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for XmlGrammarPool {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarPool for XmlGrammarPool {
    fn retrieve_initial_grammar_set(&self, grammar_type: GrammarType) -> Vec<Grammar> {
        let state = self.state.lock();
        state
            .grammars
            .iter()
            .filter(|(_, g)| g.grammar_type() == grammar_type)
            .map(|(_, g)| g.clone())
            .collect()
    }

    fn retrieve_grammar(&self, description: &GrammarDescription) -> Option<Grammar> {
        let key = description.key();
        let found = self.state.lock().grammars.get(&key).cloned();
        tracing::trace!(?key, hit = found.is_some(), "grammar pool lookup");
        found
    }

    fn cache_grammars(&self, grammar_type: GrammarType, grammars: &[Grammar]) {
        let mut state = self.state.lock();
        if state.locked {
            tracing::debug!(count = grammars.len(), "grammar pool locked, not caching");
            return;
        }
        for grammar in grammars.iter().filter(|g| g.grammar_type() == grammar_type) {
            let key = grammar.description().key();
            tracing::debug!(?key, "caching grammar");
            state.grammars.put(key, grammar.clone());
        }
    }

    fn lock_pool(&self) {
        self.state.lock().locked = true;
    }

    fn unlock_pool(&self) {
        self.state.lock().locked = false;
    }

    fn clear(&self) {
        self.state.lock().grammars.clear();
    }

    fn is_locked(&self) -> bool {
        self.state.lock().locked
    }
}
