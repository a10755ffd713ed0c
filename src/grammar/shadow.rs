//! Layered grammar pool: private store first, shared pool second.

use std::sync::Arc;

use super::{Grammar, GrammarDescription, GrammarPool, GrammarType, XmlGrammarPool};

/// Where a [`ShadowGrammarPool`] stores newly cached grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowWrites {
    /// Private layer and shared pool.
    #[default]
    WriteThrough,
    /// Private layer only.
    PrivateOnly,
}

/// Checks a private pool before falling back to a shared one.
///
/// Lock and clear act on the private layer; the shared pool is governed by
/// its own owner.
pub struct ShadowGrammarPool {
    private: XmlGrammarPool,
    shared: Arc<dyn GrammarPool>,
    writes: ShadowWrites,
}

impl ShadowGrammarPool {
    pub fn new(shared: Arc<dyn GrammarPool>) -> Self {
        Self::with_writes(shared, ShadowWrites::default())
    }

    pub fn with_writes(shared: Arc<dyn GrammarPool>, writes: ShadowWrites) -> Self {
        ShadowGrammarPool {
            private: XmlGrammarPool::new(),
            shared,
            writes,
        }
    }

    /// Number of grammars in the private layer.
    pub fn private_len(&self) -> usize {
        self.private.len()
    }

    pub fn shared(&self) -> &Arc<dyn GrammarPool> {
        &self.shared
    }
}

impl GrammarPool for ShadowGrammarPool {
    fn retrieve_initial_grammar_set(&self, grammar_type: GrammarType) -> Vec<Grammar> {
        let mut grammars = self.private.retrieve_initial_grammar_set(grammar_type);
        for g in self.shared.retrieve_initial_grammar_set(grammar_type) {
            let key = g.description().key();
            if !grammars.iter().any(|p| p.description().key() == key) {
                grammars.push(g);
            }
        }
        grammars
    }

    fn retrieve_grammar(&self, description: &GrammarDescription) -> Option<Grammar> {
        self.private
            .retrieve_grammar(description)
            .or_else(|| self.shared.retrieve_grammar(description))
    }

    fn cache_grammars(&self, grammar_type: GrammarType, grammars: &[Grammar]) {
        if self.private.is_locked() {
            return;
        }
        self.private.cache_grammars(grammar_type, grammars);
        if self.writes == ShadowWrites::WriteThrough {
            self.shared.cache_grammars(grammar_type, grammars);
        }
    }

    fn lock_pool(&self) {
        self.private.lock_pool();
    }

    fn unlock_pool(&self) {
        self.private.unlock_pool();
    }

    fn clear(&self) {
        self.private.clear();
    }

    fn is_locked(&self) -> bool {
        self.private.is_locked()
    }
}
