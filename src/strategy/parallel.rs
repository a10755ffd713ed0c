//! Parallel Document Parsing
//!
//! Uses Rayon to parse a batch of documents concurrently. Configurations are
//! never shared between workers; only the resources in [`SharedResources`]
//! are, through their thread-safe wrappers.

use std::sync::Arc;

use rayon::prelude::*;

use crate::config::names;
use crate::config::ParserConfiguration;
use crate::dom::ParsedDocument;
use crate::error::XmlError;
use crate::grammar::GrammarPool;
use crate::input::InputSource;
use crate::parser::ConfigurationRegistry;
use crate::symbols::SymbolTableRef;

/// Resources installed on every worker's configuration.
#[derive(Clone, Default)]
pub struct SharedResources {
    pub symbols: Option<SymbolTableRef>,
    pub grammar_pool: Option<Arc<dyn GrammarPool>>,
}

impl SharedResources {
    fn install(&self, config: &mut ParserConfiguration) -> Result<(), XmlError> {
        if let Some(symbols) = &self.symbols {
            config.set_property(names::SYMBOL_TABLE, Some(symbols.clone().into()))?;
        }
        if let Some(pool) = &self.grammar_pool {
            config.set_property(names::GRAMMAR_POOL, Some(pool.clone().into()))?;
        }
        Ok(())
    }
}

/// Parse every source in parallel. Results keep the order of `sources`.
pub fn parse_all<F>(
    sources: Vec<InputSource>,
    shared: &SharedResources,
    make_config: F,
) -> Vec<Result<ParsedDocument, XmlError>>
where
    F: Fn() -> ParserConfiguration + Sync + Send,
{
    try_parse_all(sources, shared, || Ok(make_config()))
}

/// [`parse_all`] with a fallible configuration constructor. A constructor
/// failure becomes that document's result.
pub fn try_parse_all<F>(
    sources: Vec<InputSource>,
    shared: &SharedResources,
    make_config: F,
) -> Vec<Result<ParsedDocument, XmlError>>
where
    F: Fn() -> Result<ParserConfiguration, XmlError> + Sync + Send,
{
    tracing::debug!(documents = sources.len(), "parallel parse");
    sources
        .into_par_iter()
        .map(|source| {
            let mut config = make_config()?;
            shared.install(&mut config)?;
            config.parse(source)
        })
        .collect()
}

/// [`parse_all`] with configurations taken from `registry`. Fails up front
/// when `name` is not registered.
pub fn parse_all_named(
    sources: Vec<InputSource>,
    shared: &SharedResources,
    registry: &ConfigurationRegistry,
    name: &str,
) -> Result<Vec<Result<ParsedDocument, XmlError>>, XmlError> {
    if !registry.contains(name) {
        return Err(XmlError::structural(format!(
            "no configuration registered as \"{}\"",
            name
        )));
    }
    Ok(try_parse_all(sources, shared, || registry.create(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{SynchronizedGrammarPool, XmlGrammarPool};
    use crate::symbols::SynchronizedSymbolTable;

    fn batch() -> Vec<InputSource> {
        (0..16)
            .map(|i| {
                if i == 5 {
                    InputSource::from_text("<broken>")
                } else {
                    InputSource::from_text(format!("<doc n='{}'><item>{}</item></doc>", i, i))
                }
            })
            .collect()
    }

    #[test]
    fn test_results_keep_source_order() {
        let shared = SharedResources::default();
        let results = parse_all(batch(), &shared, ParserConfiguration::standard);
        assert_eq!(results.len(), 16);
        for (i, result) in results.into_iter().enumerate() {
            if i == 5 {
                assert!(result.is_err());
                continue;
            }
            let doc = result.unwrap().into_document();
            assert_eq!(doc.document_element().unwrap().text_content(), i.to_string());
        }
    }

    #[test]
    fn test_shared_symbol_table_collects_names() {
        let table = SynchronizedSymbolTable::new();
        let shared = SharedResources {
            symbols: Some(SymbolTableRef::Synchronized(table.clone())),
            grammar_pool: Some(Arc::new(SynchronizedGrammarPool::new(Arc::new(
                XmlGrammarPool::new(),
            )))),
        };
        let results = parse_all(batch(), &shared, ParserConfiguration::non_validating);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 15);
        assert!(table.lookup("doc").is_some());
        assert!(table.lookup("item").is_some());
    }

    #[test]
    fn test_named_configuration() {
        let registry = ConfigurationRegistry::default();
        let sources = vec![InputSource::from_text("<a/>"), InputSource::from_text("<b/>")];
        let shared = SharedResources::default();
        let results = parse_all_named(sources, &shared, &registry, "schema").unwrap();
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(parse_all_named(Vec::new(), &shared, &registry, "nope").is_err());
    }

    #[test]
    fn test_configuration_failure_reported_per_document() {
        let sources = vec![InputSource::from_text("<a/>"), InputSource::from_text("<b/>")];
        let results = try_parse_all(sources, &SharedResources::default(), || {
            ConfigurationRegistry::new().create("standard")
        });
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, Err(XmlError::Structural(_)))));
    }
}
