//! Name and word lookup
//!
//! Both lookups share the ranking policy: exact index matches outrank
//! kana-equivalent matches (the query normalized to hiragana), and order
//! is stable within a rank. Word results additionally pass through a
//! pluggable ranker; the engine itself does no gloss scoring.

use crate::error::StoreError;
use crate::kana::{has_hiragana, to_hiragana};
use crate::records::{NameRecord, WordRecord};
use crate::storage::Store;

/// The hiragana form to also query, when the query has one.
pub(crate) fn kana_equivalent(query: &str) -> Option<String> {
    let normalized = to_hiragana(query);
    if has_hiragana(&normalized) {
        Some(normalized)
    } else {
        None
    }
}

pub async fn get_names(store: &Store, query: &str) -> Result<Vec<NameRecord>, StoreError> {
    let normalized = kana_equivalent(query);
    store.get_names(query, normalized.as_deref()).await
}

/// Orders word lookup candidates. The default keeps index order; real
/// frequency- or gloss-based ranking plugs in here without touching the
/// storage schema.
pub trait WordRanker: Send + Sync {
    fn rank(&self, query: &str, results: Vec<WordRecord>) -> Vec<WordRecord>;
}

/// Ranker that preserves the store's insertion order.
pub struct InsertionOrderRanker;

impl WordRanker for InsertionOrderRanker {
    fn rank(&self, _query: &str, results: Vec<WordRecord>) -> Vec<WordRecord> {
        results
    }
}

pub async fn get_words(
    store: &Store,
    query: &str,
    ranker: &dyn WordRanker,
) -> Result<Vec<WordRecord>, StoreError> {
    let normalized = kana_equivalent(query);
    let results = store.get_words(query, normalized.as_deref()).await?;
    Ok(ranker.rank(query, results))
}
