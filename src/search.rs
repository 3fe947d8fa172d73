//! Tag and keyword search.
//!
//! A search request names zero or more tags and an optional free-text
//! phrase. Each tag becomes one lookup, and the phrase becomes one more
//! lookup that covers all of its words. The lookups run as concurrent tasks
//! in a [`JoinSet`]; the set itself is the only record of how many results
//! to wait for, so dispatch and collection can never disagree.
//!
//! Every lookup yields a [`Hits`] map of `kind -> item id -> match count`.
//! The final answer is the intersection of all of them: an item survives only
//! if every lookup found it, and its count is the sum of its per-lookup
//! counts (a ranking aid, not a filter).
//!
//! # Usage
//!
//! ```rust,no_run
//! use mealplan_core::search::{SearchParams, Searcher};
//! # use mealplan_core::store::{Store, key::{Key, Kind}};
//! # async fn demo(store: Store, library: Key) -> mealplan_core::PlannerResult<()> {
//! let searcher = Searcher::new(store, library);
//! let params = SearchParams {
//!     tags: vec!["dinner".into()],
//!     word: "tomato soup".into(),
//! };
//! let hits = searcher.search(&params).await?;
//! if let Some(dishes) = hits.get("Dish") {
//!     for (id, count) in dishes {
//!         println!("{id}: {count}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::PlannerResult;
use crate::keywords;
use crate::store::key::{Key, Kind};
use crate::store::{Query, Store};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::task::JoinSet;
use tracing::debug;

/// Matches grouped by the kind of the matching item, then by its encoded key.
pub type Hits = BTreeMap<String, BTreeMap<String, u32>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SearchParams {
    /// Exact tag words; an item must carry all of them.
    pub tags: Vec<String>,
    /// Free text matched against derived keywords.
    pub word: String,
}

/// Records a match on the parent of `key` (the item a tag, keyword or
/// measured ingredient belongs to).
pub fn add_hit(key: &Key, hits: &mut Hits) {
    if let Some(parent) = key.parent() {
        *hits
            .entry(parent.kind().to_string())
            .or_default()
            .entry(parent.encode())
            .or_insert(0) += 1;
    }
}

/// Keeps only items present in both maps, summing their counts.
pub fn intersect(left: Hits, right: Hits) -> Hits {
    let mut merged = Hits::new();
    for (kind, left_ids) in left {
        let Some(right_ids) = right.get(&kind) else {
            continue;
        };
        let ids: BTreeMap<String, u32> = left_ids
            .into_iter()
            .filter_map(|(id, count)| right_ids.get(&id).map(|other| (id, count + other)))
            .collect();
        merged.insert(kind, ids);
    }
    merged
}

/// Intersects any number of partial results. No results yields an empty map.
pub fn merge_results(results: impl IntoIterator<Item = Hits>) -> Hits {
    results
        .into_iter()
        .reduce(intersect)
        .unwrap_or_default()
}

/// Runs searches against one library.
pub struct Searcher {
    store: Store,
    library: Key,
}

impl Searcher {
    pub fn new(store: Store, library: Key) -> Self {
        Searcher { store, library }
    }

    /// Dispatches one task per tag plus one for the free text, then merges.
    ///
    /// The first failing task fails the whole search; remaining tasks are
    /// aborted when the set is dropped and no partial result is returned.
    pub async fn search(&self, params: &SearchParams) -> PlannerResult<Hits> {
        let mut workers: JoinSet<PlannerResult<Hits>> = JoinSet::new();

        for tag in &params.tags {
            workers.spawn(tag_lookup(
                self.store.clone(),
                self.library.clone(),
                tag.clone(),
            ));
        }

        if !params.word.is_empty() {
            workers.spawn(word_lookup(
                self.store.clone(),
                self.library.clone(),
                params.word.clone(),
            ));
        }

        debug!("search dispatched {} lookups", workers.len());

        let mut merged: Option<Hits> = None;
        while let Some(joined) = workers.join_next().await {
            let hits = joined??;
            merged = Some(match merged {
                Some(acc) => intersect(acc, hits),
                None => hits,
            });
        }

        Ok(merged.unwrap_or_default())
    }
}

async fn tag_lookup(store: Store, library: Key, tag: String) -> PlannerResult<Hits> {
    let mut conn = store.acquire().await?;
    let keys = Query::new(Kind::Tag)
        .ancestor(&library)
        .filter("Word", tag)
        .keys(&mut conn)
        .await?;

    let mut hits = Hits::new();
    for key in &keys {
        add_hit(key, &mut hits);
    }
    Ok(hits)
}

async fn word_lookup(store: Store, library: Key, text: String) -> PlannerResult<Hits> {
    let mut conn = store.acquire().await?;
    let mut hits = Hits::new();

    for word in keywords::tokenize(&text) {
        let keys = Query::new(Kind::Keyword)
            .ancestor(&library)
            .filter("Word", word)
            .keys(&mut conn)
            .await?;
        for key in &keys {
            add_hit(key, &mut hits);
        }
    }

    // an ingredient match also matches every dish that uses the ingredient
    let ingredients: Vec<String> = hits
        .get(Kind::Ingredient.as_str())
        .map(|ids| ids.keys().cloned().collect())
        .unwrap_or_default();

    for encoded in ingredients {
        let ingredient = Key::decode(&encoded)?;
        let keys = Query::new(Kind::MeasuredIngredient)
            .ancestor(&library)
            .filter("Ingredient", &ingredient)
            .keys(&mut conn)
            .await?;
        for key in &keys {
            add_hit(key, &mut hits);
        }
    }

    Ok(hits)
}
