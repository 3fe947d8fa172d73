//! Derived keyword index.
//!
//! Keywords are never edited by users. They are recomputed from an item's
//! text fields plus its tags every time the item or one of its tags changes,
//! and stored as `Keyword` children of the item so search can find the item
//! by any of its words.

use crate::error::PlannerResult;
use crate::model::{Dish, Ingredient, Word};
use crate::store::key::{Key, Kind};
use crate::store::{self, Query};
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use tracing::debug;
use unicode_general_category::{GeneralCategory, get_general_category};

/// Splits `text` into lowercase words and adds them to `words`.
///
/// Words shorter than two characters are dropped. A word ending in `s` also
/// contributes itself without the `s`, and a word ending in `es` also
/// contributes itself without the `es`: `Tomatoes` yields `tomatoes`,
/// `tomatoe` and `tomato`. Stems shorter than two characters are dropped as
/// well.
pub fn add_words(text: &str, words: &mut BTreeSet<String>) {
    let spaced: String = text
        .chars()
        .map(|c| if is_punctuation(c) { ' ' } else { c })
        .collect();

    for piece in spaced.split_whitespace() {
        if piece.chars().count() < 2 {
            continue;
        }
        let word = piece.to_lowercase();
        if let Some(stem) = word.strip_suffix('s') {
            insert_stem(stem, words);
            if let Some(stem) = word.strip_suffix("es") {
                insert_stem(stem, words);
            }
        }
        words.insert(word);
    }
}

/// Convenience wrapper returning the word set of a single text.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    add_words(text, &mut words);
    words
}

fn insert_stem(stem: &str, words: &mut BTreeSet<String>) {
    if stem.chars().count() > 1 {
        words.insert(stem.to_string());
    }
}

/// Unicode `P*` categories only; symbols such as `+` or `$` stay in words.
fn is_punctuation(c: char) -> bool {
    matches!(
        get_general_category(c),
        GeneralCategory::ConnectorPunctuation
            | GeneralCategory::DashPunctuation
            | GeneralCategory::OpenPunctuation
            | GeneralCategory::ClosePunctuation
            | GeneralCategory::InitialPunctuation
            | GeneralCategory::FinalPunctuation
            | GeneralCategory::OtherPunctuation
    )
}

pub fn dish_words(dish: &Dish) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    add_words(&dish.name, &mut words);
    add_words(&dish.source, &mut words);
    add_words(&dish.text, &mut words);
    words
}

pub fn ingredient_words(ingredient: &Ingredient) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    add_words(&ingredient.name, &mut words);
    add_words(&ingredient.category, &mut words);
    words
}

/// Adds the words of every tag attached to `owner`.
pub async fn add_tag_words(
    conn: &mut SqliteConnection,
    owner: &Key,
    words: &mut BTreeSet<String>,
) -> PlannerResult<()> {
    let tags: Vec<(Key, Word)> = Query::new(Kind::Tag).ancestor(owner).get_all(conn).await?;
    for (_, tag) in tags {
        add_words(&tag.word, words);
    }
    Ok(())
}

/// Brings the stored keywords of `owner` in line with `desired`.
///
/// Stored keywords not in `desired` (and duplicates of one that is) are
/// deleted; desired words with no stored keyword are created. Returns `true`
/// if anything was added or removed, in which case any cached keyword listing
/// of `owner` is stale.
pub async fn reconcile(
    conn: &mut SqliteConnection,
    owner: &Key,
    desired: &BTreeSet<String>,
) -> PlannerResult<bool> {
    let existing: Vec<(Key, Word)> = Query::new(Kind::Keyword)
        .ancestor(owner)
        .get_all(conn)
        .await?;

    let mut confirmed = BTreeSet::new();
    let mut changed = false;

    for (key, keyword) in existing {
        if desired.contains(&keyword.word) && confirmed.insert(keyword.word.clone()) {
            continue;
        }
        store::delete(conn, &key).await?;
        changed = true;
    }

    let missing: Vec<Word> = desired
        .difference(&confirmed)
        .map(|word| Word::new(word.as_str()))
        .collect();
    if !missing.is_empty() {
        let keys = vec![Key::incomplete(Kind::Keyword, Some(owner)); missing.len()];
        store::put_multi(conn, &keys, &missing).await?;
        changed = true;
    }

    if changed {
        debug!("keywords of {owner} reconciled to {} words", desired.len());
    }

    Ok(changed)
}

/// Recomputes the keywords of a dish from its fields and tags.
pub async fn refresh_dish(
    conn: &mut SqliteConnection,
    key: &Key,
    dish: &Dish,
) -> PlannerResult<bool> {
    let mut words = dish_words(dish);
    add_tag_words(conn, key, &mut words).await?;
    reconcile(conn, key, &words).await
}

/// Recomputes the keywords of an ingredient from its fields and tags.
pub async fn refresh_ingredient(
    conn: &mut SqliteConnection,
    key: &Key,
    ingredient: &Ingredient,
) -> PlannerResult<bool> {
    let mut words = ingredient_words(ingredient);
    add_tag_words(conn, key, &mut words).await?;
    reconcile(conn, key, &words).await
}

/// Recomputes keywords of whichever dish or ingredient `key` names.
/// Other kinds carry no keywords and report no change.
pub async fn refresh(conn: &mut SqliteConnection, key: &Key) -> PlannerResult<bool> {
    match key.kind() {
        Kind::Dish => {
            let dish: Dish = store::get(conn, key).await?;
            refresh_dish(conn, key, &dish).await
        }
        Kind::Ingredient => {
            let ingredient: Ingredient = store::get(conn, key).await?;
            refresh_ingredient(conn, key, &ingredient).await
        }
        _ => Ok(false),
    }
}
