use mealplan_core::PlannerError;
use mealplan_core::keywords;
use mealplan_core::model::{Dish, Ingredient, Word};
use mealplan_core::store::key::{Key, Kind};
use mealplan_core::store::{self, Query, Store};
use std::collections::BTreeSet;
use tempfile::TempDir;

fn words(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|w| w.to_string()).collect()
}

async fn stored_keywords(store: &Store, owner: &Key) -> Result<Vec<String>, PlannerError> {
    let mut conn = store.acquire().await?;
    let found: Vec<(Key, Word)> = Query::new(Kind::Keyword)
        .ancestor(owner)
        .order("Word")
        .get_all(&mut conn)
        .await?;
    Ok(found.into_iter().map(|(_, w)| w.word).collect())
}

#[tokio::test]
async fn reconcile_swaps_only_the_difference() -> Result<(), PlannerError> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let mut conn = store.acquire().await?;
    let owner = Key::new(Kind::Dish, 5, Some(&Key::new(Kind::Library, 1, None)));

    assert!(keywords::reconcile(&mut conn, &owner, &words(&["a1", "b1", "c1"])).await?);
    let before = Query::new(Kind::Keyword).ancestor(&owner).keys(&mut conn).await?;

    assert!(keywords::reconcile(&mut conn, &owner, &words(&["b1", "c1", "d1"])).await?);
    let after = Query::new(Kind::Keyword).ancestor(&owner).keys(&mut conn).await?;
    drop(conn);

    assert_eq!(stored_keywords(&store, &owner).await?, vec!["b1", "c1", "d1"]);

    // b1 and c1 kept their entities
    let kept = before.iter().filter(|k| after.contains(k)).count();
    assert_eq!(kept, 2);
    Ok(())
}

#[tokio::test]
async fn reconcile_converges_and_removes_duplicates() -> Result<(), PlannerError> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let mut conn = store.acquire().await?;
    let owner = Key::new(Kind::Ingredient, 9, Some(&Key::new(Kind::Library, 1, None)));

    for word in ["salt", "salt", "pepper"] {
        store::put(&mut conn, &Key::incomplete(Kind::Keyword, Some(&owner)), &Word::new(word)).await?;
    }

    let desired = words(&["salt", "pepper"]);
    assert!(keywords::reconcile(&mut conn, &owner, &desired).await?);
    assert!(!keywords::reconcile(&mut conn, &owner, &desired).await?);
    drop(conn);

    assert_eq!(stored_keywords(&store, &owner).await?, vec!["pepper", "salt"]);
    Ok(())
}

#[tokio::test]
async fn refresh_includes_fields_and_tags() -> Result<(), PlannerError> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let mut conn = store.acquire().await?;
    let library = Key::new(Kind::Library, 1, None);

    let dish = Dish {
        name: "Bean Chili".into(),
        source: "Grandma".into(),
        ..Default::default()
    };
    let key = store::put(&mut conn, &Key::incomplete(Kind::Dish, Some(&library)), &dish).await?;
    store::put(&mut conn, &Key::incomplete(Kind::Tag, Some(&key)), &Word::new("Weeknight")).await?;

    assert!(keywords::refresh(&mut conn, &key).await?);
    assert!(!keywords::refresh(&mut conn, &key).await?);
    drop(conn);

    let stored = stored_keywords(&store, &key).await?;
    for expected in ["bean", "chili", "grandma", "weeknight"] {
        assert!(stored.contains(&expected.to_string()), "missing {expected}");
    }
    Ok(())
}

#[tokio::test]
async fn ingredient_keywords_follow_edits() -> Result<(), PlannerError> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let mut conn = store.acquire().await?;
    let library = Key::new(Kind::Library, 1, None);

    let mut ingredient = Ingredient {
        name: "Basil".into(),
        category: "Herb".into(),
        ..Default::default()
    };
    let key = store::put(&mut conn, &Key::incomplete(Kind::Ingredient, Some(&library)), &ingredient).await?;
    keywords::refresh(&mut conn, &key).await?;

    ingredient.category = "Produce".into();
    store::put(&mut conn, &key, &ingredient).await?;
    assert!(keywords::refresh(&mut conn, &key).await?);
    drop(conn);

    let stored = stored_keywords(&store, &key).await?;
    assert!(stored.contains(&"produce".to_string()));
    assert!(!stored.contains(&"herb".to_string()));
    Ok(())
}
