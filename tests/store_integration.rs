use mealplan_core::PlannerError;
use mealplan_core::model::{Dish, Word};
use mealplan_core::store::key::{Key, Kind};
use mealplan_core::store::{self, Query, Store};
use tempfile::TempDir;

fn dish(name: &str) -> Dish {
    Dish {
        name: name.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn put_assigns_ids_and_get_reads_back() -> Result<(), PlannerError> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let mut conn = store.acquire().await?;

    let library = store::put(&mut conn, &Key::incomplete(Kind::Library, None), &serde_json::json!({})).await?;
    assert!(!library.is_incomplete());

    let key = store::put(&mut conn, &Key::incomplete(Kind::Dish, Some(&library)), &dish("Chili")).await?;
    assert_eq!(key.parent(), Some(&library));

    let stored: Dish = store::get(&mut conn, &key).await?;
    assert_eq!(stored.name, "Chili");

    // same id under another parent is a different entity
    let stranger = Key::new(Kind::Dish, key.id(), Some(&Key::new(Kind::Library, 999, None)));
    assert!(matches!(
        store::get::<Dish>(&mut conn, &stranger).await,
        Err(PlannerError::UnknownItem)
    ));

    Ok(())
}

#[tokio::test]
async fn put_on_complete_key_refuses_mismatched_shape() -> Result<(), PlannerError> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let mut conn = store.acquire().await?;

    let library = Key::new(Kind::Library, 1, None);
    let key = store::put(&mut conn, &Key::incomplete(Kind::Dish, Some(&library)), &dish("Soup")).await?;

    // overwriting through the right key works
    store::put(&mut conn, &key, &dish("Tomato Soup")).await?;
    let stored: Dish = store::get(&mut conn, &key).await?;
    assert_eq!(stored.name, "Tomato Soup");

    // the same id as another kind must not clobber the dish
    let forged = Key::new(Kind::Menu, key.id(), Some(&library));
    assert!(matches!(
        store::put(&mut conn, &forged, &serde_json::json!({"Name": "Forged"})).await,
        Err(PlannerError::UnknownItem)
    ));
    let stored: Dish = store::get(&mut conn, &key).await?;
    assert_eq!(stored.name, "Tomato Soup");

    Ok(())
}

#[tokio::test]
async fn ancestor_queries_filter_and_order() -> Result<(), PlannerError> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let mut conn = store.acquire().await?;

    let lib_a = Key::new(Kind::Library, 1, None);
    let lib_b = Key::new(Kind::Library, 2, None);

    for name in ["Pasta", "Curry", "Salad"] {
        store::put(&mut conn, &Key::incomplete(Kind::Dish, Some(&lib_a)), &dish(name)).await?;
    }
    store::put(&mut conn, &Key::incomplete(Kind::Dish, Some(&lib_b)), &dish("Bread")).await?;

    let names: Vec<String> = Query::new(Kind::Dish)
        .ancestor(&lib_a)
        .order("Name")
        .get_all::<Dish>(&mut conn)
        .await?
        .into_iter()
        .map(|(_, d)| d.name)
        .collect();
    assert_eq!(names, vec!["Curry", "Pasta", "Salad"]);

    let curry = Query::new(Kind::Dish)
        .ancestor(&lib_a)
        .filter("Name", "Curry")
        .keys(&mut conn)
        .await?;
    assert_eq!(curry.len(), 1);

    let none = Query::new(Kind::Dish)
        .ancestor(&lib_b)
        .filter("Name", "Curry")
        .keys(&mut conn)
        .await?;
    assert!(none.is_empty());

    Ok(())
}

#[tokio::test]
async fn delete_descendants_clears_subtree_only() -> Result<(), PlannerError> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let mut conn = store.acquire().await?;

    let library = Key::new(Kind::Library, 1, None);
    let chili = store::put(&mut conn, &Key::incomplete(Kind::Dish, Some(&library)), &dish("Chili")).await?;
    let soup = store::put(&mut conn, &Key::incomplete(Kind::Dish, Some(&library)), &dish("Soup")).await?;

    store::put(&mut conn, &Key::incomplete(Kind::Tag, Some(&chili)), &Word::new("spicy")).await?;
    store::put(&mut conn, &Key::incomplete(Kind::Keyword, Some(&chili)), &Word::new("chili")).await?;
    store::put(&mut conn, &Key::incomplete(Kind::Tag, Some(&soup)), &Word::new("warm")).await?;

    let removed = store::delete_descendants(&mut conn, &chili).await?;
    assert_eq!(removed, 2);
    store::delete(&mut conn, &chili).await?;

    assert!(store::get_opt::<Dish>(&mut conn, &chili).await?.is_none());
    let soup_tags = Query::new(Kind::Tag).ancestor(&soup).keys(&mut conn).await?;
    assert_eq!(soup_tags.len(), 1);

    // deleting again is not an error
    store::delete(&mut conn, &chili).await?;
    Ok(())
}

#[tokio::test]
async fn rolled_back_transaction_leaves_nothing() -> Result<(), PlannerError> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let library = Key::new(Kind::Library, 1, None);

    {
        let mut tx = store.begin().await?;
        store::put(&mut tx, &Key::incomplete(Kind::Dish, Some(&library)), &dish("Ghost")).await?;
        // dropped without commit
    }

    assert_eq!(store.count(Kind::Dish).await?, 0);
    Ok(())
}
