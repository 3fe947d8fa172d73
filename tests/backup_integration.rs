use mealplan_core::cache::ResponseCache;
use mealplan_core::library::backup::{self, Backup};
use mealplan_core::library::context::{RequestContext, User};
use mealplan_core::library::manager::ItemManager;
use mealplan_core::library::pairing;
use mealplan_core::model::{Dish, Ingredient, MeasuredIngredient, Menu, Pairing, Word};
use mealplan_core::store::key::{Key, Kind};
use mealplan_core::store::{Query, Store};
use mealplan_core::PlannerResult;
use std::sync::Arc;
use tempfile::TempDir;

async fn context(store: &Store, cache: &Arc<ResponseCache>, uid: &str) -> PlannerResult<RequestContext> {
    RequestContext::resolve(store, cache, User::new(uid, ""), None).await
}

/// Two dishes sharing an ingredient, paired, tagged and put on a menu.
async fn cook_up(ctx: &RequestContext) -> PlannerResult<()> {
    let mut conn = ctx.store.acquire().await?;
    let dishes = ItemManager::<Dish>::new(ctx, Kind::Dish);

    let (soup, _) = dishes
        .create(
            &mut conn,
            &ctx.library_key,
            Dish {
                name: "Tomato Soup".into(),
                ..Default::default()
            },
        )
        .await?;
    let (toast, _) = dishes
        .create(
            &mut conn,
            &ctx.library_key,
            Dish {
                name: "Cheese Toast".into(),
                ..Default::default()
            },
        )
        .await?;
    let (tomato, _) = ItemManager::<Ingredient>::new(ctx, Kind::Ingredient)
        .create(
            &mut conn,
            &ctx.library_key,
            Ingredient {
                name: "Tomato".into(),
                ..Default::default()
            },
        )
        .await?;

    let measured = ItemManager::<MeasuredIngredient>::new(ctx, Kind::MeasuredIngredient);
    for dish in [&soup, &toast] {
        measured
            .create(
                &mut conn,
                dish,
                MeasuredIngredient {
                    ingredient: Some(tomato.clone()),
                    amount: "1".into(),
                    ..Default::default()
                },
            )
            .await?;
    }

    let tags = ItemManager::<Word>::new(ctx, Kind::Tag);
    tags.create(&mut conn, &soup, Word::new("lunch")).await?;
    tags.create(&mut conn, &toast, Word::new("lunch")).await?;
    tags.create(&mut conn, &tomato, Word::new("red")).await?;

    ItemManager::<Menu>::new(ctx, Kind::Menu)
        .create(
            &mut conn,
            &ctx.library_key,
            Menu {
                name: "Rainy day".into(),
                dishes: vec![soup.clone(), toast.clone()],
                ..Default::default()
            },
        )
        .await?;
    drop(conn);

    pairing::create(
        ctx,
        &soup,
        Pairing {
            other: Some(toast),
            description: "dunk it".into(),
            ..Default::default()
        },
    )
    .await?;
    Ok(())
}

async fn import(ctx: &RequestContext, document: &Backup) -> PlannerResult<backup::ImportSummary> {
    let mut tx = ctx.store.begin().await?;
    let summary = backup::import(&mut tx, &ctx.library_key, document).await?;
    tx.commit().await?;
    Ok(summary)
}

#[tokio::test]
async fn export_groups_children_by_owner() -> PlannerResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let cache = Arc::new(ResponseCache::new());
    let alice = context(&store, &cache, "alice").await?;
    cook_up(&alice).await?;

    let mut conn = store.acquire().await?;
    let document = backup::export(&mut conn, &alice.library_key).await?;

    let names: Vec<&str> = document.dishes.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Cheese Toast", "Tomato Soup"]);
    assert_eq!(document.ingredients.len(), 1);
    assert_eq!(document.menus.len(), 1);
    assert_eq!(document.measured_ingredients.len(), 2);
    assert_eq!(document.pairings.len(), 2);
    assert_eq!(document.tags.len(), 3);

    let json = serde_json::to_value(&document).unwrap();
    assert!(json.get("MeasuredIngredients").is_some());
    Ok(())
}

#[tokio::test]
async fn import_into_another_library_is_idempotent() -> PlannerResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let cache = Arc::new(ResponseCache::new());
    let alice = context(&store, &cache, "alice").await?;
    let bob = context(&store, &cache, "bob").await?;
    cook_up(&alice).await?;

    let document = {
        let mut conn = store.acquire().await?;
        backup::export(&mut conn, &alice.library_key).await?
    };

    let first = import(&bob, &document).await?;
    assert_eq!(first.dishes, 2);
    assert_eq!(first.ingredients, 1);
    assert_eq!(first.measured_ingredients, 2);
    assert_eq!(first.pairings, 2);
    assert_eq!(first.menus, 1);
    assert_eq!(first.tags, 3);

    let second = import(&bob, &document).await?;
    assert_eq!(second.total(), 0);

    for kind in [Kind::Dish, Kind::Ingredient, Kind::MeasuredIngredient, Kind::Pairing, Kind::Menu, Kind::Tag] {
        assert_eq!(store.count(kind).await?, 2 * first_count(&first, kind) as i64, "{kind}");
    }

    // references were rewritten into bob's library
    let mut conn = store.acquire().await?;
    let menus: Vec<(Key, Menu)> = bob.query(Kind::Menu).get_all(&mut conn).await?;
    assert_eq!(menus[0].1.dishes.len(), 2);
    assert!(menus[0].1.dishes.iter().all(|d| d.has_ancestor(&bob.library_key)));

    let uses: Vec<(Key, MeasuredIngredient)> = bob.query(Kind::MeasuredIngredient).get_all(&mut conn).await?;
    assert!(
        uses.iter()
            .all(|(_, mi)| mi.ingredient.as_ref().is_some_and(|i| i.has_ancestor(&bob.library_key)))
    );

    // imported dishes and ingredients get searchable keywords
    let keywords = bob.query(Kind::Keyword).filter("Word", "tomato").keys(&mut conn).await?;
    assert!(!keywords.is_empty());
    Ok(())
}

fn first_count(summary: &backup::ImportSummary, kind: Kind) -> usize {
    match kind {
        Kind::Dish => summary.dishes,
        Kind::Ingredient => summary.ingredients,
        Kind::MeasuredIngredient => summary.measured_ingredients,
        Kind::Pairing => summary.pairings,
        Kind::Menu => summary.menus,
        Kind::Tag => summary.tags,
        _ => 0,
    }
}

#[tokio::test]
async fn restoring_own_export_changes_nothing() -> PlannerResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let cache = Arc::new(ResponseCache::new());
    let alice = context(&store, &cache, "alice").await?;
    cook_up(&alice).await?;

    let document = {
        let mut conn = store.acquire().await?;
        backup::export(&mut conn, &alice.library_key).await?
    };
    let summary = import(&alice, &document).await?;
    assert_eq!(summary.total(), 0);

    let mut conn = store.acquire().await?;
    let dishes: Vec<(Key, Dish)> = Query::new(Kind::Dish).ancestor(&alice.library_key).get_all(&mut conn).await?;
    assert_eq!(dishes.len(), 2);
    assert!(dishes.iter().all(|(_, d)| d.import_id.is_none()));
    Ok(())
}
