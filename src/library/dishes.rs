use crate::error::PlannerResult;
use crate::library::context::RequestContext;
use crate::library::manager::ItemManager;
use crate::model::{Dish, Menu};
use crate::store::key::{Key, Kind};
use sqlx::SqliteConnection;

/// What a dish deletion touched beyond the dish itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DishRemoval {
    /// Dishes whose mirrored pairing was removed.
    pub partners: Vec<Key>,
    /// Menus that list the deleted dish.
    pub menus: Vec<Key>,
}

/// Deletes a dish, its tags, keywords, measured ingredients and pairings,
/// and the mirror of every pairing on the partner dishes, in one transaction.
pub async fn delete_dish(ctx: &RequestContext, key: &Key) -> PlannerResult<DishRemoval> {
    let mut tx = ctx.store.begin().await?;
    let partners = ItemManager::<Dish>::new(ctx, Kind::Dish)
        .delete(&mut tx, key)
        .await?;
    let menus = menus_listing(ctx, &mut tx, key).await?;
    tx.commit().await?;

    Ok(DishRemoval { partners, menus })
}

/// Menus of the active library that include `dish`.
pub async fn menus_listing(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    dish: &Key,
) -> PlannerResult<Vec<Key>> {
    let menus: Vec<(Key, Menu)> = ctx.query(Kind::Menu).get_all(conn).await?;
    Ok(menus
        .into_iter()
        .filter(|(_, menu)| menu.dishes.contains(dish))
        .map(|(key, _)| key)
        .collect())
}

/// Dishes that use `ingredient` in one of their measured ingredients.
pub async fn dishes_using(
    ctx: &RequestContext,
    conn: &mut SqliteConnection,
    ingredient: &Key,
) -> PlannerResult<Vec<Key>> {
    ctx.check_user(ingredient)?;

    let uses = ctx
        .query(Kind::MeasuredIngredient)
        .filter("Ingredient", ingredient)
        .keys(conn)
        .await?;

    let mut dishes: Vec<Key> = Vec::new();
    for dish in uses.iter().filter_map(Key::parent) {
        if !dishes.contains(dish) {
            dishes.push(dish.clone());
        }
    }
    Ok(dishes)
}
