//! Whole-library export and import.
//!
//! The backup document lists dishes, ingredients and menus at the top level
//! and groups measured ingredients, tags and pairings under the identity of
//! the item they belong to.
//!
//! Importing is idempotent. Identities from the document that already name
//! an item of the target library are reused as is; foreign identities are
//! matched against what the library already holds:
//!
//! | item               | matched by                         |
//! |--------------------|------------------------------------|
//! | ingredient         | name                               |
//! | dish               | identity it was imported under     |
//! | measured ingredient| (dish, ingredient)                 |
//! | pairing            | (owner, other, description)        |
//! | menu               | name                               |
//! | tag                | (owner, word)                      |
//!
//! Anything unmatched is created. References that cannot be resolved in
//! the target library are dropped.

use crate::error::PlannerResult;
use crate::keywords;
use crate::model::{Dish, Ided, Ingredient, MeasuredIngredient, Menu, Pairing, Record, Word};
use crate::store::key::{Key, Kind};
use crate::store::{self, Query};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Backup {
    pub dishes: Vec<Dish>,
    pub ingredients: Vec<Ingredient>,
    pub measured_ingredients: BTreeMap<String, Vec<MeasuredIngredient>>,
    pub tags: BTreeMap<String, Vec<Word>>,
    pub pairings: BTreeMap<String, Vec<Pairing>>,
    pub menus: Vec<Menu>,
}

impl Backup {
    pub fn from_file(path: &Path) -> PlannerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Number of entities an import created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub dishes: usize,
    pub ingredients: usize,
    pub measured_ingredients: usize,
    pub pairings: usize,
    pub menus: usize,
    pub tags: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.dishes
            + self.ingredients
            + self.measured_ingredients
            + self.pairings
            + self.menus
            + self.tags
    }
}

async fn children<T: Record>(
    conn: &mut SqliteConnection,
    parent: &Key,
    kind: Kind,
    order: Option<&'static str>,
) -> PlannerResult<Vec<T>> {
    let mut query = Query::new(kind).ancestor(parent);
    if let Some(field) = order {
        query = query.order(field);
    }
    let items = query.get_all::<T>(conn).await?;
    Ok(items
        .into_iter()
        .map(|(key, mut item)| {
            item.set_id(key.encode());
            item
        })
        .collect())
}

/// Collects every dish, ingredient and menu of `library` with their children.
pub async fn export(conn: &mut SqliteConnection, library: &Key) -> PlannerResult<Backup> {
    let mut backup = Backup::default();

    let dishes: Vec<(Key, Dish)> = Query::new(Kind::Dish)
        .ancestor(library)
        .order("Name")
        .get_all(conn)
        .await?;
    for (key, mut dish) in dishes {
        let id = key.encode();
        dish.set_id(id.clone());

        let measured: Vec<MeasuredIngredient> =
            children(conn, &key, Kind::MeasuredIngredient, Some("Order")).await?;
        if !measured.is_empty() {
            backup.measured_ingredients.insert(id.clone(), measured);
        }
        export_links(conn, &key, &mut backup).await?;
        backup.dishes.push(dish);
    }

    let ingredients: Vec<(Key, Ingredient)> = Query::new(Kind::Ingredient)
        .ancestor(library)
        .order("Name")
        .get_all(conn)
        .await?;
    for (key, mut ingredient) in ingredients {
        ingredient.set_id(key.encode());
        export_links(conn, &key, &mut backup).await?;
        backup.ingredients.push(ingredient);
    }

    let menus: Vec<(Key, Menu)> = Query::new(Kind::Menu)
        .ancestor(library)
        .order("Name")
        .get_all(conn)
        .await?;
    for (key, mut menu) in menus {
        menu.set_id(key.encode());
        export_links(conn, &key, &mut backup).await?;
        backup.menus.push(menu);
    }

    Ok(backup)
}

async fn export_links(
    conn: &mut SqliteConnection,
    owner: &Key,
    backup: &mut Backup,
) -> PlannerResult<()> {
    let tags: Vec<Word> = children(conn, owner, Kind::Tag, Some("Word")).await?;
    if !tags.is_empty() {
        backup.tags.insert(owner.encode(), tags);
    }
    let pairings: Vec<Pairing> = children(conn, owner, Kind::Pairing, None).await?;
    if !pairings.is_empty() {
        backup.pairings.insert(owner.encode(), pairings);
    }
    Ok(())
}

/// Merges `backup` into `library`. Run it inside a transaction: a failure
/// part way through leaves partial data otherwise.
pub async fn import(
    conn: &mut SqliteConnection,
    library: &Key,
    backup: &Backup,
) -> PlannerResult<ImportSummary> {
    let mut importer = Importer::new(library);

    importer.index_tags(conn).await?;
    importer.ingredients(conn, backup).await?;
    importer.dishes(conn, backup).await?;
    importer.measured_ingredients(conn, backup).await?;
    importer.pairings(conn, backup).await?;
    importer.menus(conn, backup).await?;

    for key in &importer.indexed {
        keywords::refresh(conn, key).await?;
    }

    let summary = importer.summary;
    info!(
        "imported into {library}: {} new entities ({} dishes, {} ingredients, {} menus)",
        summary.total(),
        summary.dishes,
        summary.ingredients,
        summary.menus
    );
    Ok(summary)
}

struct Importer<'a> {
    library: &'a Key,
    /// Backup identity -> key of the matching item in this library.
    restored: HashMap<String, Key>,
    /// Tag words already attached to each item.
    tags: HashMap<Key, BTreeSet<String>>,
    /// Dishes and ingredients whose keywords need refreshing.
    indexed: Vec<Key>,
    summary: ImportSummary,
}

impl<'a> Importer<'a> {
    fn new(library: &'a Key) -> Self {
        Importer {
            library,
            restored: HashMap::new(),
            tags: HashMap::new(),
            indexed: Vec::new(),
            summary: ImportSummary::default(),
        }
    }

    /// Key to write a backup item of `kind` under `parent` to: the already
    /// restored key, the backup key itself when it belongs here, or a fresh
    /// incomplete key.
    fn restore_key(&self, encoded: &str, kind: Kind, parent: &Key) -> Key {
        if let Some(key) = self.restored.get(encoded) {
            return key.clone();
        }
        match Key::decode(encoded) {
            Ok(key) if key.kind() == kind && key.parent() == Some(parent) && !key.is_incomplete() => {
                key
            }
            _ => Key::incomplete(kind, Some(parent)),
        }
    }

    /// Resolves a reference to a top-level item, if it exists in this library.
    fn resolve(&self, encoded: &str, kind: Kind) -> Option<Key> {
        let key = match self.restored.get(encoded) {
            Some(key) => key.clone(),
            None => Key::decode(encoded).ok()?,
        };
        (key.kind() == kind && key.parent() == Some(self.library) && !key.is_incomplete())
            .then_some(key)
    }

    fn resolve_any(&self, encoded: &str) -> Option<Key> {
        self.resolve(encoded, Kind::Dish)
            .or_else(|| self.resolve(encoded, Kind::Ingredient))
            .or_else(|| self.resolve(encoded, Kind::Menu))
    }

    fn remember(&mut self, encoded: &str, key: &Key) {
        if !encoded.is_empty() {
            self.restored.insert(encoded.to_string(), key.clone());
        }
    }

    async fn index_tags(&mut self, conn: &mut SqliteConnection) -> PlannerResult<()> {
        let tags: Vec<(Key, Word)> = Query::new(Kind::Tag)
            .ancestor(self.library)
            .get_all(conn)
            .await?;
        for (key, tag) in tags {
            if let Some(owner) = key.parent() {
                self.tags.entry(owner.clone()).or_default().insert(tag.word);
            }
        }
        Ok(())
    }

    async fn import_tags(
        &mut self,
        conn: &mut SqliteConnection,
        encoded: &str,
        owner: &Key,
        backup: &Backup,
    ) -> PlannerResult<()> {
        let Some(words) = backup.tags.get(encoded) else {
            return Ok(());
        };

        let known = self.tags.entry(owner.clone()).or_default();
        for tag in words {
            if known.insert(tag.word.clone()) {
                let key = Key::incomplete(Kind::Tag, Some(owner));
                store::put(conn, &key, &Word::new(tag.word.as_str())).await?;
                self.summary.tags += 1;
            }
        }
        Ok(())
    }

    async fn ingredients(
        &mut self,
        conn: &mut SqliteConnection,
        backup: &Backup,
    ) -> PlannerResult<()> {
        let mut by_name: HashMap<String, Key> = Query::new(Kind::Ingredient)
            .ancestor(self.library)
            .get_all::<Ingredient>(conn)
            .await?
            .into_iter()
            .map(|(key, ingredient)| (ingredient.name, key))
            .collect();

        for ingredient in &backup.ingredients {
            let mut key = self.restore_key(&ingredient.id, Kind::Ingredient, self.library);
            if key.is_incomplete() {
                if let Some(found) = by_name.get(&ingredient.name) {
                    key = found.clone();
                }
            }

            let created = key.is_incomplete();
            let mut item = ingredient.clone();
            item.set_id(String::new());
            let key = store::put(conn, &key, &item).await?;
            if created {
                self.summary.ingredients += 1;
                by_name.insert(item.name.clone(), key.clone());
            }

            self.remember(&ingredient.id, &key);
            self.import_tags(conn, &ingredient.id, &key, backup).await?;
            self.indexed.push(key);
        }
        Ok(())
    }

    async fn dishes(&mut self, conn: &mut SqliteConnection, backup: &Backup) -> PlannerResult<()> {
        let mut by_import_id: HashMap<String, Key> = Query::new(Kind::Dish)
            .ancestor(self.library)
            .get_all::<Dish>(conn)
            .await?
            .into_iter()
            .filter_map(|(key, dish)| dish.import_id.map(|id| (id, key)))
            .collect();

        for dish in &backup.dishes {
            let mut key = self.restore_key(&dish.id, Kind::Dish, self.library);
            let mut item = dish.clone();
            item.set_id(String::new());

            if key.is_incomplete() && !dish.id.is_empty() {
                item.import_id = Some(dish.id.clone());
                if let Some(found) = by_import_id.get(&dish.id) {
                    key = found.clone();
                }
            }

            let created = key.is_incomplete();
            let key = store::put(conn, &key, &item).await?;
            if created {
                self.summary.dishes += 1;
                if !dish.id.is_empty() {
                    by_import_id.insert(dish.id.clone(), key.clone());
                }
            }

            self.remember(&dish.id, &key);
            self.import_tags(conn, &dish.id, &key, backup).await?;
            self.indexed.push(key);
        }
        Ok(())
    }

    async fn measured_ingredients(
        &mut self,
        conn: &mut SqliteConnection,
        backup: &Backup,
    ) -> PlannerResult<()> {
        let mut by_use: HashMap<(Key, Option<Key>), Key> = Query::new(Kind::MeasuredIngredient)
            .ancestor(self.library)
            .get_all::<MeasuredIngredient>(conn)
            .await?
            .into_iter()
            .filter_map(|(key, mi)| {
                let dish = key.parent()?.clone();
                Some(((dish, mi.ingredient), key))
            })
            .collect();

        for (dish_id, items) in &backup.measured_ingredients {
            let Some(dish) = self.resolve(dish_id, Kind::Dish) else {
                warn!("skipping measured ingredients of unknown dish {dish_id}");
                continue;
            };

            for mi in items {
                let ingredient = mi
                    .ingredient
                    .as_ref()
                    .and_then(|key| self.resolve(&key.encode(), Kind::Ingredient));

                let mut key = self.restore_key(&mi.id, Kind::MeasuredIngredient, &dish);
                if key.is_incomplete() {
                    if let Some(found) = by_use.get(&(dish.clone(), ingredient.clone())) {
                        key = found.clone();
                    }
                }

                let item = MeasuredIngredient {
                    id: String::new(),
                    ingredient: ingredient.clone(),
                    ..mi.clone()
                };

                let created = key.is_incomplete();
                let key = store::put(conn, &key, &item).await?;
                if created {
                    self.summary.measured_ingredients += 1;
                    by_use.insert((dish.clone(), ingredient), key);
                }
            }
        }
        Ok(())
    }

    async fn pairings(&mut self, conn: &mut SqliteConnection, backup: &Backup) -> PlannerResult<()> {
        let mut known: HashSet<(Key, Key, String)> = Query::new(Kind::Pairing)
            .ancestor(self.library)
            .get_all::<Pairing>(conn)
            .await?
            .into_iter()
            .filter_map(|(key, pairing)| {
                Some((key.parent()?.clone(), pairing.other?, pairing.description))
            })
            .collect();

        for (owner_id, links) in &backup.pairings {
            let Some(owner) = self.resolve_any(owner_id) else {
                warn!("skipping pairings of unknown item {owner_id}");
                continue;
            };

            for link in links {
                let Some(other) = link
                    .other
                    .as_ref()
                    .and_then(|key| self.resolve(&key.encode(), owner.kind()))
                else {
                    continue;
                };

                let triple = (owner.clone(), other.clone(), link.description.clone());
                if known.contains(&triple) {
                    continue;
                }

                let pairing = Pairing {
                    id: String::new(),
                    other: Some(other),
                    description: link.description.clone(),
                };
                store::put(conn, &Key::incomplete(Kind::Pairing, Some(&owner)), &pairing).await?;
                self.summary.pairings += 1;
                known.insert(triple);
            }
        }
        Ok(())
    }

    async fn menus(&mut self, conn: &mut SqliteConnection, backup: &Backup) -> PlannerResult<()> {
        let mut by_name: HashMap<String, Key> = Query::new(Kind::Menu)
            .ancestor(self.library)
            .get_all::<Menu>(conn)
            .await?
            .into_iter()
            .map(|(key, menu)| (menu.name, key))
            .collect();

        for menu in &backup.menus {
            let mut key = self.restore_key(&menu.id, Kind::Menu, self.library);
            if key.is_incomplete() {
                if let Some(found) = by_name.get(&menu.name) {
                    key = found.clone();
                }
            }

            let dishes = menu
                .dishes
                .iter()
                .filter_map(|dish| self.resolve(&dish.encode(), Kind::Dish))
                .collect();
            let item = Menu {
                id: String::new(),
                name: menu.name.clone(),
                dishes,
            };

            let created = key.is_incomplete();
            let key = store::put(conn, &key, &item).await?;
            if created {
                self.summary.menus += 1;
                by_name.insert(item.name.clone(), key.clone());
            }

            self.remember(&menu.id, &key);
            self.import_tags(conn, &menu.id, &key, backup).await?;
        }
        Ok(())
    }
}
