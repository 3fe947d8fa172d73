use crate::error::{PlannerError, PlannerResult};
use crate::library::context::RequestContext;
use crate::library::pairing;
use crate::model::{Pairing, Record};
use crate::store::key::{Key, Kind};
use crate::store::{self, Query};
use sqlx::SqliteConnection;
use std::marker::PhantomData;
use tracing::debug;

/// CRUD over one entity kind inside the active library of a request.
///
/// Every operation checks that the keys it touches lie inside the active
/// library; keys outside it fail exactly like missing ones, with
/// [`PlannerError::UnknownItem`]. Identities handed back to callers are
/// always the encoded store key, whatever the caller sent.
pub struct ItemManager<'a, T> {
    ctx: &'a RequestContext,
    kind: Kind,
    _record: PhantomData<T>,
}

impl<'a, T: Record> ItemManager<'a, T> {
    pub fn new(ctx: &'a RequestContext, kind: Kind) -> Self {
        ItemManager {
            ctx,
            kind,
            _record: PhantomData,
        }
    }

    fn check(&self, key: &Key) -> PlannerResult<()> {
        if key.kind() != self.kind {
            return Err(PlannerError::UnknownItem);
        }
        self.ctx.check_user(key)
    }

    /// Referenced items must exist in the active library and be of the
    /// kind the item expects.
    async fn check_references(&self, conn: &mut SqliteConnection, item: &T) -> PlannerResult<()> {
        let expected = item.referenced_kind();
        for key in item.references() {
            self.ctx.check_user(key)?;
            if expected.is_some_and(|kind| kind != key.kind()) {
                return Err(PlannerError::UnknownItem);
            }
            store::get::<serde_json::Value>(conn, key).await?;
        }
        Ok(())
    }

    /// Lists every item of this kind below `parent`, optionally ordered by a field.
    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        parent: &Key,
        order: Option<&'static str>,
    ) -> PlannerResult<Vec<T>> {
        self.ctx.check_user(parent)?;

        let mut query = Query::new(self.kind).ancestor(parent);
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

    /// Stores `item` as a new child of `parent`. Any identity on `item` is discarded.
    pub async fn create(
        &self,
        conn: &mut SqliteConnection,
        parent: &Key,
        mut item: T,
    ) -> PlannerResult<(Key, T)> {
        self.ctx.check_user(parent)?;
        self.check_references(conn, &item).await?;

        item.set_id(String::new());
        let key = store::put(conn, &Key::incomplete(self.kind, Some(parent)), &item).await?;
        item.set_id(key.encode());

        debug!("created {} {key}", self.kind);
        Ok((key, item))
    }

    pub async fn get(&self, conn: &mut SqliteConnection, key: &Key) -> PlannerResult<T> {
        self.check(key)?;
        let mut item: T = store::get(conn, key).await?;
        item.set_id(key.encode());
        Ok(item)
    }

    /// Replaces the stored item at `key`, which must already exist.
    pub async fn update(
        &self,
        conn: &mut SqliteConnection,
        key: &Key,
        mut item: T,
    ) -> PlannerResult<T> {
        self.check(key)?;
        self.check_references(conn, &item).await?;
        store::get::<serde_json::Value>(conn, key).await?;

        item.set_id(String::new());
        store::put(conn, key, &item).await?;
        item.set_id(key.encode());
        Ok(item)
    }

    /// Deletes the item at `key` with everything stored below it.
    ///
    /// Pairings of the item are unlinked on both sides; the returned keys
    /// are the partners that lost their mirrored pairing.
    pub async fn delete(&self, conn: &mut SqliteConnection, key: &Key) -> PlannerResult<Vec<Key>> {
        self.check(key)?;
        store::get::<serde_json::Value>(conn, key).await?;

        let mut partners = Vec::new();
        let pairings: Vec<(Key, Pairing)> = Query::new(Kind::Pairing)
            .ancestor(key)
            .get_all(conn)
            .await?;
        for (_, link) in &pairings {
            let removed = pairing::unlink(conn, key, link).await?;
            if let Some(other) = link.other.as_ref().filter(|_| !removed.is_empty()) {
                if !partners.contains(other) {
                    partners.push(other.clone());
                }
            }
        }

        let children = store::delete_descendants(conn, key).await?;
        store::delete(conn, key).await?;

        debug!("deleted {} {key} with {children} descendants", self.kind);
        Ok(partners)
    }
}
