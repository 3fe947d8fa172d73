//! Mirrored pairings.
//!
//! A pairing between dishes A and B is stored twice: `A/Pairing{Other: B}`
//! and `B/Pairing{Other: A}`, both with the same description. Both halves
//! are written and removed inside one transaction, so readers never see a
//! one-sided pairing.

use crate::error::{PlannerError, PlannerResult};
use crate::library::context::RequestContext;
use crate::model::{Ided, Pairing};
use crate::store::key::{Key, Kind};
use crate::store::{self, Query};
use sqlx::SqliteConnection;
use tracing::debug;

/// Both halves of a pairing as written or removed.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingLink {
    pub key: Key,
    pub pairing: Pairing,
    /// The item on the other end.
    pub other: Key,
    pub mirrors: Vec<Key>,
}

/// Creates the pairing `owner -> pairing.other` and its mirror.
///
/// `Other` must name an existing item of the same kind inside the active
/// library.
pub async fn create(
    ctx: &RequestContext,
    owner: &Key,
    mut pairing: Pairing,
) -> PlannerResult<PairingLink> {
    ctx.check_user(owner)?;
    let other = pairing
        .other
        .clone()
        .ok_or_else(|| PlannerError::InvalidKey("pairing without Other".to_string()))?;
    ctx.check_user(&other)?;
    if &other == owner {
        return Err(PlannerError::InvalidKey("item paired with itself".to_string()));
    }
    if other.kind() != owner.kind() {
        return Err(PlannerError::UnknownItem);
    }

    let mut tx = ctx.store.begin().await?;
    store::get::<serde_json::Value>(&mut tx, owner).await?;
    store::get::<serde_json::Value>(&mut tx, &other).await?;

    pairing.set_id(String::new());
    let key = store::put(&mut tx, &Key::incomplete(Kind::Pairing, Some(owner)), &pairing).await?;

    let mirror = Pairing {
        id: String::new(),
        other: Some(owner.clone()),
        description: pairing.description.clone(),
    };
    let mirror_key = store::put(&mut tx, &Key::incomplete(Kind::Pairing, Some(&other)), &mirror).await?;
    tx.commit().await?;

    debug!("paired {owner} with {other}");
    pairing.set_id(key.encode());
    Ok(PairingLink {
        key,
        pairing,
        other,
        mirrors: vec![mirror_key],
    })
}

/// Deletes the pairing at `key` together with its mirror.
pub async fn delete(ctx: &RequestContext, owner: &Key, key: &Key) -> PlannerResult<PairingLink> {
    if key.kind() != Kind::Pairing || key.parent() != Some(owner) {
        return Err(PlannerError::UnknownItem);
    }
    ctx.check_user(key)?;

    let mut tx = ctx.store.begin().await?;
    let mut pairing: Pairing = store::get(&mut tx, key).await?;
    let mirrors = unlink(&mut tx, owner, &pairing).await?;
    store::delete(&mut tx, key).await?;
    tx.commit().await?;

    let other = pairing.other.clone().unwrap_or_else(|| owner.clone());
    pairing.set_id(key.encode());
    Ok(PairingLink {
        key: key.clone(),
        pairing,
        other,
        mirrors,
    })
}

/// Removes the mirror of `pairing`, a pairing stored under `owner`,
/// returning its key.
///
/// Identical pairings may exist side by side, so exactly one matching
/// mirror goes per call.
pub async fn unlink(
    conn: &mut SqliteConnection,
    owner: &Key,
    pairing: &Pairing,
) -> PlannerResult<Vec<Key>> {
    let Some(other) = &pairing.other else {
        return Ok(Vec::new());
    };

    let mirrors = Query::new(Kind::Pairing)
        .ancestor(other)
        .filter("Other", owner)
        .filter("Description", pairing.description.as_str())
        .limit(1)
        .keys(conn)
        .await?;

    store::delete_multi(conn, &mirrors).await?;
    Ok(mirrors)
}
