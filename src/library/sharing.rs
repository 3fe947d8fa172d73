//! Sharing a library with other users.
//!
//! The owner issues a single-use [`ShareToken`] under their library and the
//! invitee receives a link carrying the token's key. Accepting the link
//! replaces any earlier permission of the invitee on that library, consumes
//! the token, and points the invitee's own library at the shared one.

use crate::cache::LibraryCache;
use crate::error::{PlannerError, PlannerResult};
use crate::library::context::{RequestContext, forget_own_library, own_library, shared_access};
use crate::mail::Mailer;
use crate::model::{Library, Permission, ShareToken, UserLibrary};
use crate::store::key::{Key, Kind};
use crate::store::{self, Query};
use chrono::{Duration, Utc};
use tracing::{info, warn};

/// Everything needed to send an invitation.
pub struct Invitation<'a> {
    pub mailer: &'a dyn Mailer,
    pub from: &'a str,
    /// Base URL the acceptance link is built on, without a trailing slash.
    pub base_url: &'a str,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShareOutcome {
    Sent { token: Key },
    /// Delivery failed and the token was withdrawn.
    MailFailed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
    Accepted { library: Key },
    /// The link does not carry a usable token.
    InvalidToken { message: String },
    /// The token is gone or past its expiration date.
    Expired { message: String },
}

const INVALID_TOKEN: &str =
    "Invalid key, please check your email to ensure you typed the URL correctly.";
const EXPIRED_TOKEN: &str = "This invitation has expired, please ensure you typed the URL correctly or contact the sender to retry.";

/// Issues a share token for the active library and mails it to `email`.
///
/// Only the owner of the active library may share it. `access` is `write`
/// for read-write access; anything else grants read-only access.
pub async fn issue(
    ctx: &RequestContext,
    invitation: &Invitation<'_>,
    access: &str,
    email: &str,
) -> PlannerResult<ShareOutcome> {
    if !ctx.is_owner() {
        return Err(PlannerError::PermissionDenied);
    }

    let token = ShareToken {
        expiration_date: (Utc::now() + Duration::days(invitation.ttl_days)).timestamp(),
        read_only: access != "write",
    };

    let mut conn = ctx.store.acquire().await?;
    let key = store::put(
        &mut conn,
        &Key::incomplete(Kind::Share, Some(&ctx.library_key)),
        &token,
    )
    .await?;

    let sender = if ctx.user.email.is_empty() {
        ctx.uid()
    } else {
        ctx.user.email.as_str()
    };
    let subject = format!("{sender} would like to share a meal-planning library with you");
    let body = format!(
        "{subject}.\n\nFollow this link to gain access to the library: {}/shareAccept/{key}",
        invitation.base_url
    );

    match invitation
        .mailer
        .send(invitation.from, email, &subject, &body)
        .await
    {
        Ok(()) => {
            info!(owner = %ctx.uid(), "shared {} with {email}", ctx.library_key);
            Ok(ShareOutcome::Sent { token: key })
        }
        Err(e) => {
            warn!("share invitation to {email} failed: {e}");
            store::delete(&mut conn, &key).await?;
            Ok(ShareOutcome::MailFailed {
                message: format!("Failed to send an email message to '{email}'. {e}"),
            })
        }
    }
}

/// Redeems the share token encoded in `encoded` for the caller.
pub async fn accept(ctx: &RequestContext, encoded: &str) -> PlannerResult<AcceptOutcome> {
    let invalid = || AcceptOutcome::InvalidToken {
        message: INVALID_TOKEN.to_string(),
    };

    let Ok(key) = Key::decode(encoded) else {
        return Ok(invalid());
    };
    let Some(library) = key.parent().filter(|_| key.kind() == Kind::Share).cloned() else {
        return Ok(invalid());
    };

    let mut tx = ctx.store.begin().await?;
    let expired = AcceptOutcome::Expired {
        message: EXPIRED_TOKEN.to_string(),
    };

    let Some(token) = store::get_opt::<ShareToken>(&mut tx, &key).await? else {
        return Ok(expired);
    };
    if token.expiration_date < Utc::now().timestamp() {
        store::delete(&mut tx, &key).await?;
        tx.commit().await?;
        return Ok(expired);
    }

    let uid = ctx.uid().to_string();
    let previous = Query::new(Kind::Permission)
        .ancestor(&library)
        .filter("UserId", uid.as_str())
        .keys(&mut tx)
        .await?;
    store::delete_multi(&mut tx, &previous).await?;

    let permission = Permission {
        user_id: uid.clone(),
        read_only: token.read_only,
    };
    store::put(
        &mut tx,
        &Key::incomplete(Kind::Permission, Some(&library)),
        &permission,
    )
    .await?;
    store::delete(&mut tx, &key).await?;

    let mut own = ctx.own.library.clone();
    own.user_preferred_library = Some(library.clone());
    store::put(&mut tx, &ctx.own.key, &own).await?;
    tx.commit().await?;

    forget_own_library(&ctx.cache, &uid);
    info!(user = %uid, read_only = token.read_only, "accepted share of {library}");
    Ok(AcceptOutcome::Accepted { library })
}

/// Libraries the caller can open: their own first, then every shared one.
pub async fn libraries(ctx: &RequestContext) -> PlannerResult<Vec<UserLibrary>> {
    let mut conn = ctx.store.acquire().await?;
    let own = &ctx.own;

    let mut listing = vec![UserLibrary {
        id: own.key.clone(),
        name: own.library.name.clone(),
        read_only: false,
        current: own.key == ctx.library_key,
        owner: true,
    }];

    let permissions: Vec<(Key, Permission)> = Query::new(Kind::Permission)
        .filter("UserId", ctx.uid())
        .get_all(&mut conn)
        .await?;

    for (key, permission) in permissions {
        let Some(library_key) = key.parent() else {
            continue;
        };
        let Some(library) = store::get_opt::<Library>(&mut conn, library_key).await? else {
            continue;
        };
        let name = if library.name.is_empty() {
            library.owner_id
        } else {
            library.name
        };
        listing.push(UserLibrary {
            id: library_key.clone(),
            name,
            read_only: permission.read_only,
            current: *library_key == ctx.library_key,
            owner: false,
        });
    }

    Ok(listing)
}

/// Points the caller's preference at `encoded`, or back at their own
/// library when `encoded` names it.
pub async fn switch(ctx: &RequestContext, encoded: &str) -> PlannerResult<()> {
    let desired = Key::decode(encoded)?;
    if desired.kind() != Kind::Library {
        return Err(PlannerError::UnknownItem);
    }

    let uid = ctx.uid().to_string();
    let mut conn = ctx.store.acquire().await?;
    let Some(mut own) = own_library(&mut conn, &ctx.cache, &uid).await? else {
        return Ok(());
    };

    if own.key == desired {
        own.library.user_preferred_library = None;
    } else {
        if shared_access(&mut conn, &desired, &uid).await?.is_none() {
            return Err(PlannerError::PermissionDenied);
        }
        own.library.user_preferred_library = Some(desired.clone());
    }

    store::put(&mut conn, &own.key, &own.library).await?;
    forget_own_library(&ctx.cache, &uid);
    info!(user = %uid, "switched to library {desired}");
    Ok(())
}

/// Deletes the caller's own library and everything stored below it.
pub async fn delete_library(ctx: &RequestContext) -> PlannerResult<()> {
    let key = &ctx.own.key;

    let mut tx = ctx.store.begin().await?;
    let removed = store::delete_descendants(&mut tx, key).await?;
    store::delete(&mut tx, key).await?;
    tx.commit().await?;

    forget_own_library(&ctx.cache, ctx.uid());
    LibraryCache::new(&ctx.cache, key).clear();
    info!(user = %ctx.uid(), "deleted library {key} and {removed} descendants");
    Ok(())
}
