use crate::cache::{LibraryCache, ResponseCache};
use crate::error::{PlannerError, PlannerResult};
use crate::library::backup::{self, Backup};
use crate::model::{Library, Owned, Permission};
use crate::store::key::{Key, Kind};
use crate::store::{self, Query, Store};
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{info, warn};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Identity asserted by the authenticating proxy in front of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        User {
            id: id.into(),
            email: email.into(),
            name: String::new(),
        }
    }

    /// Stable identity: the user id, or the email when no id is known.
    pub fn uid(&self) -> &str {
        if self.id.is_empty() {
            &self.email
        } else {
            &self.id
        }
    }

    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.email.is_empty() {
            &self.email
        } else {
            &self.id
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> PlannerResult<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };

        let user = User {
            id: header(USER_ID_HEADER),
            email: header(USER_EMAIL_HEADER),
            name: header(USER_NAME_HEADER),
        };

        if user.uid().is_empty() {
            return Err(PlannerError::Unauthenticated);
        }
        Ok(user)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for User {
    type Rejection = PlannerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        User::from_headers(&parts.headers)
    }
}

/// A user's own library together with its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedLibrary {
    pub key: Key,
    pub library: Library,
}

fn library_cache_key(uid: &str) -> String {
    format!("library-of:{uid}")
}

/// Looks up the library owned by `uid`, consulting the typed cache first.
pub async fn own_library(
    conn: &mut SqliteConnection,
    cache: &ResponseCache,
    uid: &str,
) -> PlannerResult<Option<OwnedLibrary>> {
    let cache_key = library_cache_key(uid);
    if let Some(own) = cache.get_typed::<OwnedLibrary>(&cache_key) {
        return Ok(Some(own));
    }

    let found = Query::new(Kind::Library)
        .filter("OwnerId", uid)
        .limit(1)
        .get_all::<Library>(conn)
        .await?
        .into_iter()
        .next()
        .map(|(key, library)| OwnedLibrary { key, library });

    if let Some(own) = &found {
        cache.set_typed(&cache_key, own)?;
    }
    Ok(found)
}

/// Drops the cached library record of `uid`; call after writing it.
pub fn forget_own_library(cache: &ResponseCache, uid: &str) {
    cache.delete_typed(&library_cache_key(uid));
}

/// Request-scoped state: who is asking and which library they act on.
///
/// Built once per request by [`RequestContext::resolve`] and passed by
/// reference to every library operation.
pub struct RequestContext {
    pub store: Store,
    pub cache: Arc<ResponseCache>,
    pub user: User,
    /// Library the request runs against: the user's own, or a shared one
    /// they switched to.
    pub library_key: Key,
    pub library: Library,
    pub own: OwnedLibrary,
    pub read_only: bool,
}

impl RequestContext {
    /// Resolves the active library for `user`.
    ///
    /// A user without a library gets a new one, seeded from `seed` when
    /// given. A preference for another library is honored only while the
    /// user still holds a permission on it; a stale preference is cleared.
    pub async fn resolve(
        store: &Store,
        cache: &Arc<ResponseCache>,
        user: User,
        seed: Option<&Backup>,
    ) -> PlannerResult<Self> {
        let uid = user.uid().to_string();
        let mut conn = store.acquire().await?;

        let mut own = match own_library(&mut conn, cache, &uid).await? {
            Some(own) => own,
            None => create_library(store, &user, seed).await?,
        };

        let mut library_key = own.key.clone();
        let mut library = own.library.clone();
        let mut read_only = false;

        let preferred = own
            .library
            .user_preferred_library
            .clone()
            .filter(|key| *key != own.key);

        if let Some(preferred) = preferred {
            match shared_access(&mut conn, &preferred, &uid).await? {
                Some((shared, permission)) => {
                    library_key = preferred;
                    library = shared;
                    read_only = permission.read_only;
                }
                None => {
                    warn!(user = %uid, "preferred library {preferred} is no longer accessible");
                    own.library.user_preferred_library = None;
                    store::put(&mut conn, &own.key, &own.library).await?;
                    forget_own_library(cache, &uid);
                }
            }
        }

        Ok(RequestContext {
            store: store.clone(),
            cache: Arc::clone(cache),
            user,
            library_key,
            library,
            own,
            read_only,
        })
    }

    pub fn uid(&self) -> &str {
        self.user.uid()
    }

    /// Whether the caller owns the active library.
    pub fn is_owner(&self) -> bool {
        self.library.owner() == self.uid()
    }

    /// Whether the active library is `key` itself or one of its ancestors.
    pub fn is_in_library(&self, key: &Key) -> bool {
        !key.is_incomplete() && key.has_ancestor(&self.library_key)
    }

    /// Rejects keys outside the active library the same way as missing ones.
    pub fn check_user(&self, key: &Key) -> PlannerResult<()> {
        if self.is_in_library(key) {
            Ok(())
        } else {
            Err(PlannerError::UnknownItem)
        }
    }

    pub fn ensure_writable(&self) -> PlannerResult<()> {
        if self.read_only {
            Err(PlannerError::PermissionDenied)
        } else {
            Ok(())
        }
    }

    /// Query over `kind` restricted to the active library.
    pub fn query(&self, kind: Kind) -> Query {
        Query::new(kind).ancestor(&self.library_key)
    }

    pub fn library_cache(&self) -> LibraryCache<'_> {
        LibraryCache::new(&self.cache, &self.library_key)
    }
}

async fn create_library(
    store: &Store,
    user: &User,
    seed: Option<&Backup>,
) -> PlannerResult<OwnedLibrary> {
    let mut library = Library {
        name: user.display_name().to_string(),
        ..Default::default()
    };
    library.set_owner(user.uid().to_string());

    let mut tx = store.begin().await?;
    let key = store::put(&mut tx, &Key::incomplete(Kind::Library, None), &library).await?;
    if let Some(seed) = seed {
        backup::import(&mut tx, &key, seed).await?;
    }
    tx.commit().await?;

    info!(user = %user.uid(), "created library {key}");
    Ok(OwnedLibrary { key, library })
}

/// The shared library at `key` and the permission `uid` holds on it, if both exist.
pub async fn shared_access(
    conn: &mut SqliteConnection,
    key: &Key,
    uid: &str,
) -> PlannerResult<Option<(Library, Permission)>> {
    if key.kind() != Kind::Library || key.parent().is_some() {
        return Ok(None);
    }

    let permission = Query::new(Kind::Permission)
        .ancestor(key)
        .filter("UserId", uid)
        .limit(1)
        .get_all::<Permission>(conn)
        .await?
        .into_iter()
        .next();

    let Some((_, permission)) = permission else {
        return Ok(None);
    };

    Ok(store::get_opt::<Library>(conn, key)
        .await?
        .map(|library| (library, permission)))
}
