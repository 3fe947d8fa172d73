use crate::cache::LibraryCache;
use crate::error::{PlannerError, PlannerResult};
use crate::keywords;
use crate::library::backup::{self, Backup};
use crate::library::context::{RequestContext, User};
use crate::library::dishes;
use crate::library::manager::ItemManager;
use crate::library::pairing;
use crate::library::sharing::{self, AcceptOutcome, Invitation, ShareOutcome};
use crate::model::{Dish, Ingredient, MeasuredIngredient, Menu, Pairing, Record, Word};
use crate::search::{SearchParams, Searcher};
use crate::server::{AppState, paths, respond};
use crate::store::key::{Key, Kind};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::SqliteConnection;
use std::sync::Arc;

type SharedState = Arc<AppState>;

pub async fn index() -> Response {
    respond::found("/index.html")
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct UserInfo<'a> {
    name: &'a str,
    email: &'a str,
    #[serde(rename = "LogoutURL")]
    logout_url: &'a str,
}

pub async fn users(State(state): State<SharedState>, user: User) -> PlannerResult<Response> {
    let ctx = state.context(user).await?;
    respond::json(&[UserInfo {
        name: ctx.user.display_name(),
        email: &ctx.user.email,
        logout_url: &state.config.logout_url,
    }])
}

/// Entry point for `/dish…`, `/ingredient…` and `/menu…`.
///
/// GETs are answered from the response cache when possible. Writes against
/// a read-only library are refused before anything else runs.
pub async fn resource(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    user: User,
    body: Bytes,
) -> PlannerResult<Response> {
    let path = uri.path();
    let Some(kind) = paths::resource_kind(paths::resource(path)) else {
        return Err(PlannerError::UnknownItem);
    };

    let ctx = state.context(user).await?;
    if method == Method::GET {
        if let Some(cached) = ctx.library_cache().get(path) {
            return Ok(respond::json_bytes(cached));
        }
    } else {
        ctx.ensure_writable()?;
    }

    let req = ItemRequest {
        ctx: &ctx,
        method: &method,
        path,
        kind,
        body: &body,
    };

    match kind {
        Kind::Dish => dish(&req).await,
        Kind::Ingredient => ingredient(&req).await,
        _ => menu(&req).await,
    }
}

struct ItemRequest<'a> {
    ctx: &'a RequestContext,
    method: &'a Method,
    path: &'a str,
    /// Kind of the top-level resource the path starts with.
    kind: Kind,
    body: &'a Bytes,
}

impl ItemRequest<'_> {
    fn id(&self) -> &str {
        paths::item_id(self.path)
    }

    fn key(&self) -> PlannerResult<Key> {
        Key::decode(self.id())
    }

    /// The top-level item owning the child collection in the path.
    fn owner(&self) -> PlannerResult<Key> {
        let key = Key::decode(paths::parent_id(self.path))?;
        if key.kind() != self.kind {
            return Err(PlannerError::UnknownItem);
        }
        Ok(key)
    }

    fn body<T: DeserializeOwned>(&self) -> PlannerResult<T> {
        Ok(serde_json::from_slice(self.body)?)
    }

    fn cache(&self) -> LibraryCache<'_> {
        self.ctx.library_cache()
    }
}

async fn dish(req: &ItemRequest<'_>) -> PlannerResult<Response> {
    match paths::child_collection(req.path) {
        Some("mi") => measured_ingredients(req).await,
        Some("tags") => tags(req).await,
        Some("keywords") => keyword_listing(req).await,
        Some("pairing") => pairings(req).await,
        Some(_) => Err(PlannerError::UnknownItem),
        None if *req.method == Method::DELETE && !req.id().is_empty() => delete_dish(req).await,
        None => {
            let library = req.ctx.library_key.clone();
            crud::<Dish>(req, Kind::Dish, &library, Some("Name"), Reindex::Item).await
        }
    }
}

async fn ingredient(req: &ItemRequest<'_>) -> PlannerResult<Response> {
    match paths::child_collection(req.path) {
        Some("in") => dishes_using(req).await,
        Some("tags") => tags(req).await,
        Some("keywords") => keyword_listing(req).await,
        Some("pairing") => pairings(req).await,
        Some(_) => Err(PlannerError::UnknownItem),
        None => {
            let library = req.ctx.library_key.clone();
            crud::<Ingredient>(req, Kind::Ingredient, &library, Some("Name"), Reindex::Item).await
        }
    }
}

async fn menu(req: &ItemRequest<'_>) -> PlannerResult<Response> {
    match paths::child_collection(req.path) {
        Some("tags") => tags(req).await,
        Some(_) => Err(PlannerError::UnknownItem),
        None => {
            let library = req.ctx.library_key.clone();
            crud::<Menu>(req, Kind::Menu, &library, Some("Name"), Reindex::Nothing).await
        }
    }
}

/// Whose keywords to recompute after a write.
#[derive(Debug, Clone, Copy)]
enum Reindex {
    Nothing,
    /// The item written.
    Item,
    /// The item owning the collection written to.
    Parent,
}

impl Reindex {
    fn target<'k>(self, item: &'k Key, parent: &'k Key) -> Option<&'k Key> {
        match self {
            Reindex::Nothing => None,
            Reindex::Item => Some(item),
            Reindex::Parent => Some(parent),
        }
    }
}

async fn reindex(conn: &mut SqliteConnection, target: Option<&Key>) -> PlannerResult<Option<Key>> {
    let Some(key) = target else {
        return Ok(None);
    };
    Ok(keywords::refresh(conn, key).await?.then(|| key.clone()))
}

fn forget_keywords(cache: &LibraryCache<'_>, reindexed: Option<Key>) {
    if let Some(path) = reindexed.and_then(|key| paths::child_path(&key, "keywords")) {
        cache.delete_tree(&path);
    }
}

fn forget_pairings(cache: &LibraryCache<'_>, partners: &[Key]) {
    for partner in partners {
        if let Some(path) = paths::child_path(partner, "pairing") {
            cache.delete_tree(&path);
        }
    }
}

/// List, create, read, update and delete of `kind` items below `parent`.
async fn crud<T: Record>(
    req: &ItemRequest<'_>,
    kind: Kind,
    parent: &Key,
    order: Option<&'static str>,
    reindex_on_write: Reindex,
) -> PlannerResult<Response> {
    let ctx = req.ctx;
    let manager = ItemManager::<T>::new(ctx, kind);
    let cache = req.cache();

    if req.id().is_empty() {
        return match *req.method {
            Method::GET => {
                let mut conn = ctx.store.acquire().await?;
                let items = manager.list(&mut conn, parent, order).await?;
                respond::send_get(&cache, req.path, &items)
            }
            Method::POST => {
                let item: T = req.body()?;
                let mut tx = ctx.store.begin().await?;
                let (key, item) = manager.create(&mut tx, parent, item).await?;
                let reindexed = reindex(&mut tx, reindex_on_write.target(&key, parent)).await?;
                tx.commit().await?;

                forget_keywords(&cache, reindexed);
                respond::send_created(&cache, req.path, item.id(), &item)
            }
            _ => Err(PlannerError::Unsupported),
        };
    }

    let key = req.key()?;
    if key.parent() != Some(parent) {
        return Err(PlannerError::UnknownItem);
    }

    match *req.method {
        Method::GET => {
            let mut conn = ctx.store.acquire().await?;
            let item = manager.get(&mut conn, &key).await?;
            respond::send_get(&cache, req.path, &item)
        }
        Method::PUT => {
            let item: T = req.body()?;
            let mut tx = ctx.store.begin().await?;
            let item = manager.update(&mut tx, &key, item).await?;
            let reindexed = reindex(&mut tx, reindex_on_write.target(&key, parent)).await?;
            tx.commit().await?;

            forget_keywords(&cache, reindexed);
            respond::send_updated(&cache, req.path, &item)
        }
        Method::DELETE => {
            let mut tx = ctx.store.begin().await?;
            let partners = manager.delete(&mut tx, &key).await?;
            let target = match reindex_on_write {
                Reindex::Parent => Some(parent),
                _ => None,
            };
            let reindexed = reindex(&mut tx, target).await?;
            tx.commit().await?;

            forget_keywords(&cache, reindexed);
            forget_pairings(&cache, &partners);
            cache.delete("/tags");
            Ok(respond::send_deleted(&cache, req.path))
        }
        _ => Err(PlannerError::Unsupported),
    }
}

async fn tags(req: &ItemRequest<'_>) -> PlannerResult<Response> {
    let owner = req.owner()?;
    let response = crud::<Word>(req, Kind::Tag, &owner, None, Reindex::Parent).await?;
    if *req.method != Method::GET {
        req.cache().delete("/tags");
    }
    Ok(response)
}

/// Derived keywords are read-only.
async fn keyword_listing(req: &ItemRequest<'_>) -> PlannerResult<Response> {
    if *req.method != Method::GET {
        return Err(PlannerError::Unsupported);
    }
    let owner = req.owner()?;
    crud::<Word>(req, Kind::Keyword, &owner, Some("Word"), Reindex::Nothing).await
}

async fn measured_ingredients(req: &ItemRequest<'_>) -> PlannerResult<Response> {
    let dish = req.owner()?;
    let ctx = req.ctx;

    // ingredients whose "used in" listing this write can change
    let mut touched: Vec<Key> = Vec::new();
    if !req.id().is_empty() && matches!(*req.method, Method::PUT | Method::DELETE) {
        let mut conn = ctx.store.acquire().await?;
        let current = ItemManager::<MeasuredIngredient>::new(ctx, Kind::MeasuredIngredient)
            .get(&mut conn, &req.key()?)
            .await?;
        touched.extend(current.ingredient);
    }
    if matches!(*req.method, Method::POST | Method::PUT) {
        let incoming: MeasuredIngredient = req.body()?;
        if let Some(ingredient) = incoming.ingredient {
            if ingredient.kind() != Kind::Ingredient {
                return Err(PlannerError::UnknownItem);
            }
            touched.push(ingredient);
        }
    }

    let response = crud::<MeasuredIngredient>(
        req,
        Kind::MeasuredIngredient,
        &dish,
        Some("Order"),
        Reindex::Nothing,
    )
    .await?;

    let cache = req.cache();
    for ingredient in &touched {
        if let Some(path) = paths::child_path(ingredient, "in") {
            cache.delete_collection(&path);
        }
    }
    Ok(response)
}

async fn pairings(req: &ItemRequest<'_>) -> PlannerResult<Response> {
    let owner = req.owner()?;
    let cache = req.cache();

    match (req.method, req.id().is_empty()) {
        (&Method::GET, _) => {
            crud::<Pairing>(req, Kind::Pairing, &owner, None, Reindex::Nothing).await
        }
        (&Method::POST, true) => {
            let link = pairing::create(req.ctx, &owner, req.body()?).await?;
            forget_pairings(&cache, std::slice::from_ref(&link.other));
            respond::send_created(&cache, req.path, &link.key.encode(), &link.pairing)
        }
        (&Method::DELETE, false) => {
            let link = pairing::delete(req.ctx, &owner, &req.key()?).await?;
            forget_pairings(&cache, std::slice::from_ref(&link.other));
            Ok(respond::send_deleted(&cache, req.path))
        }
        // a pairing is never edited in place, only added or removed
        _ => Err(PlannerError::Unsupported),
    }
}

async fn dishes_using(req: &ItemRequest<'_>) -> PlannerResult<Response> {
    if *req.method != Method::GET {
        return Err(PlannerError::Unsupported);
    }
    if !req.id().is_empty() {
        return Err(PlannerError::UnknownItem);
    }

    let ingredient = req.owner()?;
    let mut conn = req.ctx.store.acquire().await?;
    let dishes = dishes::dishes_using(req.ctx, &mut conn, &ingredient).await?;
    respond::send_get(&req.cache(), req.path, &dishes)
}

async fn delete_dish(req: &ItemRequest<'_>) -> PlannerResult<Response> {
    let ctx = req.ctx;
    let key = req.key()?;
    if key.parent() != Some(&ctx.library_key) {
        return Err(PlannerError::UnknownItem);
    }

    let used: Vec<Key> = {
        let mut conn = ctx.store.acquire().await?;
        ItemManager::<MeasuredIngredient>::new(ctx, Kind::MeasuredIngredient)
            .list(&mut conn, &key, None)
            .await?
            .into_iter()
            .filter_map(|mi| mi.ingredient)
            .collect()
    };

    let removal = dishes::delete_dish(ctx, &key).await?;

    let cache = req.cache();
    forget_pairings(&cache, &removal.partners);
    for menu in &removal.menus {
        if let Some(path) = paths::item_path(menu) {
            cache.delete(&path);
        }
    }
    if !removal.menus.is_empty() {
        cache.delete_collection("/menu/");
    }
    for ingredient in &used {
        if let Some(path) = paths::child_path(ingredient, "in") {
            cache.delete_collection(&path);
        }
    }
    cache.delete("/tags");
    Ok(respond::send_deleted(&cache, req.path))
}

pub async fn search(
    State(state): State<SharedState>,
    user: User,
    body: Bytes,
) -> PlannerResult<Response> {
    let ctx = state.context(user).await?;
    let params: SearchParams = serde_json::from_slice(&body)?;
    let hits = Searcher::new(ctx.store.clone(), ctx.library_key.clone())
        .search(&params)
        .await?;
    respond::json(&hits)
}

/// Distinct tag words of the active library, sorted.
pub async fn all_tags(State(state): State<SharedState>, user: User) -> PlannerResult<Response> {
    let ctx = state.context(user).await?;
    let cache = ctx.library_cache();
    if let Some(cached) = cache.get("/tags") {
        return Ok(respond::json_bytes(cached));
    }

    let mut conn = ctx.store.acquire().await?;
    let tags: Vec<(Key, Word)> = ctx.query(Kind::Tag).order("Word").get_all(&mut conn).await?;
    let mut words: Vec<String> = tags.into_iter().map(|(_, tag)| tag.word).collect();
    words.dedup();
    respond::send_get(&cache, "/tags", &words)
}

pub async fn backup(State(state): State<SharedState>, user: User) -> PlannerResult<Response> {
    let ctx = state.context(user).await?;
    let mut conn = ctx.store.acquire().await?;
    let document = backup::export(&mut conn, &ctx.library_key).await?;
    respond::json_pretty(&document)
}

pub async fn restore(
    State(state): State<SharedState>,
    user: User,
    body: Bytes,
) -> PlannerResult<Response> {
    let ctx = state.context(user).await?;
    ctx.ensure_writable()?;

    let document: Backup = serde_json::from_slice(&body)?;
    let mut tx = ctx.store.begin().await?;
    backup::import(&mut tx, &ctx.library_key, &document).await?;
    tx.commit().await?;

    ctx.library_cache().clear();
    Ok(respond::found("/"))
}

pub async fn share(
    State(state): State<SharedState>,
    Path((access, address)): Path<(String, String)>,
    headers: HeaderMap,
    user: User,
) -> PlannerResult<Response> {
    let ctx = state.context(user).await?;

    let base_url = match &state.config.public_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("localhost");
            format!("http://{host}")
        }
    };

    let invitation = Invitation {
        mailer: state.mailer.as_ref(),
        from: &state.config.mail_from,
        base_url: &base_url,
        ttl_days: state.config.share_ttl_days,
    };

    match sharing::issue(&ctx, &invitation, &access, &address).await? {
        ShareOutcome::Sent { .. } => Ok(StatusCode::OK.into_response()),
        ShareOutcome::MailFailed { message } => Ok((StatusCode::OK, message).into_response()),
    }
}

pub async fn share_accept(
    State(state): State<SharedState>,
    Path(token): Path<String>,
    user: User,
) -> PlannerResult<Response> {
    let ctx = state.context(user).await?;
    match sharing::accept(&ctx, &token).await? {
        AcceptOutcome::Accepted { .. } => Ok(respond::found("/")),
        AcceptOutcome::InvalidToken { message } | AcceptOutcome::Expired { message } => {
            Ok((StatusCode::OK, message).into_response())
        }
    }
}

pub async fn libraries(State(state): State<SharedState>, user: User) -> PlannerResult<Response> {
    let ctx = state.context(user).await?;
    respond::json(&sharing::libraries(&ctx).await?)
}

pub async fn switch(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    user: User,
) -> PlannerResult<Response> {
    let ctx = state.context(user).await?;
    sharing::switch(&ctx, &key).await?;
    Ok(respond::found("/"))
}

pub async fn delete_library(
    State(state): State<SharedState>,
    user: User,
) -> PlannerResult<Response> {
    let ctx = state.context(user).await?;
    sharing::delete_library(&ctx).await?;
    Ok(StatusCode::OK.into_response())
}
