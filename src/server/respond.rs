//! JSON responses and the cache policy applied when sending them.
//!
//! - GET: the response is cached under the request path.
//! - POST (create): the collection is invalidated with and without its
//!   trailing slash, and the new item is cached under its own path.
//! - PUT (update): the item is cached and its collection invalidated.
//! - DELETE: the item and its collection are invalidated.

use crate::cache::LibraryCache;
use crate::error::PlannerResult;
use crate::server::paths;
use axum::body::Bytes;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub fn json_bytes(body: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

pub fn json<T: Serialize + ?Sized>(value: &T) -> PlannerResult<Response> {
    Ok(json_bytes(Bytes::from(serde_json::to_vec(value)?)))
}

pub fn json_pretty<T: Serialize + ?Sized>(value: &T) -> PlannerResult<Response> {
    Ok(json_bytes(Bytes::from(serde_json::to_vec_pretty(value)?)))
}

/// Plain `302 Found`, the redirect browsers follow with a GET.
pub fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

pub fn send_get<T: Serialize + ?Sized>(
    cache: &LibraryCache<'_>,
    path: &str,
    value: &T,
) -> PlannerResult<Response> {
    let body = Bytes::from(serde_json::to_vec(value)?);
    cache.set(path, body.clone());
    Ok(json_bytes(body))
}

pub fn send_created<T: Serialize + ?Sized>(
    cache: &LibraryCache<'_>,
    collection: &str,
    id: &str,
    value: &T,
) -> PlannerResult<Response> {
    let body = Bytes::from(serde_json::to_vec(value)?);
    cache.delete_collection(collection);
    cache.set(&format!("{}/{id}", collection.trim_end_matches('/')), body.clone());
    Ok(json_bytes(body))
}

pub fn send_updated<T: Serialize + ?Sized>(
    cache: &LibraryCache<'_>,
    path: &str,
    value: &T,
) -> PlannerResult<Response> {
    let body = Bytes::from(serde_json::to_vec(value)?);
    cache.set(path, body.clone());
    cache.delete_collection(paths::collection_of(path));
    Ok(json_bytes(body))
}

pub fn send_deleted(cache: &LibraryCache<'_>, path: &str) -> Response {
    cache.delete_tree(path);
    cache.delete_collection(paths::collection_of(path));
    StatusCode::OK.into_response()
}
