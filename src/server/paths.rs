//! Positional request-path parsing.
//!
//! Resource paths look like `/dish`, `/dish/{id}`, `/dish/{id}/tags/` or
//! `/dish/{id}/tags/{tag}`. The item id is always the last segment and the
//! parent id the third from last; the segment between them names the child
//! collection.

use crate::store::key::{Key, Kind};

fn segments(path: &str) -> Vec<&str> {
    path.split('/').collect()
}

/// Last path segment, or `""` for paths with fewer than three segments.
pub fn item_id(path: &str) -> &str {
    let parts = segments(path);
    if parts.len() < 3 {
        return "";
    }
    parts[parts.len() - 1]
}

/// Third-from-last path segment, or `""` for paths with fewer than five segments.
pub fn parent_id(path: &str) -> &str {
    let parts = segments(path);
    if parts.len() < 5 {
        return "";
    }
    parts[parts.len() - 3]
}

/// Name of the child collection (`tags`, `mi`, ...) in a five-segment path.
pub fn child_collection(path: &str) -> Option<&str> {
    let parts = segments(path);
    if parts.len() < 5 {
        return None;
    }
    Some(parts[parts.len() - 2])
}

/// First path segment, naming the top-level resource.
pub fn resource(path: &str) -> &str {
    path.trim_start_matches('/').split('/').next().unwrap_or_default()
}

pub fn resource_kind(name: &str) -> Option<Kind> {
    match name {
        "dish" => Some(Kind::Dish),
        "ingredient" => Some(Kind::Ingredient),
        "menu" => Some(Kind::Menu),
        _ => None,
    }
}

fn resource_name(kind: Kind) -> Option<&'static str> {
    match kind {
        Kind::Dish => Some("dish"),
        Kind::Ingredient => Some("ingredient"),
        Kind::Menu => Some("menu"),
        _ => None,
    }
}

/// Request path of a top-level item, e.g. `/dish/{key}`.
pub fn item_path(key: &Key) -> Option<String> {
    resource_name(key.kind()).map(|name| format!("/{name}/{key}"))
}

/// Request path of a child collection of a top-level item, e.g. `/dish/{key}/tags/`.
pub fn child_path(key: &Key, collection: &str) -> Option<String> {
    item_path(key).map(|path| format!("{path}/{collection}/"))
}

/// Path of the collection containing the item addressed by `path`.
pub fn collection_of(path: &str) -> &str {
    let id = item_id(path);
    &path[..path.len() - id.len()]
}
