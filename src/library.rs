//! Library-scoped operations.
//!
//! Everything a request does happens against one active library, resolved
//! once per request into a [`context::RequestContext`]. The submodules build
//! on that context:
//!
//! - [`manager`]: generic CRUD over the entity kinds stored in a library,
//! - [`dishes`]: dish-specific cascades and reverse lookups,
//! - [`pairing`]: the mirrored dish-to-dish links,
//! - [`sharing`]: invitations, permissions and library switching,
//! - [`backup`]: export and idempotent import of a whole library.

pub mod backup;
pub mod context;
pub mod dishes;
pub mod manager;
pub mod pairing;
pub mod sharing;
