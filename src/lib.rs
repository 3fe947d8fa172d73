//! # mealplan_core
//!
//! Backend of a multi-tenant recipe and meal-planning service.
//!
//! Every user owns a *library* holding dishes, ingredients and menus. Dishes
//! list measured ingredients, carry free-form tags and can be paired with
//! each other. Libraries can be shared with other users, read-only or
//! read-write, through emailed single-use invitations.
//!
//! ## Architecture
//!
//! - **[`store`]**: hierarchical keys and a SQLite-backed entity store with
//!   ancestor queries and transactions
//! - **[`model`]**: the stored entities and their JSON shape
//! - **[`library`]**: request context, access checks and the operations on a
//!   library (CRUD, pairings, sharing, backup)
//! - **[`keywords`]**: derived search words kept in step with dishes,
//!   ingredients and their tags
//! - **[`search`]**: tag and word search across the active library
//! - **[`cache`]**: per-library response cache
//! - **[`server`]**: the axum router and handlers
//! - **[`error`]**: unified error type, mapped onto HTTP statuses
//!
//! ## Example
//!
//! ```rust,no_run
//! use mealplan_core::config::Config;
//! use mealplan_core::server::{AppState, build_router};
//!
//! # async fn demo() -> mealplan_core::PlannerResult<()> {
//! let state = AppState::from_config(Config::load()).await?;
//! let app = build_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`PlannerResult<T>`]. Items that are missing and
//! items outside the caller's active library produce the same
//! [`PlannerError::UnknownItem`], so one tenant cannot probe another's keys.

pub mod cache;
pub mod config;
pub mod error;
pub mod keywords;
pub mod library;
pub mod mail;
pub mod model;
pub mod search;
pub mod server;
pub mod store;

pub use error::{PlannerError, PlannerResult};
