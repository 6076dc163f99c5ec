//! Application services orchestrating repositories, the TTL cache and
//! domain rules. HTTP handlers call into these; nothing here knows about
//! axum or SQL.

pub mod analytics;
pub mod auth;
pub mod booths;
pub mod cache;
pub mod csv;
pub mod error;
pub mod exhibitors;
pub mod favorites;
pub mod pagination;
pub mod repos;
pub mod sectors;
pub mod themes;
pub mod users;
