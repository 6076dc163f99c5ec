//! Expohall: exhibitor directory and interactive floor-plan API.
//!
//! The crate is layered the same way the binary consumes it:
//! `domain` holds pure records and helpers, `application` holds the
//! services and the TTL cache they share, `infra` holds the Postgres
//! repositories and the HTTP surface, `config` holds layered settings.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
