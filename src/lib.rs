//! Pulse: typed access to a hosted social backend plus a query cache with
//! declarative invalidation.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
mod util;
