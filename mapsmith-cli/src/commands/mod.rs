//! CLI command implementations.
//!
//! - [`config`] - Effective configuration and its path
//! - [`extent`] - Tile resolution and extent
//! - [`sql`] - Filter and widget SQL
//! - [`tile`] - Tile rendering

pub mod common;
pub mod config;
pub mod extent;
pub mod sql;
pub mod tile;
