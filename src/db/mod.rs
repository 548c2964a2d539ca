//! Position Store backed by SQLite.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer for position rows and the operation log

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
