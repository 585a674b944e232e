//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions for the approval tables
//! - [`SeaOrmApprovalStore`], the PostgreSQL implementation of the engine's store
//! - [`WorkflowRepository`] for workflow administration, with a Moka cache
//! - Database migrations

pub mod cache;
pub mod entities;
pub mod migration;
pub mod repositories;

pub use cache::WorkflowCache;
pub use repositories::{SeaOrmApprovalStore, WorkflowRepository};

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a connection pool to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    min_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    Database::connect(options).await
}
