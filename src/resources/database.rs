//! Relational database: a PostgreSQL connection pool.

use crate::config::DbOptions;
use crate::error::{ResourceKind, Result, ServiceError};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::str::FromStr;

const KIND: ResourceKind = ResourceKind::Database;

/// Adopt the injected pool or dial the database, check it, and run migrations.
pub(crate) async fn open(options: &DbOptions) -> Result<PgPool> {
    if let Some(pool) = options.injected_pool() {
        tracing::debug!("Using injected database pool");
        return Ok(pool.clone());
    }

    let pool = PgPoolOptions::new()
        .max_connections(options.max_connections)
        .acquire_timeout(options.connect_timeout)
        .connect_with(connect_options(options)?)
        .await
        .map_err(|e| ServiceError::setup(KIND, e))?;

    if let Err(e) = ping(&pool).await {
        pool.close().await;
        return Err(e);
    }

    if let Some(dir) = &options.migrations_dir {
        if let Err(e) = migrate(&pool, dir).await {
            pool.close().await;
            return Err(e);
        }
    }

    Ok(pool)
}

/// Liveness check: a trivial round-trip query.
pub(crate) async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| ServiceError::setup(KIND, e))
}

pub(crate) async fn close(pool: &PgPool) -> Result<()> {
    pool.close().await;
    Ok(())
}

async fn migrate(pool: &PgPool, dir: &std::path::Path) -> Result<()> {
    let migrator = Migrator::new(dir)
        .await
        .map_err(|e| ServiceError::setup(KIND, e))?;
    migrator
        .run(pool)
        .await
        .map_err(|e| ServiceError::setup(KIND, e))?;
    tracing::info!(
        "Applied database migrations from {} ({} known)",
        dir.display(),
        migrator.iter().count()
    );
    Ok(())
}

fn connect_options(options: &DbOptions) -> Result<PgConnectOptions> {
    let (host, port) = split_host(&options.host)?;
    let ssl_mode = PgSslMode::from_str(&options.ssl_mode).map_err(|e| {
        ServiceError::setup(KIND, format!("invalid ssl mode {:?}: {}", options.ssl_mode, e))
    })?;

    let mut connect = PgConnectOptions::new()
        .host(host)
        .username(&options.user)
        .password(&options.password)
        .database(&options.database)
        .ssl_mode(ssl_mode);
    if let Some(port) = port {
        connect = connect.port(port);
    }
    Ok(connect)
}

fn split_host(host: &str) -> Result<(&str, Option<u16>)> {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|e| ServiceError::setup(KIND, format!("invalid port in {host:?}: {e}")))?;
            Ok((name, Some(port)))
        }
        _ => Ok((host, None)),
    }
}
