//! PostgreSQL pass store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (falls back to `DB_URL`)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 5)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 1)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Schema
//!
//! Table and column names follow the existing ground-segment schema
//! (`stations`, `tles`, `passes`). [`schema_statements`] returns the DDL for
//! those tables plus the pending-change counter and the triggers that bump it
//! and `NOTIFY` listeners whenever stations or element sets change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

use crate::types::{ElementSet, ElementSetId, InputSnapshot, Pass, Station, StationId};
use super::PassStore;

/// Configuration for PostgreSQL connection pool.
///
/// The scheduler runs at most one cycle at a time, so the pool stays small:
/// one connection for the cycle, one for health checks and the counter.
/// The push-mode listener opens its own dedicated connection.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 5).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 1).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .unwrap_or_else(|_| "postgresql://localhost/groundstation".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 5),
            min_connections: env_or("DB_MIN_CONNECTIONS", 1),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// DDL for the tables, counter, and change triggers.
///
/// `channel` is the `NOTIFY` channel; it must be a plain SQL identifier
/// (validated by `SchedulerConfig`).
pub fn schema_statements(channel: &str) -> Vec<String> {
    vec![
        r#"
        CREATE TABLE IF NOT EXISTS stations (
            stnid BIGINT PRIMARY KEY,
            stnname TEXT NOT NULL,
            latitude DOUBLE PRECISION NOT NULL,
            longitude DOUBLE PRECISION NOT NULL,
            altitude DOUBLE PRECISION NOT NULL,
            minhorizon DOUBLE PRECISION NOT NULL
        )
        "#
        .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS tles (
            noradid BIGINT PRIMARY KEY,
            satname TEXT NOT NULL,
            line1 TEXT NOT NULL,
            line2 TEXT NOT NULL
        )
        "#
        .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS passes (
            stnid BIGINT NOT NULL REFERENCES stations (stnid),
            stnname TEXT NOT NULL,
            noradid BIGINT NOT NULL REFERENCES tles (noradid),
            satname TEXT NOT NULL,
            azimuth DOUBLE PRECISION NOT NULL,
            elevation DOUBLE PRECISION NOT NULL,
            aos TIMESTAMPTZ NOT NULL,
            los TIMESTAMPTZ NOT NULL,
            scheduled BOOLEAN NOT NULL,
            CHECK (aos <= los),
            CHECK (azimuth >= 0 AND azimuth < 360)
        )
        "#
        .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS pass_pending_changes (
            id SMALLINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
            count BIGINT NOT NULL DEFAULT 0
        )
        "#
        .to_string(),
        "INSERT INTO pass_pending_changes (id, count) VALUES (1, 0) ON CONFLICT (id) DO NOTHING"
            .to_string(),
        format!(
            r#"
            CREATE OR REPLACE FUNCTION pass_inputs_changed() RETURNS trigger AS $$
            BEGIN
                UPDATE pass_pending_changes SET count = count + 1 WHERE id = 1;
                PERFORM pg_notify('{channel}', TG_TABLE_NAME);
                RETURN NULL;
            END;
            $$ LANGUAGE plpgsql
            "#
        ),
        "DROP TRIGGER IF EXISTS stations_changed ON stations".to_string(),
        r#"
        CREATE TRIGGER stations_changed
            AFTER INSERT OR UPDATE OR DELETE ON stations
            FOR EACH STATEMENT EXECUTE FUNCTION pass_inputs_changed()
        "#
        .to_string(),
        "DROP TRIGGER IF EXISTS tles_changed ON tles".to_string(),
        r#"
        CREATE TRIGGER tles_changed
            AFTER INSERT OR UPDATE OR DELETE ON tles
            FOR EACH STATEMENT EXECUTE FUNCTION pass_inputs_changed()
        "#
        .to_string(),
    ]
}

/// PostgreSQL pass store.
///
/// Uses connection pooling; every batch insert runs in one transaction.
#[derive(Clone)]
pub struct PostgresPassStore {
    pool: PgPool,
}

impl PostgresPassStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool (shared with the change notifier adapters).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables, counter row, and change triggers if missing.
    pub async fn ensure_schema(&self, channel: &str) -> Result<(), PostgresStoreError> {
        let mut tx = self.pool.begin().await?;
        for statement in schema_statements(channel) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!(channel = channel, "Pass schema ensured");
        Ok(())
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    fn parse_station_row(row: &PgRow) -> Result<Station, sqlx::Error> {
        Ok(Station::new(
            StationId::new(row.try_get("stnid")?),
            row.try_get::<String, _>("stnname")?,
            row.try_get("latitude")?,
            row.try_get("longitude")?,
            row.try_get("altitude")?,
            row.try_get("minhorizon")?,
        ))
    }

    fn parse_element_set_row(row: &PgRow) -> Result<ElementSet, sqlx::Error> {
        Ok(ElementSet::new(
            ElementSetId::new(row.try_get("noradid")?),
            row.try_get::<String, _>("satname")?,
            row.try_get::<String, _>("line1")?,
            row.try_get::<String, _>("line2")?,
        ))
    }

    fn parse_pass_row(row: &PgRow) -> Result<Pass, sqlx::Error> {
        let aos: DateTime<Utc> = row.try_get("aos")?;
        let los: DateTime<Utc> = row.try_get("los")?;
        Ok(Pass {
            station_id: StationId::new(row.try_get("stnid")?),
            station_name: row.try_get("stnname")?,
            element_set_id: ElementSetId::new(row.try_get("noradid")?),
            object_name: row.try_get("satname")?,
            azimuth_deg: row.try_get("azimuth")?,
            elevation_deg: row.try_get("elevation")?,
            aos,
            los,
            scheduled: row.try_get("scheduled")?,
        })
    }
}

const SELECT_STATIONS: &str = r#"
    SELECT stnid, stnname, latitude, longitude, altitude, minhorizon
    FROM stations
    ORDER BY stnid
"#;

const SELECT_TLES: &str = r#"
    SELECT noradid, satname, line1, line2
    FROM tles
    ORDER BY noradid
"#;

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresStoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
impl PassStore for PostgresPassStore {
    type Error = PostgresStoreError;

    async fn list_stations(&self) -> Result<Vec<Station>, Self::Error> {
        let rows = sqlx::query(SELECT_STATIONS).fetch_all(&self.pool).await?;
        rows.iter()
            .map(Self::parse_station_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresStoreError::from)
    }

    async fn list_element_sets(&self) -> Result<Vec<ElementSet>, Self::Error> {
        let rows = sqlx::query(SELECT_TLES).fetch_all(&self.pool).await?;
        rows.iter()
            .map(Self::parse_element_set_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresStoreError::from)
    }

    async fn list_passes(&self) -> Result<Vec<Pass>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT stnid, stnname, noradid, satname, azimuth, elevation, aos, los, scheduled
            FROM passes
            ORDER BY aos, stnid, noradid
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_pass_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresStoreError::from)
    }

    async fn insert_passes(&self, passes: &[Pass]) -> Result<usize, Self::Error> {
        // Dropping the transaction on any `?` below rolls the batch back.
        let mut tx = self.pool.begin().await?;

        for pass in passes {
            sqlx::query(
                r#"
                INSERT INTO passes (
                    stnid, stnname, noradid, satname, azimuth,
                    elevation, aos, los, scheduled
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#
            )
            .bind(pass.station_id.get())
            .bind(&pass.station_name)
            .bind(pass.element_set_id.get())
            .bind(&pass.object_name)
            .bind(pass.azimuth_deg)
            .bind(pass.elevation_deg)
            .bind(pass.aos)
            .bind(pass.los)
            .bind(pass.scheduled)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(passes.len())
    }

    async fn load_inputs(&self) -> Result<InputSnapshot, Self::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let station_rows = sqlx::query(SELECT_STATIONS).fetch_all(&mut *tx).await?;
        let tle_rows = sqlx::query(SELECT_TLES).fetch_all(&mut *tx).await?;
        tx.commit().await?;

        let stations = station_rows
            .iter()
            .map(Self::parse_station_row)
            .collect::<Result<Vec<_>, _>>()?;
        let element_sets = tle_rows
            .iter()
            .map(Self::parse_element_set_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InputSnapshot::new(stations, element_sets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_embeds_channel() {
        let statements = schema_statements("pass_inputs_changed");
        assert!(statements
            .iter()
            .any(|s| s.contains("pg_notify('pass_inputs_changed', TG_TABLE_NAME)")));
        assert!(statements.iter().any(|s| s.contains("CREATE TABLE IF NOT EXISTS passes")));
    }
}
