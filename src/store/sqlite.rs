//! SQLite pass store for single-host deployments.
//!
//! Same tables as the PostgreSQL backend. SQLite has no `NOTIFY`, so this
//! backend pairs with the polling scheduler: triggers bump the
//! `pass_pending_changes` counter read by [`SqliteChangeCounter`].
//!
//! [`SqliteChangeCounter`]: crate::notifier::SqliteChangeCounter

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use crate::types::{ElementSet, ElementSetId, InputSnapshot, Pass, Station, StationId};
use super::PassStore;

/// DDL for the tables, counter, and change triggers.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stations (
        stnid INTEGER PRIMARY KEY,
        stnname TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        altitude REAL NOT NULL,
        minhorizon REAL NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tles (
        noradid INTEGER PRIMARY KEY,
        satname TEXT NOT NULL,
        line1 TEXT NOT NULL,
        line2 TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS passes (
        stnid INTEGER NOT NULL REFERENCES stations (stnid),
        stnname TEXT NOT NULL,
        noradid INTEGER NOT NULL REFERENCES tles (noradid),
        satname TEXT NOT NULL,
        azimuth REAL NOT NULL,
        elevation REAL NOT NULL,
        aos TEXT NOT NULL,
        los TEXT NOT NULL,
        scheduled INTEGER NOT NULL,
        CHECK (aos <= los),
        CHECK (azimuth >= 0 AND azimuth < 360)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pass_pending_changes (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        count INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "INSERT OR IGNORE INTO pass_pending_changes (id, count) VALUES (1, 0)",
    r#"
    CREATE TRIGGER IF NOT EXISTS stations_inserted AFTER INSERT ON stations
    BEGIN UPDATE pass_pending_changes SET count = count + 1 WHERE id = 1; END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS stations_updated AFTER UPDATE ON stations
    BEGIN UPDATE pass_pending_changes SET count = count + 1 WHERE id = 1; END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS stations_deleted AFTER DELETE ON stations
    BEGIN UPDATE pass_pending_changes SET count = count + 1 WHERE id = 1; END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS tles_inserted AFTER INSERT ON tles
    BEGIN UPDATE pass_pending_changes SET count = count + 1 WHERE id = 1; END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS tles_updated AFTER UPDATE ON tles
    BEGIN UPDATE pass_pending_changes SET count = count + 1 WHERE id = 1; END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS tles_deleted AFTER DELETE ON tles
    BEGIN UPDATE pass_pending_changes SET count = count + 1 WHERE id = 1; END
    "#,
];

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

/// Error type for SQLite store.
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// SQLite pass store.
#[derive(Clone)]
pub struct SqlitePassStore {
    pool: SqlitePool,
}

impl SqlitePassStore {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// Use `sqlite::memory:` for a throwaway database; the pool is then
    /// limited to one connection so every query sees the same database.
    pub async fn connect(url: &str) -> Result<Self, SqliteStoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables, counter row, and change triggers if missing.
    pub async fn ensure_schema(&self) -> Result<(), SqliteStoreError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Insert or replace a station (operator-side write).
    pub async fn upsert_station(&self, station: &Station) -> Result<(), SqliteStoreError> {
        sqlx::query(
            r#"
            INSERT INTO stations (stnid, stnname, latitude, longitude, altitude, minhorizon)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (stnid) DO UPDATE SET
                stnname = excluded.stnname,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                altitude = excluded.altitude,
                minhorizon = excluded.minhorizon
            "#
        )
        .bind(station.id.get())
        .bind(&station.name)
        .bind(station.latitude_deg)
        .bind(station.longitude_deg)
        .bind(station.altitude_m)
        .bind(station.min_elevation_deg)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace an element set (operator-side write).
    pub async fn upsert_element_set(&self, element_set: &ElementSet) -> Result<(), SqliteStoreError> {
        sqlx::query(
            r#"
            INSERT INTO tles (noradid, satname, line1, line2)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (noradid) DO UPDATE SET
                satname = excluded.satname,
                line1 = excluded.line1,
                line2 = excluded.line2
            "#
        )
        .bind(element_set.id.get())
        .bind(&element_set.object_name)
        .bind(&element_set.line1)
        .bind(&element_set.line2)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn parse_station_row(row: &SqliteRow) -> Result<Station, sqlx::Error> {
        Ok(Station::new(
            StationId::new(row.try_get("stnid")?),
            row.try_get::<String, _>("stnname")?,
            row.try_get("latitude")?,
            row.try_get("longitude")?,
            row.try_get("altitude")?,
            row.try_get("minhorizon")?,
        ))
    }

    fn parse_element_set_row(row: &SqliteRow) -> Result<ElementSet, sqlx::Error> {
        Ok(ElementSet::new(
            ElementSetId::new(row.try_get("noradid")?),
            row.try_get::<String, _>("satname")?,
            row.try_get::<String, _>("line1")?,
            row.try_get::<String, _>("line2")?,
        ))
    }

    fn parse_pass_row(row: &SqliteRow) -> Result<Pass, sqlx::Error> {
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

#[async_trait]
impl PassStore for SqlitePassStore {
    type Error = SqliteStoreError;

    async fn list_stations(&self) -> Result<Vec<Station>, Self::Error> {
        let rows = sqlx::query(SELECT_STATIONS).fetch_all(&self.pool).await?;
        rows.iter()
            .map(Self::parse_station_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(SqliteStoreError::from)
    }

    async fn list_element_sets(&self) -> Result<Vec<ElementSet>, Self::Error> {
        let rows = sqlx::query(SELECT_TLES).fetch_all(&self.pool).await?;
        rows.iter()
            .map(Self::parse_element_set_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(SqliteStoreError::from)
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
            .map_err(SqliteStoreError::from)
    }

    async fn insert_passes(&self, passes: &[Pass]) -> Result<usize, Self::Error> {
        let mut tx = self.pool.begin().await?;

        for pass in passes {
            sqlx::query(
                r#"
                INSERT INTO passes (
                    stnid, stnname, noradid, satname, azimuth,
                    elevation, aos, los, scheduled
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
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
        // A read transaction pins one database snapshot for both queries.
        let mut tx = self.pool.begin().await?;
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
    use crate::types::{LookAngle, PassWindow};
    use chrono::{Duration, TimeZone};

    async fn store() -> SqlitePassStore {
        SqlitePassStore::connect("sqlite::memory:").await.unwrap()
    }

    fn station() -> Station {
        Station::new(StationId::new(1), "Hartebeesthoek", -25.89, 27.69, 1415.0, 10.0)
    }

    fn element_set() -> ElementSet {
        ElementSet::new(ElementSetId::new(43013), "NOAA 20", "1 43013U", "2 43013")
    }

    fn pass(station_id: i64) -> Pass {
        let aos = Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap();
        let mut station = station();
        station.id = StationId::new(station_id);
        Pass::new(
            &station,
            &element_set(),
            PassWindow { aos, los: aos + Duration::minutes(12) },
            LookAngle::new(182.3, 14.1),
            true,
        )
    }

    #[tokio::test]
    async fn test_round_trip_inputs_and_passes() {
        let store = store().await;
        store.upsert_station(&station()).await.unwrap();
        store.upsert_element_set(&element_set()).await.unwrap();

        let snapshot = store.load_inputs().await.unwrap();
        assert_eq!(snapshot.stations(), &[station()]);
        assert_eq!(snapshot.element_sets(), &[element_set()]);

        assert_eq!(store.insert_passes(&[pass(1)]).await.unwrap(), 1);
        let passes = store.list_passes().await.unwrap();
        assert_eq!(passes, vec![pass(1)]);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_no_rows() {
        let store = store().await;
        store.upsert_station(&station()).await.unwrap();
        store.upsert_element_set(&element_set()).await.unwrap();

        // Second record violates the station foreign key.
        let err = store.insert_passes(&[pass(1), pass(99), pass(1)]).await;
        assert!(err.is_err());
        assert!(store.list_passes().await.unwrap().is_empty());
    }
}
