//! Pass storage backends.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use crate::types::{ElementSet, InputSnapshot, Pass, Station};

/// Trait for pass storage backends.
///
/// Stations and element sets are read-only to the scheduler. Passes are
/// append-only and always written as one atomic batch.
#[async_trait]
pub trait PassStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch all stations.
    async fn list_stations(&self) -> Result<Vec<Station>, Self::Error>;

    /// Fetch all element sets.
    async fn list_element_sets(&self) -> Result<Vec<ElementSet>, Self::Error>;

    /// Fetch all persisted passes.
    async fn list_passes(&self) -> Result<Vec<Pass>, Self::Error>;

    /// Insert a batch of passes.
    ///
    /// All-or-nothing: if any record fails, none are committed. Returns the
    /// number of rows written.
    async fn insert_passes(&self, passes: &[Pass]) -> Result<usize, Self::Error>;

    /// Read stations and element sets as one consistent snapshot.
    ///
    /// The default reads them one after the other; backends that can read
    /// both under a single transaction override this.
    async fn load_inputs(&self) -> Result<InputSnapshot, Self::Error> {
        let stations = self.list_stations().await?;
        let element_sets = self.list_element_sets().await?;
        Ok(InputSnapshot::new(stations, element_sets))
    }
}

pub use memory::InMemoryPassStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresPassStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqlitePassStore;
