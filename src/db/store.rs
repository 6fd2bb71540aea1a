//! Persistence seam for readings and the bucketed averages derived from them.

use chrono::{DateTime, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use log::debug;
use thiserror::Error;

use crate::db::models::{AvgTemperature, NewTemperature};
use crate::schema;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("applying migrations failed: {0}")]
    Migration(String),
}

/// Storage operations the HTTP layer depends on.
///
/// Calls are blocking; async callers run them on the blocking pool.
pub trait ReadingStore: Send + Sync {
    /// Append one reading. Nothing is written when this fails.
    fn insert_reading(&self, row: &NewTemperature) -> Result<(), StoreError>;

    /// Mean of the bucket averages with `bucket >= start`, or the latest bucket's
    /// average when `start` is `None`. `Ok(None)` means no matching buckets.
    ///
    /// The HTTP layer always resolves a start time (explicit or aligned), so
    /// `None` is only reached by direct storage callers.
    fn average_since(
        &self,
        building_id: &str,
        room_id: &str,
        start: Option<DateTime<Utc>>,
    ) -> Result<Option<f64>, StoreError>;
}

/// TimescaleDB-backed store; every call checks out its own pooled connection.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect(database_url: &str, max_size: u32) -> Result<Self, StoreError> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder().max_size(max_size).build(manager)?;
        Ok(PgStore { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl ReadingStore for PgStore {
    fn insert_reading(&self, row: &NewTemperature) -> Result<(), StoreError> {
        use schema::temperatures::dsl as T;

        let mut conn = self.pool.get()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::insert_into(T::temperatures).values(row).execute(conn)
        })?;
        debug!(
            "Temperature added: {}, {}, {}, {}",
            row.building_id, row.room_id, row.temperature, row.timestamp
        );
        Ok(())
    }

    fn average_since(
        &self,
        building_id: &str,
        room_id: &str,
        start: Option<DateTime<Utc>>,
    ) -> Result<Option<f64>, StoreError> {
        use schema::avg_temperature_time_interval::dsl as A;

        let mut conn = self.pool.get()?;
        let average = match start {
            Some(start) => A::avg_temperature_time_interval
                .filter(A::building_id.eq(building_id))
                .filter(A::room_id.eq(room_id))
                .filter(A::bucket.ge(start))
                .select(diesel::dsl::avg(A::avg_temp))
                .get_result::<Option<f64>>(&mut conn)?,
            None => A::avg_temperature_time_interval
                .filter(A::building_id.eq(building_id))
                .filter(A::room_id.eq(room_id))
                .order(A::bucket.desc())
                .select(AvgTemperature::as_select())
                .first(&mut conn)
                .optional()?
                .map(|latest| latest.avg_temp),
        };
        debug!(
            "Average temperature queried: {:?} for {}, {} (since {:?})",
            average, building_id, room_id, start
        );
        Ok(average)
    }
}
