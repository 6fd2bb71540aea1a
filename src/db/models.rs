//! Diesel model structs for the reading fact table and its bucketed averages.
//!
//! Important: migrations set up `temperatures` as a TimescaleDB hypertable and
//! `avg_temperature_time_interval` as a continuous aggregate over it.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema;

// Hypertable: temperatures (append-only)
#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::temperatures)]
pub struct NewTemperature {
    pub building_id: String,
    pub room_id: String,
    pub temperature: f64,
    pub timestamp: DateTime<Utc>,
}

impl NewTemperature {
    pub fn new(
        building_id: impl Into<String>,
        room_id: impl Into<String>,
        temperature: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            building_id: building_id.into(),
            room_id: room_id.into(),
            temperature,
            timestamp,
        }
    }
}

// Continuous aggregate: one row per (bucket, building, room)
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::avg_temperature_time_interval)]
pub struct AvgTemperature {
    pub bucket: DateTime<Utc>,
    pub building_id: String,
    pub room_id: String,
    pub avg_temp: f64,
}
