//! Wire models shared by the API and the simulator.
//!
//! Timestamps travel as RFC 3339 strings carrying an explicit offset.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

pub const MIN_TEMPERATURE_C: f64 = -50.0;
pub const MAX_TEMPERATURE_C: f64 = 50.0;
pub const MAX_ID_CHARS: usize = 255;

/// One temperature measurement for a (building, room) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub building_id: String,
    pub room_id: String,
    pub temperature: f64,
    pub timestamp: DateTime<FixedOffset>,
}

impl Reading {
    /// Field constraints; every violation is reported, not just the first.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let errors = validate_fields(&self.building_id, &self.room_id, self.temperature);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

pub fn validate_fields(building_id: &str, room_id: &str, temperature: f64) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(e) = check_id("building_id", building_id) {
        errors.push(e);
    }
    if let Some(e) = check_id("room_id", room_id) {
        errors.push(e);
    }
    if !(MIN_TEMPERATURE_C..=MAX_TEMPERATURE_C).contains(&temperature) {
        errors.push(FieldError::body(
            "temperature",
            format!("Input should be between {} and {}", MIN_TEMPERATURE_C, MAX_TEMPERATURE_C),
            "out_of_range",
        ));
    }
    errors
}

fn check_id(field: &str, value: &str) -> Option<FieldError> {
    let chars = value.chars().count();
    if chars == 0 {
        Some(FieldError::body(field, "String should have at least 1 character", "string_too_short"))
    } else if chars > MAX_ID_CHARS {
        Some(FieldError::body(
            field,
            format!("String should have at most {} characters", MAX_ID_CHARS),
            "string_too_long",
        ))
    } else {
        None
    }
}

/// A single validation failure, located by its path in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn new(loc: Vec<String>, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc,
            msg: msg.into(),
            kind: kind.into(),
        }
    }

    pub fn body(field: &str, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(vec!["body".to_string(), field.to_string()], msg, kind)
    }

    pub fn query(field: &str, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(vec!["query".to_string(), field.to_string()], msg, kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddTemperatureResponse {
    pub message: String,
}

/// Exactly one of the two fields is set; both are always serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageTemperatureResponse {
    pub average_temperature: Option<f64>,
    pub message: Option<String>,
}

impl AverageTemperatureResponse {
    pub fn found(average: f64) -> Self {
        Self {
            average_temperature: Some(average),
            message: None,
        }
    }

    pub fn no_data() -> Self {
        Self {
            average_temperature: None,
            message: Some("No data found".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub app_name: String,
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}
