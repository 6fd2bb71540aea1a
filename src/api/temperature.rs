//! `/v1/temperature` endpoints: append a reading, read a windowed average.

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::StatusCode;
use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{error, info};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::api::AppState;
use crate::api::error::ApiError;
use crate::db::models::NewTemperature;
use crate::db::store::StoreError;
use crate::models::reading::{
    AddTemperatureResponse, AverageTemperatureResponse, FieldError, MAX_ID_CHARS, Reading, validate_fields,
};
use crate::utils::align_time_to_interval;

/// Raw ingestion body; the timestamp stays a string until its offset is checked.
#[derive(Debug, Deserialize)]
pub struct TemperatureRequest {
    pub building_id: String,
    pub room_id: String,
    pub temperature: f64,
    pub timestamp: String,
}

impl TemperatureRequest {
    pub fn into_reading(self) -> Result<Reading, Vec<FieldError>> {
        match parse_aware_timestamp(&self.timestamp) {
            Ok(timestamp) => {
                let reading = Reading {
                    building_id: self.building_id,
                    room_id: self.room_id,
                    temperature: self.temperature,
                    timestamp,
                };
                reading.validate().map(|()| reading)
            }
            Err(timestamp_error) => {
                let mut errors = validate_fields(&self.building_id, &self.room_id, self.temperature);
                errors.push(timestamp_error);
                Err(errors)
            }
        }
    }
}

const NOT_ISO8601: &str = "Input should be a valid ISO 8601 datetime";
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M%z",
];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// An ISO 8601 value, with or without a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Iso8601 {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

/// Accepts extended and basic offsets, a `Z` suffix, optional seconds and
/// fractions, a space instead of `T`, and bare dates (read as midnight).
fn parse_iso8601(raw: &str) -> Option<Iso8601> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(Iso8601::Aware(ts));
    }
    let zulu = raw.strip_suffix(['Z', 'z']).map(|rest| format!("{rest}+00:00"));
    let with_offset = zulu.as_deref().unwrap_or(raw);
    if let Some(ts) = OFFSET_FORMATS.iter().find_map(|f| DateTime::parse_from_str(with_offset, f).ok()) {
        return Some(Iso8601::Aware(ts));
    }
    if let Some(naive) = NAIVE_FORMATS.iter().find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok()) {
        return Some(Iso8601::Naive(naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| Iso8601::Naive(date.and_time(NaiveTime::MIN)))
}

fn parse_aware_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, FieldError> {
    let (msg, kind) = match parse_iso8601(raw.trim()) {
        Some(Iso8601::Aware(ts)) => return Ok(ts),
        Some(Iso8601::Naive(_)) => ("Timestamp must be timezone-aware.", "timezone_aware"),
        None => (NOT_ISO8601, "datetime_parsing"),
    };
    Err(FieldError::body("timestamp", msg, kind))
}

/// JSON body extractor reporting the failing field path as a 422.
#[derive(Debug)]
pub struct ReadingBody(pub Reading);

impl<S> FromRequest<S> for ReadingBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::http(rejection.status(), rejection.body_text()))?;
        let request: TemperatureRequest = parse_json_body(&bytes)?;
        request.into_reading().map(ReadingBody).map_err(ApiError::Validation)
    }
}

fn parse_json_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.into_inner();
        let mut loc = vec!["body".to_string()];
        if path != "." {
            loc.extend(path.split('.').map(str::to_string));
        }
        let kind = match inner.classify() {
            serde_json::error::Category::Data => "value_error",
            _ => "json_invalid",
        };
        ApiError::Validation(vec![FieldError::new(loc, inner.to_string(), kind)])
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct AverageParams {
    pub building_id: Option<String>,
    pub room_id: Option<String>,
    pub query_datetime: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureQuery {
    pub building_id: String,
    pub room_id: String,
    pub query_datetime: Option<DateTime<Utc>>,
}

impl AverageParams {
    /// Naive `query_datetime` values are read as wall-clock time in `timezone`.
    pub fn validate(self, timezone: Tz) -> Result<TemperatureQuery, Vec<FieldError>> {
        let building_id = self.building_id.unwrap_or_default();
        let room_id = self.room_id.unwrap_or_default();

        let mut errors = Vec::new();
        for (field, value) in [("building_id", &building_id), ("room_id", &room_id)] {
            if value.is_empty() {
                errors.push(FieldError::query(
                    field,
                    "Both building_id and room_id must be provided and non-empty.",
                    "missing",
                ));
            } else if value.chars().count() > MAX_ID_CHARS {
                errors.push(FieldError::query(
                    field,
                    format!("String should have at most {} characters", MAX_ID_CHARS),
                    "string_too_long",
                ));
            }
        }

        let query_datetime = match self.query_datetime.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match parse_query_datetime(raw, timezone) {
                Ok(ts) => Some(ts),
                Err(e) => {
                    errors.push(e);
                    None
                }
            },
        };

        if errors.is_empty() {
            Ok(TemperatureQuery {
                building_id,
                room_id,
                query_datetime,
            })
        } else {
            Err(errors)
        }
    }
}

/// Naive values are wall-clock time in `timezone`; the earlier instant wins when
/// the clock is turned back, and times skipped by a forward shift are rejected.
fn parse_query_datetime(raw: &str, timezone: Tz) -> Result<DateTime<Utc>, FieldError> {
    match parse_iso8601(raw) {
        Some(Iso8601::Aware(ts)) => Ok(ts.with_timezone(&Utc)),
        Some(Iso8601::Naive(naive)) => match timezone.from_local_datetime(&naive) {
            LocalResult::Single(ts) | LocalResult::Ambiguous(ts, _) => Ok(ts.with_timezone(&Utc)),
            LocalResult::None => Err(FieldError::query(
                "query_datetime",
                format!("{naive} does not exist in {timezone} (skipped by a daylight saving change)"),
                "nonexistent_local_time",
            )),
        },
        None => Err(FieldError::query("query_datetime", NOT_ISO8601, "datetime_parsing")),
    }
}

/// Explicit query time wins verbatim; otherwise align `now` in the configured zone.
pub fn resolve_start_time(
    query_datetime: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    timezone: Tz,
    interval: NonZeroU32,
) -> DateTime<Utc> {
    match query_datetime {
        Some(explicit) => explicit,
        None => align_time_to_interval(now.with_timezone(&timezone), interval).with_timezone(&Utc),
    }
}

/// Run a blocking store call off the async workers and map its failure modes.
async fn run_store<T, F>(action: &'static str, op: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("Database error while {}: {}", action, e);
            Err(ApiError::Storage)
        }
        Err(join_error) => Err(ApiError::unexpected(join_error)),
    }
}

pub async fn add_temperature(
    State(state): State<AppState>,
    ReadingBody(reading): ReadingBody,
) -> Result<(StatusCode, Json<AddTemperatureResponse>), ApiError> {
    let row = NewTemperature::new(
        reading.building_id,
        reading.room_id,
        reading.temperature,
        reading.timestamp.with_timezone(&Utc),
    );
    let (building_id, room_id) = (row.building_id.clone(), row.room_id.clone());

    let store = Arc::clone(&state.store);
    run_store("adding temperature", move || store.insert_reading(&row)).await?;

    info!("Temperature data added for Building ID: {}, Room ID: {}", building_id, room_id);
    Ok((
        StatusCode::CREATED,
        Json(AddTemperatureResponse {
            message: "Temperature data added".to_string(),
        }),
    ))
}

pub async fn fetch_average_temperature(
    State(state): State<AppState>,
    params: Result<Query<AverageParams>, QueryRejection>,
) -> Result<Json<AverageTemperatureResponse>, ApiError> {
    let Query(params) = params.map_err(|rejection| {
        ApiError::Validation(vec![FieldError::new(
            vec!["query".to_string()],
            rejection.body_text(),
            "query_invalid",
        )])
    })?;
    let query = params.validate(state.config.timezone).map_err(ApiError::Validation)?;

    let start_time = resolve_start_time(
        query.query_datetime,
        Utc::now(),
        state.config.timezone,
        state.config.alignment_interval,
    );

    let store = Arc::clone(&state.store);
    let (building_id, room_id) = (query.building_id.clone(), query.room_id.clone());
    let average = run_store("fetching average temperature", move || {
        store.average_since(&building_id, &room_id, Some(start_time))
    })
    .await?;

    match average {
        Some(avg) => {
            info!(
                "Average temperature for Building ID: {}, Room ID: {}, Start Time: {} is {}",
                query.building_id, query.room_id, start_time, avg
            );
            Ok(Json(AverageTemperatureResponse::found(avg)))
        }
        None => {
            info!(
                "No temperature data found for Building ID: {}, Room ID: {}",
                query.building_id, query.room_id
            );
            Ok(Json(AverageTemperatureResponse::no_data()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use chrono_tz::Europe::Zurich;

    fn params(building: Option<&str>, room: Option<&str>, when: Option<&str>) -> AverageParams {
        AverageParams {
            building_id: building.map(str::to_string),
            room_id: room.map(str::to_string),
            query_datetime: when.map(str::to_string),
        }
    }

    fn request(timestamp: &str, temperature: f64) -> TemperatureRequest {
        TemperatureRequest {
            building_id: "1".to_string(),
            room_id: "101".to_string(),
            temperature,
            timestamp: timestamp.to_string(),
        }
    }

    #[test]
    fn aware_timestamps_are_accepted_in_any_offset() {
        let noon_utc = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        for raw in [
            "2024-01-01T13:00:00+01:00",
            "2024-01-01T12:00:00Z",
            "2024-01-01T12:00+00:00",
            "2024-01-01T13:00:00+0100",
            "2024-01-01T13:00+0100",
            "2024-01-01T12:00Z",
            "2024-01-01 13:00:00.000+01:00",
        ] {
            let reading = request(raw, 22.5).into_reading().unwrap();
            assert_eq!(reading.timestamp.with_timezone(&Utc), noon_utc, "{raw}");
        }
    }

    #[test]
    fn naive_timestamps_are_rejected() {
        for raw in ["2024-01-01T12:00:00", "2024-01-01T12:00", "2024-01-01"] {
            let errors = request(raw, 22.5).into_reading().unwrap_err();
            assert_eq!(errors.len(), 1, "{raw}");
            assert_eq!(errors[0].kind, "timezone_aware", "{raw}");
        }
    }

    #[test]
    fn timestamp_and_field_errors_are_reported_together() {
        let errors = request("01-01-2024 12:00:00", 100.0).into_reading().unwrap_err();
        let kinds: Vec<_> = errors.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["out_of_range", "datetime_parsing"]);
    }

    #[test]
    fn json_errors_point_at_the_field() {
        let err = parse_json_body::<TemperatureRequest>(
            br#"{"building_id":"1","room_id":"101","temperature":"warm","timestamp":"x"}"#,
        )
        .unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors[0].loc, vec!["body", "temperature"]);

        let err = parse_json_body::<TemperatureRequest>(br#"{"building_id":"1""#).unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors[0].kind, "json_invalid");
    }

    #[test]
    fn query_requires_both_ids() {
        let errors = params(None, None, None).validate(Zurich).unwrap_err();
        let locs: Vec<_> = errors.iter().map(|e| e.loc.clone()).collect();
        assert_eq!(locs, vec![vec!["query", "building_id"], vec!["query", "room_id"]]);

        let errors = params(Some("1"), Some(""), None).validate(Zurich).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].loc, vec!["query", "room_id"]);
        let query = params(Some("1"), Some("101"), None).validate(Zurich).unwrap();
        assert_eq!(query.query_datetime, None);
    }

    #[test]
    fn naive_query_datetime_uses_configured_zone() {
        let query = params(Some("1"), Some("101"), Some("2024-01-01T00:00:00"))
            .validate(Zurich)
            .unwrap();
        assert_eq!(
            query.query_datetime,
            Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap())
        );

        let query = params(Some("1"), Some("101"), Some("2024-01-01T00:00:00Z"))
            .validate(Zurich)
            .unwrap();
        assert_eq!(
            query.query_datetime,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );

        let zurich_midnight = Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap());
        for raw in ["2024-01-01", "2024-01-01T00:00", "2024-01-01 00:00:00"] {
            let query = params(Some("1"), Some("101"), Some(raw)).validate(Zurich).unwrap();
            assert_eq!(query.query_datetime, zurich_midnight, "{raw}");
        }

        let query = params(Some("1"), Some("101"), Some("2024-01-01T01:00+0100"))
            .validate(Zurich)
            .unwrap();
        assert_eq!(query.query_datetime, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn local_times_around_daylight_saving_changes() {
        let errors = params(Some("1"), Some("101"), Some("2024-03-31T02:30:00"))
            .validate(Zurich)
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].loc, vec!["query", "query_datetime"]);
        assert_eq!(errors[0].kind, "nonexistent_local_time");

        // 02:30 happens twice on 27 October; the first (CEST) occurrence wins.
        let query = params(Some("1"), Some("101"), Some("2024-10-27T02:30:00"))
            .validate(Zurich)
            .unwrap();
        assert_eq!(
            query.query_datetime,
            Some(Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).unwrap())
        );
    }

    #[test]
    fn garbage_query_datetime_is_rejected() {
        let errors = params(Some("1"), Some("101"), Some("yesterday"))
            .validate(Zurich)
            .unwrap_err();
        assert_eq!(errors[0].loc, vec!["query", "query_datetime"]);
        assert_eq!(errors[0].kind, "datetime_parsing");
    }

    #[test]
    fn explicit_query_time_bypasses_alignment() {
        let now = Utc.with_ymd_and_hms(2024, 5, 5, 10, 10, 10).unwrap();
        let explicit = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 7).unwrap();
        let interval = NonZeroU32::new(4).unwrap();
        assert_eq!(resolve_start_time(Some(explicit), now, Zurich, interval), explicit);
    }

    #[test]
    fn implicit_query_time_is_aligned() {
        let now = Utc.with_ymd_and_hms(2024, 5, 5, 10, 10, 10).unwrap();
        let interval = NonZeroU32::new(4).unwrap();
        let start = resolve_start_time(None, now, Zurich, interval);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 5, 10, 4, 0).unwrap());
        assert!(now - start >= Duration::minutes(4));
    }
}
