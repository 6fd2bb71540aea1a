//! One simulated sensor: sample, send, sleep, repeat.

use chrono::Utc;
use chrono_tz::Tz;
use log::{error, info};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Room};
use crate::models::reading::{MAX_TEMPERATURE_C, MIN_TEMPERATURE_C, Reading};
use crate::simulation::sender::{RetryPolicy, Transport, send_with_retry};

/// Uniform sample in `[min, max]`, rounded to two decimals.
pub fn generate_random_temperature(min: f64, max: f64) -> f64 {
    let raw = rand::rng().random_range(min..=max);
    ((raw * 100.0).round() / 100.0).clamp(min, max)
}

/// Everything a generator needs besides its room.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub api_url: String,
    pub timezone: Tz,
    pub send_period: Duration,
    pub retry: RetryPolicy,
    /// Stop after this many loops; `None` runs until cancelled.
    pub max_iterations: Option<u64>,
}

impl GeneratorSettings {
    pub fn from_config(config: &Config, max_iterations: Option<u64>) -> Self {
        GeneratorSettings {
            api_url: config.api_url.clone(),
            timezone: config.timezone,
            send_period: config.data_interval,
            retry: RetryPolicy {
                max_retries: config.send_max_retries,
                backoff_base: config.send_backoff_base,
            },
            max_iterations,
        }
    }
}

pub fn sample_reading(room: &Room, timezone: Tz) -> Reading {
    Reading {
        building_id: room.building_id.clone(),
        room_id: room.room_id.clone(),
        temperature: generate_random_temperature(MIN_TEMPERATURE_C, MAX_TEMPERATURE_C),
        timestamp: Utc::now().with_timezone(&timezone).fixed_offset(),
    }
}

/// Returns the number of completed loops.
///
/// Cancellation is observed while sending and while sleeping, so a cancelled
/// generator exits at its next suspension point.
pub async fn run_generator<T: Transport>(
    transport: &T,
    room: &Room,
    settings: &GeneratorSettings,
    cancel: &CancellationToken,
) -> u64 {
    let mut iterations = 0u64;

    while settings.max_iterations.is_none_or(|max| iterations < max) {
        let reading = sample_reading(room, settings.timezone);
        let payload = match serde_json::to_value(&reading) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode reading for {}/{}: {}", room.building_id, room.room_id, e);
                break;
            }
        };

        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            ok = send_with_retry(transport, &settings.api_url, &payload, settings.retry) => ok,
        };
        if delivered {
            info!("Successfully sent data: {}", payload);
        } else {
            error!("Failed to send data after retries: {}", payload);
        }
        iterations += 1;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(settings.send_period) => {}
        }
    }

    info!(
        "Generator for building {} room {} stopped after {} reading(s)",
        room.building_id, room.room_id, iterations
    );
    iterations
}
