//! Synthetic sensors posting readings to the ingestion endpoint.

pub mod driver;
pub mod generator;
pub mod sender;
