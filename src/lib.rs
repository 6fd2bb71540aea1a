pub mod models {
    pub mod reading;
}

pub mod api;
pub mod config;
pub mod db {
    pub mod migrations;
    pub mod models;
    pub mod store;
}
pub mod env_file;
pub mod logging;
pub mod schema;
pub mod shutdown;
pub mod simulation;
pub mod utils;
