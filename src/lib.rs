pub mod aggregation;
pub mod api;
pub mod capture;
pub mod models;
pub mod monitor;
pub mod utils;
