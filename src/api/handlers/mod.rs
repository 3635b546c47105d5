pub mod links;
pub mod monitor;
