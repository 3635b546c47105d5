pub mod collectors;
pub mod counters;
pub mod records;
pub mod sampler;
pub mod store;
