pub mod classifier;
pub mod parser;
pub mod source;
