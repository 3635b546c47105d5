pub mod pipeline;
pub mod window;
