pub mod config;
pub mod errors;
pub mod extract;
pub mod generation;
pub mod pipeline;
pub mod prompt;
pub mod storage;
