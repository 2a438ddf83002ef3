pub mod access;
pub mod config;
pub mod dedup;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod pipeline;
pub mod plate_detection;
pub mod plate_number;
pub mod storage;
pub mod utils;
