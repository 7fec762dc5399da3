pub mod adapter;
pub mod aggregate;
pub mod codecs;
pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod fixture;
pub mod report;
pub mod types;

pub use crate::error::HarnessError;
