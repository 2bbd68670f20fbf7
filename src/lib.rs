pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod ml;
pub mod types;
pub mod web;

pub use error::PredictionError;
