pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{AppError, FeedError};
pub use services::{DiversityLayer, FeedComposer, GlobalScorer, LocalScorer, NetworkScorer};
