pub mod cli;
pub mod config;
mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod metadata;
pub mod registry;
pub mod task;
pub mod utils;

pub use config::{ConfDir, Opts};
pub use engine::{AddOutcome, Engine, EngineOptions, ImageSource, ModelInfo, SearchHit};
pub use error::{Error, Result};
