// Infrastructure layer - External dependencies and adapters
pub mod compression;
pub mod config;
pub mod export;
pub mod http_dataset_source;
pub mod message;
