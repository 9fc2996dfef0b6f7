// Domain layer - Force measurement models and analysis algorithms
pub mod analysis;
pub mod comparison;
pub mod error;
pub mod filters;
pub mod history;
pub mod matrix;
pub mod measurement;
pub mod series;
pub mod statistics;
