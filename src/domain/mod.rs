//! Domain layer: models, errors, and ports.

pub mod error;
pub mod models;
pub mod ports;
