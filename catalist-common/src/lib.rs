//! # Catalist Common Library
//!
//! Shared code for the Catalist services:
//! - Error and result types
//! - Configuration loading (root folder, TOML config)
//! - Event types (CatalistEvent enum) and the EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
