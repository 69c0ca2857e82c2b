//! Test Helper Utilities
//!
//! Shared utilities for testing catalist-ai

#![allow(dead_code)]

pub mod db_utils;
pub mod scripted_extractor;

// Each test binary uses a different subset of these
#[allow(unused_imports)]
pub use db_utils::{create_memory_db, create_test_db, test_app_state};
#[allow(unused_imports)]
pub use scripted_extractor::{sample_payload, ScriptedExtractor};
