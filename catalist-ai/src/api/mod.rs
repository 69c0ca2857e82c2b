//! HTTP API handlers for catalist-ai
//!
//! JSON REST for the review pipeline and registry, plus an SSE event feed.

pub mod health;
pub mod registry;
pub mod review;
pub mod settings;
pub mod sse;

pub use health::health_routes;
pub use registry::registry_routes;
pub use review::review_routes;
pub use settings::settings_routes;
pub use sse::event_routes;
