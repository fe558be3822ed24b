pub mod config;
pub mod error;
pub mod id;
pub mod metrics;
pub mod retry;
pub mod safe_display;
pub mod tracing_setup;

pub use safe_display::SafeDisplay;
