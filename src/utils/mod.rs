//! Utility modules

pub mod human_format;

pub use human_format::{format_interval, format_uptime};
