// src/models/mod.rs

//! Domain models for the monitor application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod discovery;
mod monitor;

// Re-export all public types
pub use config::{Config, FetchConfig, SiteProfile};
pub use discovery::{DiscoveredEvent, DiscoveryRule, EventFields};
pub use monitor::{MonitorStatus, MonitorTarget, MonitorUpdate, NewMonitor};
