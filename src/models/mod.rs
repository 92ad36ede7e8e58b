// src/models/mod.rs

//! Domain models for the news aggregator.
//!
//! This module contains all data structures used throughout the
//! application, organized by their primary purpose.

mod config;
mod discovery;
mod feed;

// Re-export all public types
pub use config::{Config, DeliveryConfig, FeedsConfig, HttpConfig, RuntimeConfig, SourceEntry};
pub use discovery::{DetailRecord, RawDiscoveryRecord, VideoSource};
pub use feed::{Category, FeedItem, FeedKey, Game, Platform};
