//! # Staffsync Common Library
//!
//! Shared code for the staffsync client crates including:
//! - Assignment and status models
//! - Error taxonomy shared by the remote stores and the cache
//! - Configuration loading
//! - Event types (SyncEvent enum) and EventBus
//! - ISO week helpers for weekly time series
//! - Id generation

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, ErrorKind, Result};
pub use models::{Assignment, AssignmentId, AssignmentStatus};
pub use time::WeekKey;
