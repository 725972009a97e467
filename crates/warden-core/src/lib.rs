//! Warden Core - Shared types for the Warden execution-authorization runtime.
//!
//! This crate holds the small vocabulary every other Warden crate speaks:
//!
//! - [`RiskLevel`] — the ordinal risk classification (Low < Medium < High <
//!   Critical) with the level→score and score→level conversion tables.
//! - [`Timestamp`] — a thin UTC timestamp wrapper used for request creation
//!   and expiry times.
//! - [`ToolParams`] — the opaque string-keyed parameter map a tool
//!   invocation carries, plus the stringification helpers risk heuristics
//!   and whitelist matching use.
//!
//! # Example
//!
//! ```
//! use warden_core::types::RiskLevel;
//!
//! assert!(RiskLevel::Critical > RiskLevel::High);
//! assert_eq!(RiskLevel::High.base_score(), 75);
//! assert_eq!(RiskLevel::from_score(80), RiskLevel::Critical);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod params;
pub mod types;

pub use params::{ToolParams, param_str, stringify_value};
pub use types::{RiskLevel, Timestamp};
