//! OTP destination audit: classifies one-time-passcode deliveries against
//! the member's contact profile.

pub mod classifier;
pub mod config;
pub mod contact;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod explainer;
pub mod payload;
pub mod report;
pub mod snapshot;
pub mod store;
pub mod types;
