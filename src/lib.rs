//! Turnstile - Strike-Based Admission Control
//!
//! This crate throttles clients per identity with a fixed window and burst
//! allowance, escalates repeat offenders to a temporary blacklist, and honours
//! static allow and deny lists. All per-client state goes through a pluggable
//! counter store so the algorithm does not care where it lives.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
