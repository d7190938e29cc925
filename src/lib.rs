//! Reportgate - rate-limited submission gateway
//!
//! This crate implements the public API of a whistleblowing report portal.
//! Case submissions pass through a per-client fixed-window rate limiter
//! before being relayed to the upstream dashboard API; tracking, form
//! configuration and health requests are relayed directly.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod gate;
pub mod ratelimit;
pub mod server;
pub mod submission;
