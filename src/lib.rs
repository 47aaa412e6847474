//! Floodgate - Per-Identity Rate Limiting
//!
//! This crate answers one question in constant time: is this unit of work
//! admitted right now? Admission is decided per identity key (user, API key,
//! IP, endpoint) against a configurable [`limiter::Limit`], either entirely
//! in-process or against shared state in Redis so a fleet of processes
//! enforces one global limit.

pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod middleware;
