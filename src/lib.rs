//! Mediasqueeze - content-aware media size reduction
//!
//! This library crate exposes the core functionality for integration testing.

pub mod commands;
pub mod config;
pub mod exit;
pub mod optimizer;
pub mod pipeline;
