//! Test utilities for the AuthZed load generator and its client.
//!
//! This crate provides an in-process stand-in for the AuthZed HTTP API and a test logger. See the
//! modules for all available utilities.

pub mod server;
pub mod tracing;
