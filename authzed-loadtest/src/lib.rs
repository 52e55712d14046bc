//! A synthetic load generator for an AuthZed permission system.
//!
//! Write workers continuously write random relationships between users and documents. Every
//! successful write fans out into `read_ratio` permission checks against the freshly written
//! relationship, which read workers pick up from a bounded queue. After a fixed duration all
//! workers stop and a [`Summary`](report::Summary) of writes, checks and their outcomes is
//! reported.
//!
//! The engine talks to the service through the [`Authorizer`](authorizer::Authorizer) trait,
//! which is implemented for the [`authzed_client::Client`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use authzed_loadtest::Workload;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = authzed_client::Client::builder("http://localhost:8443")
//!     .token("somerandomkeyhere")
//!     .build()?;
//!
//! let workload = Workload::builder(Duration::from_secs(60)).read_ratio(10).build();
//! let summary = authzed_loadtest::run(Arc::new(client), workload).await?;
//! summary.print();
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod authorizer;
pub mod cli;
pub mod config;
pub mod fake;
pub mod observability;
pub mod preflight;
pub mod report;
pub mod workload;

pub use crate::workload::{Workload, run};
