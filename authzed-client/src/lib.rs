//! # AuthZed Client
//!
//! A small client for the AuthZed HTTP API. It covers the handful of endpoints needed to drive
//! load against a permission system: writing relationships, checking permissions, writing a schema
//! and probing the health endpoint.
//!
//! Every JSON endpoint is retried transparently. A transport error or a non-2xx response counts as
//! a failed attempt, and the last failure is returned once all attempts are exhausted.
//!
//! ## Usage
//!
//! ```no_run
//! use authzed_client::{Client, ObjectReference, Relationship, SubjectReference};
//!
//! #[tokio::main]
//! # async fn main() -> authzed_client::Result<()> {
//!     let client = Client::builder("http://localhost:8443")
//!         .token("my-preshared-key")
//!         .build()?;
//!
//!     let document = ObjectReference::new("document", "doc_1");
//!     let alice = SubjectReference::new("user", "alice");
//!
//!     client
//!         .touch_relationship(Relationship::new(document.clone(), "viewer", alice.clone()))
//!         .await?;
//!     let allowed = client.check_permission(document, "view", alice).await?;
//!     assert!(allowed);
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod client;
mod error;
mod permissions;
mod relationships;
mod schema;
mod types;

pub use client::*;
pub use error::*;
pub use types::*;
