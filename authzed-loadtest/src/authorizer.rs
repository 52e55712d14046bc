//! The seam between the workload engine and the authorization service.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use authzed_client::Client;
use secrecy::ExposeSecret;

use crate::config::AuthZed;
use crate::workload::Tuple;

/// The two operations the workload engine performs against an authorization service.
///
/// Implementations are expected to retry transient failures themselves. The engine counts any
/// returned error as a failed operation and never retries on top.
#[async_trait]
pub trait Authorizer: Send + Sync + 'static {
    /// Idempotently writes the relationship described by `tuple`.
    async fn write(&self, tuple: &Tuple) -> Result<()>;

    /// Checks whether the subject of `tuple` has `permission` on its resource.
    async fn check(&self, tuple: &Tuple, permission: &str) -> Result<bool>;
}

#[async_trait]
impl Authorizer for Client {
    async fn write(&self, tuple: &Tuple) -> Result<()> {
        self.touch_relationship(tuple.relationship()).await?;
        Ok(())
    }

    async fn check(&self, tuple: &Tuple, permission: &str) -> Result<bool> {
        let allowed = self
            .check_permission(tuple.resource(), permission, tuple.subject())
            .await?;
        Ok(allowed)
    }
}

/// Stands in for the service in dry-run mode, where the engine never calls it.
#[derive(Debug)]
pub struct Offline;

#[async_trait]
impl Authorizer for Offline {
    async fn write(&self, _tuple: &Tuple) -> Result<()> {
        bail!("dry run does not contact the authorization service")
    }

    async fn check(&self, _tuple: &Tuple, _permission: &str) -> Result<bool> {
        bail!("dry run does not contact the authorization service")
    }
}

/// Creates an AuthZed client from the configuration.
pub fn client(config: &AuthZed) -> Result<Client> {
    let api = config.api.as_deref().context("AuthZed endpoint is missing")?;

    let mut builder = Client::builder(api)
        .timeout(config.timeout)
        .retry(config.retry_attempts, config.retry_delay)
        .consistency(config.consistency.into());
    if let Some(key) = &config.key {
        builder = builder.token(key.expose_secret().as_str());
    }

    builder.build().context("failed to build AuthZed client")
}
