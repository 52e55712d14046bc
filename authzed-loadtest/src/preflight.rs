//! Checks performed against the AuthZed API before a live run starts.

use anyhow::{Context, Result};
use authzed_client::Client;

/// Verifies that the service is healthy and writes the schema, if one is given.
///
/// Any failure here aborts the run before a single relationship is written.
pub async fn preflight(client: &Client, schema: Option<&str>) -> Result<()> {
    tracing::debug!(endpoint = %client.endpoint(), "sending health check");
    client
        .health()
        .await
        .with_context(|| format!("AuthZed at {} is not healthy", client.endpoint()))?;

    if let Some(schema) = schema {
        let response = client
            .write_schema(schema)
            .await
            .context("failed to write AuthZed schema")?;
        tracing::info!(written_at = ?response.written_at, "schema written");
    }

    tracing::info!(endpoint = %client.endpoint(), "AuthZed is healthy");
    Ok(())
}

#[cfg(test)]
mod tests {
    use authzed_test::server::TestServer;

    use super::*;

    const SCHEMA: &str = "definition user {}";

    fn client(server: &TestServer) -> Client {
        Client::builder(server.url("/"))
            .token("secret")
            .retry(1, std::time::Duration::ZERO)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn healthy_service_passes() {
        let server = TestServer::with_token("secret").await;

        preflight(&client(&server), None).await.unwrap();

        assert_eq!(server.health_requests(), 1);
        assert_eq!(server.schema(), None);
    }

    #[tokio::test]
    async fn writes_schema() {
        let server = TestServer::with_token("secret").await;

        preflight(&client(&server), Some(SCHEMA)).await.unwrap();

        assert_eq!(server.schema().as_deref(), Some(SCHEMA));
    }

    #[tokio::test]
    async fn unhealthy_service_fails() {
        let server = TestServer::with_token("secret").await;
        server.fail_all(true);

        let err = preflight(&client(&server), Some(SCHEMA))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("is not healthy"), "{err:#}");
        assert_eq!(server.schema(), None);
    }

    #[tokio::test]
    async fn unreachable_service_fails() {
        let server = TestServer::new().await;
        let url = server.url("/");
        drop(server);

        let client = Client::builder(url).build().unwrap();
        assert!(preflight(&client, None).await.is_err());
    }
}
