use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::{Consistency, Error};

const USER_AGENT: &str = concat!("authzed-client/", env!("CARGO_PKG_VERSION"));

/// How often and how fast failed requests are retried.
///
/// Transport errors and non-2xx responses are retried, after waiting a fixed `delay` between
/// attempts. A response that arrives with a success status but cannot be decoded is not retried.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Always at least `1`.
    pub attempts: u32,
    /// Fixed delay between two consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
struct ClientBuilderInner {
    endpoint: Url,
    token: Option<HeaderValue>,
    retry: RetryPolicy,
    consistency: Consistency,
    reqwest_builder: reqwest::ClientBuilder,
}

/// Builder to create a [`Client`].
#[must_use]
#[derive(Debug)]
pub struct ClientBuilder(crate::Result<ClientBuilderInner>);

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`] pointing at the given API `endpoint`.
    ///
    /// The endpoint may contain a path prefix, all API paths are resolved relative to it.
    pub fn new(endpoint: impl reqwest::IntoUrl) -> Self {
        let mut endpoint = match endpoint.into_url() {
            Ok(url) => url,
            Err(err) => return Self(Err(err.into())),
        };

        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let reqwest_builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .read_timeout(Duration::from_secs(3))
            .user_agent(USER_AGENT);

        Self(Ok(ClientBuilderInner {
            endpoint,
            token: None,
            retry: RetryPolicy::default(),
            consistency: Consistency::default(),
            reqwest_builder,
        }))
    }

    /// Sets the pre-shared key sent as bearer token with every request.
    ///
    /// The token is redacted from `Debug` output.
    pub fn token(self, token: impl Into<String>) -> Self {
        let Ok(mut inner) = self.0 else { return self };
        match HeaderValue::from_str(&format!("Bearer {}", token.into())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                inner.token = Some(value);
                Self(Ok(inner))
            }
            Err(err) => Self(Err(err.into())),
        }
    }

    /// Sets both the connect and the read timeout for the [`reqwest::Client`].
    pub fn timeout(self, timeout: Duration) -> Self {
        self.configure_reqwest(|builder| builder.connect_timeout(timeout).read_timeout(timeout))
    }

    /// Sets the retry policy for all JSON endpoints.
    pub fn retry(mut self, attempts: u32, delay: Duration) -> Self {
        if let Ok(ref mut inner) = self.0 {
            inner.retry = RetryPolicy {
                attempts: attempts.max(1),
                delay,
            };
        }
        self
    }

    /// Sets the consistency requirement used for permission checks.
    pub fn consistency(mut self, consistency: Consistency) -> Self {
        if let Ok(ref mut inner) = self.0 {
            inner.consistency = consistency;
        }
        self
    }

    /// Calls the closure with the underlying [`reqwest::ClientBuilder`].
    pub fn configure_reqwest<F>(self, closure: F) -> Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder,
    {
        let Ok(inner) = self.0 else { return self };
        Self(Ok(ClientBuilderInner {
            reqwest_builder: closure(inner.reqwest_builder),
            ..inner
        }))
    }

    /// Returns a [`Client`] that uses this [`ClientBuilder`] configuration.
    ///
    /// # Errors
    ///
    /// This method fails if:
    /// - the given `endpoint` is invalid
    /// - the token cannot be used as a header value
    /// - the [`reqwest::Client`] fails to build. Refer to [`reqwest::ClientBuilder::build`] for
    ///   more information on when this can happen.
    pub fn build(self) -> crate::Result<Client> {
        let inner = self.0?;

        let mut headers = HeaderMap::new();
        if let Some(token) = inner.token {
            headers.insert(header::AUTHORIZATION, token);
        }

        let reqwest = inner.reqwest_builder.default_headers(headers).build()?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                reqwest,
                endpoint: inner.endpoint,
                retry: inner.retry,
                consistency: inner.consistency,
            }),
        })
    }
}

#[derive(Debug)]
pub(crate) struct ClientInner {
    reqwest: reqwest::Client,
    endpoint: Url,
    retry: RetryPolicy,
    pub(crate) consistency: Consistency,
}

/// A client for the AuthZed HTTP API. Use [`Client::builder`] to configure and construct this.
///
/// The client is cheap to clone and can be shared between many concurrent tasks.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl Client {
    /// Convenience function to create a [`ClientBuilder`].
    pub fn builder(endpoint: impl reqwest::IntoUrl) -> ClientBuilder {
        ClientBuilder::new(endpoint)
    }

    /// Returns the base URL all API paths are resolved against.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Returns the retry policy of this client.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// Probes `GET /healthz` once, without retries.
    ///
    /// Succeeds only if the service answers with `200 OK`.
    pub async fn health(&self) -> crate::Result<()> {
        let url = self.inner.endpoint.join("healthz")?;
        let response = self.inner.reqwest.get(url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status { status, body });
        }

        Ok(())
    }

    /// Sends `body` as JSON to `path` and decodes the JSON response, retrying per the policy.
    pub(crate) async fn post_json<B, R>(&self, path: &str, body: &B) -> crate::Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.inner.endpoint.join(path)?;
        let RetryPolicy { attempts, delay } = self.inner.retry;

        let mut attempt = 1;
        loop {
            match self.post_once(url.clone(), body).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < attempts && is_retryable(&err) => {
                    tracing::warn!(
                        attempt,
                        %url,
                        error = &err as &dyn std::error::Error,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::debug!(
                        attempt,
                        %url,
                        error = &err as &dyn std::error::Error,
                        "request failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn post_once<B, R>(&self, url: Url, body: &B) -> crate::Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.inner.reqwest.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

fn is_retryable(err: &Error) -> bool {
    match err {
        Error::Status { .. } => true,
        Error::Reqwest(err) => !err.is_decode() && !err.is_builder(),
        _ => false,
    }
}
