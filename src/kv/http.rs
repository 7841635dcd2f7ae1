//! HTTP client for the remote key-value store.
//!
//! One instance is bound to a single logical namespace. Every call applies a
//! short request timeout; a timeout is reported as [`KvError::Timeout`] and
//! callers treat it as a hard failure (deny), never as an implicit allow.

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{Instrument, info_span};

use super::{KvError, KvStore};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct HttpKvStore {
    client: Client,
    base_url: String,
    namespace: String,
    token: SecretString,
}

#[derive(Serialize)]
struct PutRequest<'a> {
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl_seconds: Option<i64>,
}

#[derive(Deserialize)]
struct GetResponse {
    value: String,
}

impl HttpKvStore {
    /// Build a client for one namespace of the store.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(base_url: &str, namespace: &str, token: SecretString) -> Result<Self, KvError> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| KvError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
            token,
        })
    }

    fn url(&self, key: &str) -> String {
        // Keys are built from validated, normalized inputs and never contain
        // path separators.
        format!("{}/v1/{}/{}", self.base_url, self.namespace, key)
    }
}

fn transport_error(err: &reqwest::Error) -> KvError {
    if err.is_timeout() {
        KvError::Timeout
    } else {
        KvError::Transport(err.to_string())
    }
}

#[async_trait::async_trait]
impl KvStore for HttpKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let url = self.url(key);
        let span = info_span!("kv.get", http.method = "GET", url = %url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport_error(&err))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: GetResponse = response
                    .json()
                    .await
                    .map_err(|err| KvError::Decode(err.to_string()))?;
                Ok(Some(body.value))
            }
            status => Err(KvError::Status {
                status: status.as_u16(),
            }),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl_seconds: Option<i64>,
    ) -> Result<(), KvError> {
        let url = self.url(key);
        let span = info_span!("kv.put", http.method = "PUT", url = %url);
        let response = self
            .client
            .put(&url)
            .bearer_auth(self.token.expose_secret())
            .json(&PutRequest {
                value: &value,
                ttl_seconds,
            })
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport_error(&err))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(KvError::Status {
                status: response.status().as_u16(),
            })
        }
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let url = self.url(key);
        let span = info_span!("kv.delete", http.method = "DELETE", url = %url);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport_error(&err))?;

        // Deleting an absent key is a success.
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(KvError::Status {
                status: response.status().as_u16(),
            })
        }
    }
}
