//! GraphQL-over-HTTP client for remote collaborators.
//!
//! # Transport contract
//!
//! - `POST {query, variables}` as JSON, caller's `Authorization` forwarded
//! - per-attempt timeout (30 s by default); a deadline miss is `TIMEOUT`
//! - one retry, only when the connection could not be established
//! - HTTP 4xx is never retried; its GraphQL errors are surfaced when present
//! - HTTP 5xx, a non-JSON body, or `data: null` without errors is
//!   `UPSTREAM_UNAVAILABLE`
//! - `errors[0]` is mapped onto a known code via `extensions.code` (or a
//!   top-level `code`), falling back to `BAD_INPUT` with the remote message

use crate::metrics;
use cinema_core::{Error, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: &'a Value,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<RemoteError>,
}

#[derive(Deserialize)]
struct RemoteError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    extensions: Option<RemoteExtensions>,
}

#[derive(Deserialize)]
struct RemoteExtensions {
    #[serde(default)]
    code: Option<String>,
}

impl RemoteError {
    fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.code.as_deref())
            .or(self.code.as_deref())
    }
}

/// One remote GraphQL service.
#[derive(Clone)]
pub struct RemoteService {
    name: &'static str,
    url: String,
    client: Client,
}

impl RemoteService {
    /// Client for the service at `url`, labelled `name` in errors and
    /// metrics.
    ///
    /// # Errors
    ///
    /// Returns `INTERNAL_ERROR` if the HTTP client cannot be built.
    pub fn new(name: &'static str, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            name,
            url: url.into(),
            client,
        })
    }

    /// Service label, e.g. `movie service`
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Endpoint URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Runs `query` and decodes its `data` into `T`.
    ///
    /// # Errors
    ///
    /// See the module documentation.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        authorization: Option<&str>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = self.execute(query, &variables, authorization).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(Error::Timeout { .. }) => "timeout",
            Err(err) if err.is_availability() => "unavailable",
            Err(_) => "error",
        };
        metrics::record_downstream(self.name, outcome, started.elapsed());
        if let Err(err) = &result {
            tracing::debug!(service = self.name, outcome, error = %err, "Downstream request failed");
        }
        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: &Value,
        authorization: Option<&str>,
    ) -> Result<T> {
        let response = match self.send(query, variables, authorization).await {
            Err(err) if err.is_connect() => {
                tracing::warn!(service = self.name, error = %err, "Connection failed, retrying once");
                self.send(query, variables, authorization).await
            }
            other => other,
        }
        .map_err(|err| self.transport_error(&err))?;

        let status = response.status();
        if status.is_server_error() {
            tracing::warn!(service = self.name, status = status.as_u16(), "Downstream server error");
            return Err(Error::unavailable(self.name));
        }
        if status.is_client_error() {
            return Err(self.client_error(status, response).await);
        }
        if !is_json(&response) {
            return Err(Error::unavailable(self.name));
        }

        let body: GraphqlResponse = response
            .json()
            .await
            .map_err(|_| Error::unavailable(self.name))?;
        if let Some(first) = body.errors.first() {
            return Err(Error::from_remote(first.code(), &first.message, self.name));
        }
        match body.data {
            Some(data) if !data.is_null() => serde_json::from_value(data).map_err(|e| {
                tracing::warn!(service = self.name, error = %e, "Unexpected downstream payload");
                Error::unavailable(self.name)
            }),
            _ => Err(Error::unavailable(self.name)),
        }
    }

    async fn send(
        &self,
        query: &str,
        variables: &Value,
        authorization: Option<&str>,
    ) -> reqwest::Result<Response> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&GraphqlRequest { query, variables });
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        request.send().await
    }

    fn transport_error(&self, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                service: self.name.to_string(),
            }
        } else {
            tracing::warn!(service = self.name, error = %err, "Downstream unreachable");
            Error::unavailable(self.name)
        }
    }

    async fn client_error(&self, status: StatusCode, response: Response) -> Error {
        if is_json(&response) {
            if let Ok(body) = response.json::<GraphqlResponse>().await {
                if let Some(first) = body.errors.first() {
                    return Error::from_remote(first.code(), &first.message, self.name);
                }
            }
        }
        match status {
            StatusCode::UNAUTHORIZED => Error::InvalidToken,
            StatusCode::FORBIDDEN => Error::Forbidden(format!("{} refused the request", self.name)),
            _ => Error::BadInput(format!("{} rejected the request ({status})", self.name)),
        }
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            let mime = value.split(';').next().unwrap_or_default().trim();
            mime.eq_ignore_ascii_case("application/json")
                || mime.to_ascii_lowercase().ends_with("+json")
        })
}

/// Deserializes an id that remote services send either as a string or as a
/// number.
///
/// # Errors
///
/// Fails for anything but a string or an integer.
pub fn flexible_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(i64),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Text(text) => text,
        Repr::Number(number) => number.to_string(),
    })
}
