// Device API HTTP client
//
// Wraps `reqwest::Client` with configuration-API URL construction and
// envelope unwrapping. Objects travel as untyped JSON maps; the shape is
// owned by the schema descriptors in `rekon-core`.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::SecretString;
use serde_json::{Map, Value};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::DeviceResponse;
use crate::transport::TransportConfig;

/// A JSON object as exchanged with the device.
pub type WireObject = Map<String, Value>;

const CMDB_PREFIX: [&str; 3] = ["api", "v2", "cmdb"];
const STATUS_PATH: [&str; 5] = ["api", "v2", "monitor", "system", "status"];
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Raw HTTP client for a device's configuration API.
///
/// Handles the `{ status, http_status, results, mkey, version }` envelope
/// and scope-aware URL construction. Read methods return the unwrapped
/// object; write methods return the acknowledgement (`mkey` and status).
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl DeviceClient {
    /// Create a client that authenticates with a bearer API key.
    pub fn new(
        base_url: Url,
        api_key: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_authenticated_client(api_key)?;
        Ok(Self {
            http,
            base_url,
            timeout: transport.timeout,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout: TransportConfig::default().timeout,
        }
    }

    /// Per-request timeout; requests exceeding it fail with `Error::Timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The device base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api/v2/cmdb/{path}[/{id}][?scope=...]`.
    ///
    /// Each segment is percent-encoded, so identifiers containing `/` or
    /// spaces are safe.
    pub(crate) fn object_url(
        &self,
        path: &str,
        id: Option<&str>,
        scope: Option<&str>,
    ) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.pop_if_empty();
            segments.extend(CMDB_PREFIX);
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
            if let Some(id) = id {
                segments.push(id);
            }
        }
        if let Some(scope) = scope {
            url.query_pairs_mut().append_pair("scope", scope);
        }
        Ok(url)
    }

    fn status_url(&self) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(STATUS_PATH);
        Ok(url)
    }

    // ── Object operations ────────────────────────────────────────────

    /// Fetch a single object. A missing object is `Error::NotFound`.
    pub async fn get_object(
        &self,
        path: &str,
        id: &str,
        scope: Option<&str>,
    ) -> Result<WireObject, Error> {
        let url = self.object_url(path, Some(id), scope)?;
        debug!("GET {}", url);

        let resp = self.send(self.http.get(url)).await?;
        let envelope = self.parse_envelope(resp, path).await?;
        envelope.into_first_object().ok_or_else(|| Error::NotFound {
            path: format!("{path}/{id}"),
        })
    }

    /// Create an object in the collection at `path`.
    pub async fn create_object(
        &self,
        path: &str,
        body: &WireObject,
        scope: Option<&str>,
    ) -> Result<WireObject, Error> {
        let url = self.object_url(path, None, scope)?;
        debug!("POST {}", url);
        trace!(body = %serde_json::Value::Object(body.clone()), "create payload");

        let resp = self.send(self.http.post(url).json(body)).await?;
        Ok(self.parse_envelope(resp, path).await?.into_ack())
    }

    /// Partially update an existing object; only the keys present in
    /// `body` are touched on the device.
    pub async fn update_object(
        &self,
        path: &str,
        id: &str,
        body: &WireObject,
        scope: Option<&str>,
    ) -> Result<WireObject, Error> {
        let url = self.object_url(path, Some(id), scope)?;
        debug!("PUT {}", url);
        trace!(body = %serde_json::Value::Object(body.clone()), "update payload");

        let resp = self.send(self.http.put(url).json(body)).await?;
        Ok(self.parse_envelope(resp, path).await?.into_ack())
    }

    /// Delete an object.
    pub async fn delete_object(
        &self,
        path: &str,
        id: &str,
        scope: Option<&str>,
    ) -> Result<(), Error> {
        let url = self.object_url(path, Some(id), scope)?;
        debug!("DELETE {}", url);

        let resp = self.send(self.http.delete(url)).await?;
        self.parse_envelope(resp, path).await?;
        Ok(())
    }

    /// Ask the device which API version it runs (e.g. `"v6.2.3"`).
    pub async fn api_version(&self) -> Result<String, Error> {
        let url = self.status_url()?;
        debug!("GET {}", url);

        let resp = self.send(self.http.get(url)).await?;
        let envelope = self.parse_envelope(resp, "monitor/system/status").await?;
        envelope.version.ok_or_else(|| Error::Deserialization {
            message: "status response carries no version".into(),
            body: String::new(),
        })
    }

    // ── Envelope handling ────────────────────────────────────────────

    async fn send(&self, request: RequestBuilder) -> Result<Response, Error> {
        request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }

    /// Map HTTP status and the `{ status, ... }` envelope to a result.
    async fn parse_envelope(
        &self,
        resp: Response,
        path: &str,
    ) -> Result<DeviceResponse, Error> {
        let status = resp.status();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(Error::Authentication {
                    message: format!("API key rejected (HTTP {})", status.as_u16()),
                });
            }
            StatusCode::NOT_FOUND => {
                return Err(Error::NotFound { path: path.into() });
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                return Err(Error::RateLimited { retry_after_secs });
            }
            _ => {}
        }

        let body = resp.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<DeviceResponse>(&body).ok();
            return Err(Error::Api {
                message: parsed.as_ref().map_or_else(
                    || format!("HTTP {status}: {}", preview(&body)),
                    DeviceResponse::error_message,
                ),
                code: parsed.and_then(|p| p.error),
                status: status.as_u16(),
            });
        }

        let envelope: DeviceResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: format!("{e} (body preview: {:?})", preview(&body)),
                body: body.clone(),
            })?;

        if envelope.is_success() {
            Ok(envelope)
        } else {
            let http_status = envelope.http_status.unwrap_or(status.as_u16());
            if http_status == StatusCode::NOT_FOUND.as_u16() {
                return Err(Error::NotFound { path: path.into() });
            }
            Err(Error::Api {
                message: envelope.error_message(),
                code: envelope.error,
                status: http_status,
            })
        }
    }
}

fn preview(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(idx, _)| idx);
    &body[..end]
}
