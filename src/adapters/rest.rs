//! REST transport for the content service.
//!
//! Endpoints:
//! - `GET  {base}/api/v1/read/{type}/{id}` returns `{"success", "message", "asset": {<typeKey>: {...}}}`
//! - `POST {base}/api/v1/edit` with `{"asset": {<typeKey>: {...}}}` returns `{"success", "message"}`
//!
//! Auth: Bearer API key. The REST API always sends node lists as arrays.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{AssetResolver, EditOutcome, Transport, TransportError};
use crate::config::ServiceSettings;
use crate::domain::{AssetKind, AssetRecord, AssetRef};
use crate::wire::WireShape;

/// Transport over the service's JSON REST API
pub struct RestTransport {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

/// Response envelope of a read call
#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    asset: Option<Map<String, Value>>,
}

fn default_success() -> bool {
    true
}

impl RestTransport {
    /// Create a transport for `base_url` with a per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Create from resolved service settings
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self, TransportError> {
        Self::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
            Duration::from_secs(settings.timeout_seconds),
        )
    }

    fn read_url(&self, type_name: &str, id: &str) -> String {
        format!("{}/api/v1/read/{}/{}", self.base_url, type_name, id)
    }

    fn edit_url(&self) -> String {
        format!("{}/api/v1/edit", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn read_typed(&self, type_name: &str, id: &str) -> Result<AssetRecord, TransportError> {
        let url = self.read_url(type_name, id);
        debug!(url = %url, "Reading asset");

        let response = self.authorized(self.client.get(&url)).send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(TransportError::NotFound(format!("{}:{}", type_name, id)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body: ReadResponse = response.json().await?;
        unwrap_asset(body, &format!("{}:{}", type_name, id))
    }
}

/// Pull the single `{<typeKey>: properties}` entry out of a read response
fn unwrap_asset(response: ReadResponse, label: &str) -> Result<AssetRecord, TransportError> {
    if !response.success {
        return Err(TransportError::Service {
            message: response
                .message
                .unwrap_or_else(|| format!("read of {} failed", label)),
        });
    }

    let asset = response
        .asset
        .ok_or_else(|| TransportError::NotFound(label.to_string()))?;
    let (type_key, properties) = asset
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::NotFound(label.to_string()))?;

    match properties {
        Value::Object(properties) => Ok(AssetRecord::new(type_key, properties)),
        _ => Err(TransportError::Service {
            message: format!("asset '{}' of {} is not an object", type_key, label),
        }),
    }
}

/// Wrap a record into the edit request body
fn edit_body(record: &AssetRecord) -> Value {
    let mut inner = Map::new();
    inner.insert(
        record.type_key.clone(),
        Value::Object(record.properties.clone()),
    );
    let mut body = Map::new();
    body.insert("asset".to_string(), Value::Object(inner));
    Value::Object(body)
}

#[async_trait]
impl Transport for RestTransport {
    fn name(&self) -> &str {
        "rest"
    }

    fn shape(&self) -> WireShape {
        WireShape::ArrayOnly
    }

    #[instrument(skip(self), fields(asset = %asset))]
    async fn read(&self, asset: &AssetRef) -> Result<AssetRecord, TransportError> {
        self.read_typed(asset.kind.as_str(), &asset.id).await
    }

    #[instrument(skip(self, record), fields(asset = %asset))]
    async fn edit(
        &self,
        asset: &AssetRef,
        record: &AssetRecord,
    ) -> Result<EditOutcome, TransportError> {
        let response = self
            .authorized(self.client.post(self.edit_url()))
            .json(&edit_body(record))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl AssetResolver for RestTransport {
    async fn resolve(&self, kind: AssetKind, id: &str) -> Result<AssetRecord, TransportError> {
        self.read_typed(kind.as_str(), id).await
    }
}
