use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, Instrument, Level};
use url::Url;

use crate::contract::model::AccessLogEntry;
use crate::domain::device::DeviceInfo;
use crate::domain::error::RelayError;
use crate::domain::keys::RELAY_NAME_PREFIX;
use crate::domain::ports::RelayPort;

/// Object the relay stores per pushed entry.
#[derive(Serialize)]
struct RelayObject<'a> {
    name: String,
    data: RelayPayload<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayPayload<'a> {
    #[serde(flatten)]
    entry: &'a AccessLogEntry,
    device_details: &'a DeviceInfo,
    origin_host: &'a str,
}

#[derive(Deserialize)]
struct RelayItem {
    #[serde(default)]
    name: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// HTTP adapter for [`RelayPort`]: `POST` one object per entry, `GET` the
/// whole list back. One attempt per call, bounded by the client timeout.
pub struct HttpRelayClient {
    client: reqwest::Client,
    endpoint: Url,
    origin_host: String,
    device: DeviceInfo,
}

impl HttpRelayClient {
    pub fn new(
        endpoint: Url,
        timeout: Duration,
        origin_host: impl Into<String>,
        device: DeviceInfo,
    ) -> Result<Self, RelayError> {
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(RelayError::Endpoint {
                message: format!("unsupported scheme '{}'", endpoint.scheme()),
            });
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            origin_host: origin_host.into(),
            device,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn object_name(email: &str) -> String {
        format!("{RELAY_NAME_PREFIX}_{email}")
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, RelayError> {
        let req = req.build()?;
        let span = tracing::span!(
            Level::DEBUG, "outgoing_http",
            http.method = %req.method(),
            http.url = %req.url(),
            http.status_code = tracing::field::Empty,
        );

        let response = self.client.execute(req).instrument(span.clone()).await?;
        let status = response.status();
        span.record("http.status_code", status.as_u16());
        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

/// Turn the relay's list into entries, keeping only objects this system
/// published and silently skipping malformed ones.
fn decode_items(items: Vec<serde_json::Value>) -> Vec<AccessLogEntry> {
    let prefix = format!("{RELAY_NAME_PREFIX}_");
    items
        .into_iter()
        .filter_map(|raw| serde_json::from_value::<RelayItem>(raw).ok())
        .filter(|item| item.name.starts_with(&prefix))
        .filter_map(|item| match serde_json::from_value::<AccessLogEntry>(item.data) {
            Ok(mut entry) => {
                entry.is_remote = true;
                Some(entry)
            }
            Err(e) => {
                debug!(name = %item.name, error = %e, "Skipping malformed relay object");
                None
            }
        })
        .collect()
}

#[async_trait]
impl RelayPort for HttpRelayClient {
    #[instrument(
        name = "carebook.relay.push",
        skip_all,
        fields(endpoint = %self.endpoint, entry_id = %entry.id)
    )]
    async fn push(&self, entry: &AccessLogEntry) -> Result<(), RelayError> {
        let body = RelayObject {
            name: Self::object_name(&entry.email),
            data: RelayPayload {
                entry,
                device_details: &self.device,
                origin_host: &self.origin_host,
            },
        };

        self.send(self.client.post(self.endpoint.clone()).json(&body))
            .await?;
        debug!("Entry relayed");
        Ok(())
    }

    #[instrument(name = "carebook.relay.pull", skip_all, fields(endpoint = %self.endpoint))]
    async fn pull(&self) -> Result<Vec<AccessLogEntry>, RelayError> {
        let response = self.send(self.client.get(self.endpoint.clone())).await?;
        let items: Vec<serde_json::Value> = response.json().await?;

        let entries = decode_items(items);
        debug!(count = entries.len(), "Relay entries pulled");
        Ok(entries)
    }
}
