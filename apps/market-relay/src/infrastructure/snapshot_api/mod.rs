//! Snapshot API Client
//!
//! [`SnapshotSource`] adapter over the upstream query API.
//!
//! # Wire Format
//!
//! ```text
//! GET {base_url}/groups/{GROUP}/snapshots
//! 200 OK
//! [ { "symbol": "VIC", "refPrice": "100", "ceiling": "107", ... }, ... ]
//! ```
//!
//! The array is in membership order. Fields use the same camelCase names as
//! [`MarketState`].

use async_trait::async_trait;
use reqwest::Client;

use crate::SnapshotApiSettings;
use crate::application::ports::{SnapshotSource, SnapshotSourceError};
use crate::domain::market::{Group, MarketState};

/// HTTP client for group snapshots.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: Client,
    base_url: String,
}

impl HttpSnapshotSource {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotSourceError::Request` if the HTTP client cannot be built.
    pub fn new(settings: &SnapshotApiSettings) -> Result<Self, SnapshotSourceError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| SnapshotSourceError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn group_url(&self, group: Group) -> String {
        format!("{}/groups/{group}/snapshots", self.base_url)
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_group(&self, group: Group) -> Result<Vec<MarketState>, SnapshotSourceError> {
        let url = self.group_url(group);
        tracing::debug!(group = %group, url = %url, "Fetching group snapshot");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SnapshotSourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotSourceError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SnapshotSourceError::Request(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| SnapshotSourceError::Payload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn source_for(server: &MockServer) -> HttpSnapshotSource {
        let mut settings = SnapshotApiSettings::new(format!("{}/", server.uri()));
        settings.request_timeout = Duration::from_millis(500);
        HttpSnapshotSource::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn fetches_group_in_membership_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/HOSE/snapshots"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"symbol": "VIC", "refPrice": "100", "ceiling": "110"},
                {"symbol": "VHM", "refPrice": "50"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let states = source_for(&server).await.fetch_group(Group::Hose).await.unwrap();

        assert_eq!(states.len(), 2);
        assert_eq!(states[0].symbol, "VIC");
        assert_eq!(states[0].ceiling, Some(Decimal::from(110)));
        assert_eq!(states[1].symbol, "VHM");
        assert_eq!(states[1].ceiling, None);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/HNX/snapshots"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch_group(Group::Hnx).await.unwrap_err();
        assert!(matches!(err, SnapshotSourceError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn malformed_body_is_a_payload_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/UPCOM/snapshots"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"not\": \"a list\"}"))
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch_group(Group::Upcom).await.unwrap_err();
        assert!(matches!(err, SnapshotSourceError::Payload(_)));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch_group(Group::Vn30).await.unwrap_err();
        assert!(matches!(err, SnapshotSourceError::Request(_)));
    }
}
