//! REST client for the networked document store.
//!
//! ```text
//! GET    /health
//! POST   /sessions                          -> {"id": "..."}
//! PUT    /sessions/{id}
//! DELETE /sessions/{id}
//! PUT    /sessions/{id}/records/{record_id}
//! GET    /sessions/{id}/records
//! GET    /sessions/{id}/records/count       -> {"count": n}
//! PUT    /profiles/{handle}
//! ```

use async_trait::async_trait;
use postkeep_core::config::SharedConfig;
use postkeep_core::record::Record;
use postkeep_core::session::Session;
use postkeep_core::shared::{Profile, SharedStore};
use postkeep_core::{PostkeepError, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpSharedStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl HttpSharedStore {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            PostkeepError::config(format!("invalid shared store url {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(PostkeepError::config(format!(
                "shared store url {} cannot carry a path",
                base_url
            )));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            api_key,
            timeout,
        })
    }

    /// Builds the client from the `[shared]` config section.
    pub fn from_config(config: &SharedConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| PostkeepError::config("shared store enabled but no url configured"))?;

        tracing::info!(
            "[SharedStore] Using {} (API key: {})",
            url,
            if config.api_key.is_some() {
                "present"
            } else {
                "none"
            }
        );

        Self::new(
            &url,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Appends percent-encoded path segments to the base url.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PostkeepError::config(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Adds the timeout and bearer token to a request.
    fn prepare(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(self.timeout);
        match &self.api_key {
            Some(api_key) => request.header("Authorization", format!("Bearer {}", api_key)),
            None => request,
        }
    }

    /// Sends a request and maps transport failures and error statuses.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .prepare(request)
            .send()
            .await
            .map_err(|e| PostkeepError::unavailable(format!("{}: {}", what, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(status_error(status, what, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = self.send(request, what).await?;
        response.json::<T>().await.map_err(|e| PostkeepError::Serialization {
            format: "JSON".to_string(),
            message: format!("{}: {}", what, e),
        })
    }
}

/// Classifies an unsuccessful response.
fn status_error(status: StatusCode, what: &str, body: &str) -> PostkeepError {
    let message = format!("{} returned {}: {}", what, status, body);
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        PostkeepError::unavailable(message)
    } else if status == StatusCode::NOT_FOUND {
        PostkeepError::not_found("shared document", what.to_string())
    } else {
        PostkeepError::data_access(message)
    }
}

#[async_trait]
impl SharedStore for HttpSharedStore {
    async fn ping(&self) -> Result<()> {
        self.send(self.client.get(self.url(&["health"])?), "health check")
            .await?;
        Ok(())
    }

    async fn create_session(&self, session: &Session) -> Result<String> {
        let created: CreatedResponse = self
            .send_json(
                self.client.post(self.url(&["sessions"])?).json(session),
                "create session",
            )
            .await?;
        tracing::debug!("[SharedStore] Allocated session id {}", created.id);
        Ok(created.id)
    }

    async fn upsert_session(&self, session: &Session) -> Result<()> {
        let url = self.url(&["sessions", &session.session_id])?;
        self.send(self.client.put(url).json(session), "upsert session")
            .await?;
        Ok(())
    }

    async fn upsert_record(&self, session_id: &str, record: &Record) -> Result<()> {
        let url = self.url(&["sessions", session_id, "records", &record.record_id])?;
        self.send(self.client.put(url).json(record), "upsert record")
            .await?;
        Ok(())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let url = self.url(&["profiles", &profile.handle])?;
        self.send(self.client.put(url).json(profile), "upsert profile")
            .await?;
        Ok(())
    }

    async fn count_records(&self, session_id: &str) -> Result<u64> {
        let url = self.url(&["sessions", session_id, "records", "count"])?;
        let count: CountResponse = self
            .send_json(self.client.get(url), "count records")
            .await?;
        Ok(count.count)
    }

    async fn fetch_records(&self, session_id: &str) -> Result<Vec<Record>> {
        let url = self.url(&["sessions", session_id, "records"])?;
        self.send_json(self.client.get(url), "fetch records")
            .await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let url = self.url(&["sessions", session_id])?;
        match self.send(self.client.delete(url), "delete session").await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "x", "").is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "x", "").is_transient());
        assert!(status_error(StatusCode::NOT_FOUND, "x", "").is_not_found());

        let rejected = status_error(StatusCode::UNPROCESSABLE_ENTITY, "x", "bad field");
        assert!(matches!(rejected, PostkeepError::DataAccess(_)));
        assert!(!rejected.is_transient());
    }

    #[test]
    fn test_from_config_requires_url() {
        let config = SharedConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(HttpSharedStore::from_config(&config).is_err());

        let config = SharedConfig {
            enabled: true,
            url: Some("https://store.example/".to_string()),
            ..Default::default()
        };
        let store = HttpSharedStore::from_config(&config).unwrap();
        assert_eq!(
            store.url(&["health"]).unwrap().as_str(),
            "https://store.example/health"
        );

        assert!(HttpSharedStore::new("not a url", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let store =
            HttpSharedStore::new("https://store.example/api/", None, Duration::from_secs(1))
                .unwrap();

        let url = store.url(&["profiles", "a/b?c#d e"]).unwrap();
        assert_eq!(url.as_str(), "https://store.example/api/profiles/a%2Fb%3Fc%23d%20e");
        assert_eq!(url.path_segments().unwrap().count(), 3);

        let url = store
            .url(&["sessions", "s 1", "records", "42", "count"])
            .unwrap();
        assert_eq!(url.path(), "/api/sessions/s%201/records/42/count");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transient() {
        // Nothing listens on port 9 (discard) in test environments.
        let store =
            HttpSharedStore::new("http://127.0.0.1:9", None, Duration::from_millis(500)).unwrap();
        let err = store.ping().await.unwrap_err();
        assert!(err.is_transient());
    }
}
