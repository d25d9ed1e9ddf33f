use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ProviderError;

/// Ground-truth match state as reported by the hosting provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderMatchStatus {
    Ended { winner_team: Option<i16> },
    Cancelled,
    InProgress,
    NotFound,
}

/// Remote control-plane for game servers: a source of truth for match
/// outcomes plus a side-effect target for freeing server slots.
#[async_trait]
pub trait HostingProvider: Send + Sync {
    async fn get_match_status(
        &self,
        external_id: &str,
    ) -> Result<ProviderMatchStatus, ProviderError>;

    async fn send_server_command(
        &self,
        server_id: &str,
        command: &str,
    ) -> Result<(), ProviderError>;

    async fn release_server(&self, server_id: &str) -> Result<(), ProviderError>;
}

#[derive(Debug, Deserialize)]
struct MatchStatusResponse {
    status: String,
    winner_team: Option<i16>,
}

pub struct HttpHostingProvider {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpHostingProvider {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            api_key,
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl HostingProvider for HttpHostingProvider {
    async fn get_match_status(
        &self,
        external_id: &str,
    ) -> Result<ProviderMatchStatus, ProviderError> {
        let response = self
            .http
            .get(format!("{}/matches/{}", self.api_url, external_id))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(ProviderMatchStatus::NotFound);
        }

        let body: MatchStatusResponse = self.check(response).await?.json().await?;

        Ok(match body.status.as_str() {
            "ended" => ProviderMatchStatus::Ended {
                winner_team: body.winner_team,
            },
            "cancelled" => ProviderMatchStatus::Cancelled,
            "in_progress" => ProviderMatchStatus::InProgress,
            _ => ProviderMatchStatus::NotFound,
        })
    }

    async fn send_server_command(
        &self,
        server_id: &str,
        command: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(format!("{}/servers/{}/command", self.api_url, server_id))
            .header("X-Api-Key", &self.api_key)
            .json(&json!({ "command": command }))
            .send()
            .await?;

        self.check(response).await?;
        Ok(())
    }

    async fn release_server(&self, server_id: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .delete(format!("{}/servers/{}", self.api_url, server_id))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        self.check(response).await?;
        info!("Server {} released", server_id);
        Ok(())
    }
}
