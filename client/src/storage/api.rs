//! Driver for the site's own REST API (`/api/palpites`, `/api/stats`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    CreateGuessRequest, CreateGuessResponse, ErrorResponse, GuessInput, GuessListResponse,
    GuessRecord, GuessStats, MessageResponse, StatsResponse,
};
use tracing::{debug, info};

use crate::config::Timeouts;
use crate::error::{StorageError, StorageResult};
use crate::storage::connection::ReadyState;
use crate::storage::traits::{CreatedGuess, DriverId, GuessStorage};

pub struct ApiDriver {
    base_url: String,
    timeouts: Timeouts,
    client: ReadyState<Client>,
}

impl ApiDriver {
    pub fn new(base_url: &str, timeouts: Timeouts) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeouts,
            client: ReadyState::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn client(&self) -> StorageResult<&Client> {
        self.client
            .get_or_try_init(|| async {
                info!("Creating HTTP client for {}", self.base_url);
                Client::builder()
                    .connect_timeout(self.timeouts.probe)
                    .build()
                    .map_err(|e| StorageError::Connection(format!("failed to build HTTP client: {e}")))
            })
            .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, timeout: Duration) -> StorageResult<T> {
        let response = self
            .client()
            .await?
            .get(self.url(path))
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;
        handle_response(response, StorageError::Read).await
    }
}

/// Timeouts and refused connections both count as the backend being away
fn transport_error(e: reqwest::Error) -> StorageError {
    if e.is_timeout() {
        StorageError::Connection(format!("request timed out: {e}"))
    } else {
        StorageError::Connection(e.to_string())
    }
}

/// Decode a success body, or turn the status into the matching error.
/// A 400 carries the server's validation message.
async fn handle_response<T: DeserializeOwned>(
    response: Response,
    on_failure: fn(String) -> StorageError,
) -> StorageResult<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST {
            if let Ok(body) = serde_json::from_str::<ErrorResponse>(&text) {
                return Err(StorageError::Validation(body.error));
            }
        }
        return Err(on_failure(format!("server answered {status}: {text}")));
    }

    response
        .json()
        .await
        .map_err(|e| on_failure(format!("unexpected response body: {e}")))
}

#[async_trait]
impl GuessStorage for ApiDriver {
    fn id(&self) -> DriverId {
        DriverId::Api
    }

    async fn initialize(&self) -> StorageResult<()> {
        self.client().await.map(|_| ())
    }

    fn is_ready(&self) -> bool {
        self.client.is_ready()
    }

    async fn create(&self, input: &GuessInput) -> StorageResult<CreatedGuess> {
        let response = self
            .client()
            .await?
            .post(self.url("palpites"))
            .timeout(self.timeouts.write)
            .json(&CreateGuessRequest::from(input))
            .send()
            .await
            .map_err(transport_error)?;

        let created: CreateGuessResponse = handle_response(response, StorageError::Write).await?;
        debug!(id = created.id, "API stored guess: {}", created.message);
        Ok(CreatedGuess {
            id: created.id,
            is_winner: created.is_winner,
        })
    }

    async fn list_all(&self) -> StorageResult<Vec<GuessRecord>> {
        let list: GuessListResponse = self.get("palpites", self.timeouts.read).await?;
        Ok(list.palpites)
    }

    async fn aggregate(&self) -> StorageResult<GuessStats> {
        let stats: StatsResponse = self.get("stats", self.timeouts.read).await?;
        Ok(stats.into())
    }

    /// The REST surface has no winner endpoint: read the stats, then the
    /// full list only when a winner exists
    async fn get_winner(&self) -> StorageResult<Option<GuessRecord>> {
        let stats = self.aggregate().await?;
        if stats.winner_name.is_none() {
            return Ok(None);
        }
        let records = self.list_all().await?;
        Ok(records.into_iter().find(|r| r.is_winner))
    }

    async fn clear_all(&self) -> StorageResult<()> {
        let response = self
            .client()
            .await?
            .delete(self.url("palpites"))
            .timeout(self.timeouts.write)
            .send()
            .await
            .map_err(transport_error)?;

        let done: MessageResponse = handle_response(response, StorageError::Write).await?;
        info!("API cleared guesses: {}", done.message);
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        let _: StatsResponse = self.get("stats", self.timeouts.probe).await?;
        Ok(())
    }
}
