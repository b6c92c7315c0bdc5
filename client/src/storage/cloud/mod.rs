//! Driver for the hosted Postgres database reached through its REST
//! gateway (`/rest/v1/palpites`), authenticated with the project's
//! anonymous key.
//!
//! Expected table: the same columns as the SQLite schema, with
//! `data_registro timestamptz default now()` and `eh_ganhador boolean`.

mod credentials;

pub use credentials::{CloudCredentials, CredentialSource};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    is_winning_position, Gender, GuessInput, GuessMapper, GuessRecord, GuessRow, GuessStats,
};
use tracing::{debug, info};

use crate::config::Timeouts;
use crate::error::{StorageError, StorageResult};
use crate::storage::connection::ReadyState;
use crate::storage::traits::{CreatedGuess, DriverId, GuessStorage};

const TABLE_PATH: &str = "rest/v1/palpites";

struct CloudSession {
    client: Client,
    table_url: String,
    anon_key: String,
}

impl CloudSession {
    fn request(&self, method: reqwest::Method) -> RequestBuilder {
        self.client
            .request(method, &self.table_url)
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.anon_key))
    }
}

/// Row shape sent on insert; the database assigns `id`
#[derive(Debug, Serialize)]
struct NewCloudRow<'a> {
    nome: &'a str,
    sexo: Gender,
    sugestao_nome: Option<&'a str>,
    mensagem: &'a str,
    data_palpite: NaiveDate,
    data_registro: DateTime<Utc>,
    eh_ganhador: bool,
}

#[derive(Debug, serde::Deserialize)]
struct NameOnly {
    nome: String,
}

pub struct CloudDriver {
    credentials: CredentialSource,
    timeouts: Timeouts,
    session: ReadyState<CloudSession>,
}

impl CloudDriver {
    pub fn new(credentials: CredentialSource, timeouts: Timeouts) -> Self {
        Self {
            credentials,
            timeouts,
            session: ReadyState::new(),
        }
    }

    async fn session(&self) -> StorageResult<&CloudSession> {
        self.session
            .get_or_try_init(|| async {
                let credentials = self.credentials.wait(self.timeouts.config_wait).await?;
                let client = Client::builder()
                    .connect_timeout(self.timeouts.probe)
                    .build()
                    .map_err(|e| StorageError::Connection(format!("failed to build HTTP client: {e}")))?;
                info!("Cloud client ready for {}", credentials.url);

                Ok(CloudSession {
                    client,
                    table_url: format!("{}/{}", credentials.url.trim_end_matches('/'), TABLE_PATH),
                    anon_key: credentials.anon_key,
                })
            })
            .await
    }

    /// Exact row count for the given filters, read from `Content-Range`
    async fn count(&self, filters: &[(&str, &str)]) -> StorageResult<u64> {
        let response = self
            .session()
            .await?
            .request(reqwest::Method::HEAD)
            .query(&[("select", "id")])
            .query(filters)
            .header("Prefer", "count=exact")
            .timeout(self.timeouts.read)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Read(format!("count request answered {status}")));
        }

        let range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StorageError::Read("count response without Content-Range".to_string()))?;
        parse_total(range)
    }

    async fn select<T: DeserializeOwned>(&self, query: &[(&str, &str)]) -> StorageResult<Vec<T>> {
        let response = self
            .session()
            .await?
            .request(reqwest::Method::GET)
            .query(query)
            .timeout(self.timeouts.read)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response, StorageError::Read).await
    }
}

fn transport_error(e: reqwest::Error) -> StorageError {
    if e.is_timeout() {
        StorageError::Connection(format!("request timed out: {e}"))
    } else {
        StorageError::Connection(e.to_string())
    }
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    on_failure: fn(String) -> StorageError,
) -> StorageResult<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(on_failure(format!("cloud answered {status}: {text}")));
    }
    response
        .json()
        .await
        .map_err(|e| on_failure(format!("unexpected response body: {e}")))
}

/// `Content-Range` looks like `0-9/42`, or `*/0` for an empty result
fn parse_total(range: &str) -> StorageResult<u64> {
    range
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
        .ok_or_else(|| StorageError::Read(format!("unreadable Content-Range: {range}")))
}

#[async_trait]
impl GuessStorage for CloudDriver {
    fn id(&self) -> DriverId {
        DriverId::Cloud
    }

    async fn initialize(&self) -> StorageResult<()> {
        self.session().await.map(|_| ())
    }

    fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    /// Counts then inserts; concurrent writers from other sessions can still
    /// race for the winning position
    async fn create(&self, input: &GuessInput) -> StorageResult<CreatedGuess> {
        input.validate()?;
        let existing = self.count(&[]).await?;
        let is_winner = is_winning_position(existing);

        let row = NewCloudRow {
            nome: &input.name,
            sexo: input.gender,
            sugestao_nome: input.suggested_name.as_deref(),
            mensagem: &input.message,
            data_palpite: input.guess_date,
            data_registro: Utc::now(),
            eh_ganhador: is_winner,
        };

        let response = self
            .session()
            .await?
            .request(reqwest::Method::POST)
            .header("Prefer", "return=representation")
            .json(&[row])
            .timeout(self.timeouts.write)
            .send()
            .await
            .map_err(transport_error)?;

        let inserted: Vec<GuessRow> = decode(response, StorageError::Write).await?;
        let stored = inserted
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Write("insert returned no row".to_string()))?;
        debug!(id = stored.id, is_winner, "Cloud stored guess");

        Ok(CreatedGuess {
            id: stored.id,
            is_winner,
        })
    }

    async fn list_all(&self) -> StorageResult<Vec<GuessRecord>> {
        let rows: Vec<GuessRow> = self
            .select(&[("select", "*"), ("order", "data_registro.desc,id.desc")])
            .await?;
        Ok(rows.into_iter().map(GuessMapper::from_row).collect())
    }

    async fn aggregate(&self) -> StorageResult<GuessStats> {
        let total = self.count(&[]).await?;
        let girl_count = self.count(&[("sexo", "eq.menina")]).await?;
        let boy_count = self.count(&[("sexo", "eq.menino")]).await?;
        let winner: Vec<NameOnly> = self
            .select(&[("select", "nome"), ("eh_ganhador", "eq.true"), ("limit", "1")])
            .await?;

        Ok(GuessStats {
            total,
            girl_count,
            boy_count,
            winner_name: winner.into_iter().next().map(|w| w.nome),
        })
    }

    async fn get_winner(&self) -> StorageResult<Option<GuessRecord>> {
        let rows: Vec<GuessRow> = self
            .select(&[("select", "*"), ("eh_ganhador", "eq.true"), ("limit", "1")])
            .await?;
        Ok(rows.into_iter().next().map(GuessMapper::from_row))
    }

    async fn clear_all(&self) -> StorageResult<()> {
        let response = self
            .session()
            .await?
            .request(reqwest::Method::DELETE)
            .query(&[("id", "gt.0")])
            .timeout(self.timeouts.write)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Write(format!("cloud answered {status}: {text}")));
        }
        info!("Cloud guesses cleared");
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        let response = self
            .session()
            .await?
            .request(reqwest::Method::GET)
            .query(&[("select", "id"), ("limit", "1")])
            .timeout(self.timeouts.probe)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StorageError::Connection(format!("cloud answered {}", response.status())))
        }
    }
}
