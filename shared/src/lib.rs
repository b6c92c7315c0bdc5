use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier assigned by a backend. Relational backends use their row id,
/// local storage uses the creation timestamp in epoch millis.
pub type GuessId = i64;

/// Position (1-based, per backend instance) of the guess that wins the prize
pub const WINNER_POSITION: u64 = 10;

/// Decide whether the next guess is the winner, given how many guesses the
/// backend already holds. Evaluated before the insert.
pub fn is_winning_position(existing_count: u64) -> bool {
    existing_count + 1 == WINNER_POSITION
}

/// The baby gender a guest is betting on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "menina")]
    Girl,
    #[serde(rename = "menino")]
    Boy,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Girl => "menina",
            Gender::Boy => "menino",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "menina" => Ok(Gender::Girl),
            "menino" => Ok(Gender::Boy),
            _ => Err(ValidationError::InvalidGender),
        }
    }
}

/// Reasons a submitted guess is rejected before it reaches any storage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Campo obrigatório ausente: {0}")]
    MissingField(&'static str),

    #[error("Sexo deve ser \"menina\" ou \"menino\"")]
    InvalidGender,

    #[error("Data do palpite inválida: {0}")]
    InvalidDate(String),
}

/// A guess as the guest typed it, before a backend assigns id, registration
/// time and winner flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuessInput {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "sexo")]
    pub gender: Gender,
    #[serde(rename = "sugestaoNome", default)]
    pub suggested_name: Option<String>,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "dataPalpite")]
    pub guess_date: NaiveDate,
}

impl GuessInput {
    /// Check the required text fields are present. A blank suggested name is
    /// not an error; it is stored as null.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("nome"));
        }
        if self.message.trim().is_empty() {
            return Err(ValidationError::MissingField("mensagem"));
        }
        Ok(())
    }

    /// Trimmed copy with an empty suggested name collapsed to `None`
    pub fn normalized(self) -> Self {
        let suggested_name = self
            .suggested_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            name: self.name.trim().to_string(),
            gender: self.gender,
            suggested_name,
            message: self.message.trim().to_string(),
            guess_date: self.guess_date,
        }
    }
}

/// A stored guess in its client-facing shape. The JSON names match the
/// guest-book pages so list responses, local storage and exports stay readable
/// by the same pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuessRecord {
    pub id: GuessId,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "sexo")]
    pub gender: Gender,
    #[serde(rename = "sugestaoNome", default)]
    pub suggested_name: Option<String>,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "dataPalpite")]
    pub guess_date: NaiveDate,
    /// Assigned by the backend at creation
    #[serde(rename = "dataRegistro", deserialize_with = "timestamp_from_any_format")]
    pub registered_at: DateTime<Utc>,
    /// Assigned once by the winner rule at creation
    #[serde(rename = "ehGanhador", default)]
    pub is_winner: bool,
}

impl GuessRecord {
    pub fn from_input(
        id: GuessId,
        input: GuessInput,
        registered_at: DateTime<Utc>,
        is_winner: bool,
    ) -> Self {
        Self {
            id,
            name: input.name,
            gender: input.gender,
            suggested_name: input.suggested_name,
            message: input.message,
            guess_date: input.guess_date,
            registered_at,
            is_winner,
        }
    }

    /// The user-supplied part of the record
    pub fn input(&self) -> GuessInput {
        GuessInput {
            name: self.name.clone(),
            gender: self.gender,
            suggested_name: self.suggested_name.clone(),
            message: self.message.clone(),
            guess_date: self.guess_date,
        }
    }
}

/// Storage shape used by the relational backends (snake_case columns,
/// winner flag as 0/1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuessRow {
    pub id: GuessId,
    pub nome: String,
    pub sexo: Gender,
    pub sugestao_nome: Option<String>,
    pub mensagem: String,
    pub data_palpite: NaiveDate,
    #[serde(deserialize_with = "timestamp_from_any_format")]
    pub data_registro: DateTime<Utc>,
    #[serde(deserialize_with = "flag_from_bool_or_int", default)]
    pub eh_ganhador: i64,
}

/// Naive layouts accepted after RFC 3339. SQLite's `CURRENT_TIMESTAMP` uses the
/// first, a Postgres `timestamp` column without zone the second.
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a registration timestamp as written by any of the backends. Values
/// without an offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn timestamp_from_any_format<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// Accepts both the SQLite integer flag and a native boolean column
fn flag_from_bool_or_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Null(Option<()>),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => i64::from(b),
        Flag::Int(i) => i64::from(i != 0),
        Flag::Null(_) => 0,
    })
}

/// Mapper between the client-facing record and the relational storage row.
pub struct GuessMapper;

impl GuessMapper {
    pub fn to_row(record: &GuessRecord) -> GuessRow {
        GuessRow {
            id: record.id,
            nome: record.name.clone(),
            sexo: record.gender,
            sugestao_nome: record.suggested_name.clone(),
            mensagem: record.message.clone(),
            data_palpite: record.guess_date,
            data_registro: record.registered_at,
            eh_ganhador: i64::from(record.is_winner),
        }
    }

    pub fn from_row(row: GuessRow) -> GuessRecord {
        GuessRecord {
            id: row.id,
            name: row.nome,
            gender: row.sexo,
            suggested_name: row.sugestao_nome,
            message: row.mensagem,
            guess_date: row.data_palpite,
            registered_at: row.data_registro,
            is_winner: row.eh_ganhador != 0,
        }
    }
}

/// Aggregated view used by the stats page and the pie chart
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuessStats {
    pub total: u64,
    pub girl_count: u64,
    pub boy_count: u64,
    pub winner_name: Option<String>,
}

impl GuessStats {
    /// Tally a full record set. Takes the first flagged record as the winner.
    pub fn tally(records: &[GuessRecord]) -> Self {
        let girl_count = records.iter().filter(|r| r.gender == Gender::Girl).count() as u64;
        let boy_count = records.iter().filter(|r| r.gender == Gender::Boy).count() as u64;
        let winner_name = records
            .iter()
            .find(|r| r.is_winner)
            .map(|r| r.name.clone());

        Self {
            total: girl_count + boy_count,
            girl_count,
            boy_count,
            winner_name,
        }
    }

    pub fn girl_percentage(&self) -> f64 {
        Self::percentage(self.girl_count, self.total)
    }

    pub fn boy_percentage(&self) -> f64 {
        Self::percentage(self.boy_count, self.total)
    }

    fn percentage(part: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            part as f64 / total as f64 * 100.0
        }
    }
}

/// Body of `POST /api/palpites`. Every field is optional on the wire so the
/// server can answer missing fields with its own 400 message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateGuessRequest {
    pub nome: Option<String>,
    pub sexo: Option<String>,
    pub mensagem: Option<String>,
    #[serde(rename = "dataPalpite")]
    pub data_palpite: Option<String>,
    #[serde(rename = "sugestaoNome", default)]
    pub sugestao_nome: Option<String>,
}

impl CreateGuessRequest {
    /// Validate required fields in wire order and build a typed input
    pub fn into_input(self) -> Result<GuessInput, ValidationError> {
        fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or(ValidationError::MissingField(field))
        }

        let nome = required(self.nome, "nome")?;
        let sexo = required(self.sexo, "sexo")?;
        let mensagem = required(self.mensagem, "mensagem")?;
        let data_palpite = required(self.data_palpite, "dataPalpite")?;

        let gender = sexo.parse::<Gender>()?;
        let guess_date = NaiveDate::parse_from_str(data_palpite.trim(), "%Y-%m-%d")
            .map_err(|_| ValidationError::InvalidDate(data_palpite.clone()))?;

        Ok(GuessInput {
            name: nome,
            gender,
            suggested_name: self.sugestao_nome,
            message: mensagem,
            guess_date,
        }
        .normalized())
    }
}

impl From<&GuessInput> for CreateGuessRequest {
    fn from(input: &GuessInput) -> Self {
        Self {
            nome: Some(input.name.clone()),
            sexo: Some(input.gender.as_str().to_string()),
            mensagem: Some(input.message.clone()),
            data_palpite: Some(input.guess_date.format("%Y-%m-%d").to_string()),
            sugestao_nome: input.suggested_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGuessResponse {
    pub id: GuessId,
    pub message: String,
    #[serde(rename = "ehGanhador")]
    pub is_winner: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuessListResponse {
    pub palpites: Vec<GuessRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total: u64,
    pub meninas: u64,
    pub meninos: u64,
    pub ganhador: Option<String>,
}

impl From<GuessStats> for StatsResponse {
    fn from(stats: GuessStats) -> Self {
        Self {
            total: stats.total,
            meninas: stats.girl_count,
            meninos: stats.boy_count,
            ganhador: stats.winner_name,
        }
    }
}

impl From<StatsResponse> for GuessStats {
    fn from(response: StatsResponse) -> Self {
        Self {
            total: response.total,
            girl_count: response.meninas,
            boy_count: response.meninos,
            winner_name: response.ganhador,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
