use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use shared::{parse_timestamp, Gender, GuessId, GuessInput, GuessMapper, GuessRecord, GuessRow};
use sqlx::{migrate::MigrateDatabase, sqlite::SqliteRow, Row, Sqlite, SqlitePool};
use std::sync::Arc;
use tracing::info;

const SELECT_COLUMNS: &str = r#"
    SELECT id, nome, sexo, sugestao_nome, mensagem,
           data_palpite, data_registro, eh_ganhador
    FROM palpites
"#;

/// DbConnection manages database operations
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection
    pub async fn new(url: &str) -> Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url)
                .await
                .with_context(|| format!("Failed to create database {url}"))?;
        }

        let pool = SqlitePool::connect(url)
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;

        Self::setup_schema(&pool).await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Open a private in-memory database, used by tests and throwaway servers
    pub async fn in_memory() -> Result<Self> {
        let db_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", db_id);

        Self::new(&db_url).await
    }

    /// Get the underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS palpites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT NOT NULL,
                sexo TEXT NOT NULL CHECK(sexo IN ('menina', 'menino')),
                sugestao_nome TEXT,
                mensagem TEXT NOT NULL,
                data_palpite DATE NOT NULL,
                data_registro TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                eh_ganhador INTEGER DEFAULT 0
            );
            "#,
        )
        .execute(pool)
        .await?;

        // Databases created before the winner rule existed lack the flag column
        let columns = sqlx::query("PRAGMA table_info(palpites)")
            .fetch_all(pool)
            .await?;
        let has_winner_column = columns
            .iter()
            .any(|c| c.get::<String, _>("name") == "eh_ganhador");

        if !has_winner_column {
            sqlx::query("ALTER TABLE palpites ADD COLUMN eh_ganhador INTEGER DEFAULT 0")
                .execute(pool)
                .await?;
            info!("Added eh_ganhador column to palpites");
        }

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_palpites_data_registro
            ON palpites(data_registro DESC);
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Insert a guess and return its row id
    pub async fn insert_guess(
        &self,
        input: &GuessInput,
        registered_at: DateTime<Utc>,
        is_winner: bool,
    ) -> Result<GuessId> {
        let result = sqlx::query(
            r#"
            INSERT INTO palpites (nome, sexo, sugestao_nome, mensagem, data_palpite, data_registro, eh_ganhador)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.name)
        .bind(input.gender.as_str())
        .bind(&input.suggested_name)
        .bind(&input.message)
        .bind(input.guess_date.format("%Y-%m-%d").to_string())
        .bind(registered_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .bind(i64::from(is_winner))
        .execute(&*self.pool)
        .await
        .context("Failed to insert guess")?;

        Ok(result.last_insert_rowid())
    }

    /// All guesses, most recently registered first
    pub async fn list_guesses(&self) -> Result<Vec<GuessRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} ORDER BY data_registro DESC, id DESC"
        ))
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| decode_row(row).map(GuessMapper::from_row))
            .collect()
    }

    pub async fn count_guesses(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM palpites")
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get::<i64, _>("total") as u64)
    }

    pub async fn count_by_gender(&self, gender: Gender) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM palpites WHERE sexo = ?")
            .bind(gender.as_str())
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get::<i64, _>("total") as u64)
    }

    /// Name on the first flagged guess, if any
    pub async fn winner_name(&self) -> Result<Option<String>> {
        let row = sqlx::query("SELECT nome FROM palpites WHERE eh_ganhador = 1 ORDER BY id LIMIT 1")
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(|r| r.get("nome")))
    }

    pub async fn get_winner(&self) -> Result<Option<GuessRecord>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE eh_ganhador = 1 ORDER BY id LIMIT 1"
        ))
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref()
            .map(|r| decode_row(r).map(GuessMapper::from_row))
            .transpose()
    }

    /// Delete every guess, returning how many were removed
    pub async fn clear_guesses(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM palpites")
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Decode a `palpites` row into its storage shape
fn decode_row(row: &SqliteRow) -> Result<GuessRow> {
    let id: i64 = row.get("id");
    let sexo: String = row.get("sexo");
    let data_palpite: String = row.get("data_palpite");
    let data_registro: Option<String> = row.get("data_registro");

    let data_palpite = NaiveDate::parse_from_str(&data_palpite, "%Y-%m-%d")
        .with_context(|| format!("Invalid data_palpite on guess {id}"))?;
    let data_registro = match data_registro {
        Some(ts) => parse_timestamp(&ts).with_context(|| format!("Invalid data_registro on guess {id}"))?,
        None => DateTime::<Utc>::default(),
    };

    Ok(GuessRow {
        id,
        nome: row.get("nome"),
        sexo: sexo.parse()?,
        sugestao_nome: row.get("sugestao_nome"),
        mensagem: row.get("mensagem"),
        data_palpite,
        data_registro,
        eh_ganhador: row.get::<Option<i64>, _>("eh_ganhador").unwrap_or(0),
    })
}
