use std::sync::Arc;

use chrono::Utc;
use shared::{
    is_winning_position, CreateGuessRequest, CreateGuessResponse, Gender, GuessListResponse,
    GuessStats, MessageResponse, StatsResponse,
};
use tokio::sync::Mutex;
use tracing::info;

use crate::db::DbConnection;
use crate::error::ApiError;

/// Guess operations behind the REST surface.
///
/// Creation holds `write_lock` across the count and the insert, so two
/// requests reaching the same server process cannot both take the winning
/// position. Separate processes sharing one database file are not covered.
#[derive(Clone)]
pub struct GuessService {
    db: DbConnection,
    write_lock: Arc<Mutex<()>>,
}

impl GuessService {
    pub fn new(db: DbConnection) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Validate and store a guess, flagging it when it is the winning one
    pub async fn create_guess(&self, request: CreateGuessRequest) -> Result<CreateGuessResponse, ApiError> {
        let input = request.into_input()?;

        let _guard = self.write_lock.lock().await;
        let existing = self.db.count_guesses().await?;
        let is_winner = is_winning_position(existing);

        let id = self.db.insert_guess(&input, Utc::now(), is_winner).await?;
        info!(id, is_winner, "Stored guess from {}", input.name);

        Ok(CreateGuessResponse {
            id,
            message: "Palpite adicionado com sucesso".to_string(),
            is_winner,
        })
    }

    pub async fn list_guesses(&self) -> Result<GuessListResponse, ApiError> {
        let palpites = self.db.list_guesses().await?;
        info!("Found {} guesses", palpites.len());
        Ok(GuessListResponse { palpites })
    }

    /// Totals computed with one count query per figure
    pub async fn stats(&self) -> Result<StatsResponse, ApiError> {
        let stats = GuessStats {
            total: self.db.count_guesses().await?,
            girl_count: self.db.count_by_gender(Gender::Girl).await?,
            boy_count: self.db.count_by_gender(Gender::Boy).await?,
            winner_name: self.db.winner_name().await?,
        };
        Ok(stats.into())
    }

    pub async fn clear_guesses(&self) -> Result<MessageResponse, ApiError> {
        let _guard = self.write_lock.lock().await;
        let removed = self.db.clear_guesses().await?;
        info!("Removed {} guesses", removed);

        Ok(MessageResponse {
            message: "Todos os palpites foram removidos".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_service() -> GuessService {
        let db = DbConnection::in_memory().await.expect("Failed to create test database");
        GuessService::new(db)
    }

    fn request(name: &str, sexo: &str) -> CreateGuessRequest {
        CreateGuessRequest {
            nome: Some(name.to_string()),
            sexo: Some(sexo.to_string()),
            mensagem: Some("Felicidades!".to_string()),
            data_palpite: Some("2025-03-10".to_string()),
            sugestao_nome: None,
        }
    }

    #[tokio::test]
    async fn test_tenth_guess_is_the_winner() {
        let service = create_test_service().await;

        for i in 1..=12 {
            let response = service
                .create_guess(request(&format!("Convidado {i}"), "menino"))
                .await
                .unwrap();
            assert_eq!(response.is_winner, i == 10, "guess #{i}");
        }

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total, 12);
        assert_eq!(stats.ganhador.as_deref(), Some("Convidado 10"));
    }

    #[tokio::test]
    async fn test_concurrent_creates_flag_a_single_winner() {
        let service = create_test_service().await;
        for i in 1..=8 {
            service.create_guess(request(&format!("G{i}"), "menina")).await.unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move { service.create_guess(request(&format!("R{i}"), "menino")).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_winner {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_invalid_gender_is_rejected() {
        let service = create_test_service().await;
        let result = service.create_guess(request("Ana", "talvez")).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
        assert_eq!(service.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_stats_breakdown() {
        let service = create_test_service().await;
        service.create_guess(request("Ana", "menina")).await.unwrap();
        service.create_guess(request("Bia", "menina")).await.unwrap();
        service.create_guess(request("Caio", "menino")).await.unwrap();

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.meninas, 2);
        assert_eq!(stats.meninos, 1);
        assert_eq!(stats.ganhador, None);
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let service = create_test_service().await;
        service.create_guess(request("Ana", "menina")).await.unwrap();

        service.clear_guesses().await.unwrap();

        assert!(service.list_guesses().await.unwrap().palpites.is_empty());
        let stats = service.stats().await.unwrap();
        assert_eq!((stats.total, stats.meninas, stats.meninos), (0, 0, 0));
        assert_eq!(stats.ganhador, None);
    }
}
