use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::error::{StorageError, StorageResult};

/// Fragments left behind by setup templates instead of real values
const PLACEHOLDER_MARKERS: &[&str] = &["your-project", "your_", "seu-projeto", "sua_", "sua-chave", "<"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudCredentials {
    pub url: String,
    pub anon_key: String,
}

impl CloudCredentials {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
        }
    }

    /// Reject empty or template values before any request is made
    pub fn validate(&self) -> StorageResult<()> {
        for (name, value) in [("SUPABASE_URL", &self.url), ("SUPABASE_ANON_KEY", &self.anon_key)] {
            let lowered = value.trim().to_ascii_lowercase();
            if lowered.is_empty() {
                return Err(StorageError::Configuration(format!("{name} is empty")));
            }
            if PLACEHOLDER_MARKERS.iter().any(|marker| lowered.contains(marker)) {
                return Err(StorageError::Configuration(format!("{name} still holds a placeholder value")));
            }
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(StorageError::Configuration(format!("SUPABASE_URL is not an http(s) URL: {}", self.url)));
        }
        Ok(())
    }
}

/// Where the cloud driver gets its credentials from.
///
/// Credentials may be published after the driver is built; readers wait a
/// bounded time for them. Dropping the publisher without sending anything
/// ends the wait immediately.
#[derive(Debug, Clone)]
pub struct CredentialSource {
    rx: watch::Receiver<Option<CloudCredentials>>,
}

impl CredentialSource {
    /// Credentials known up front
    pub fn ready(credentials: CloudCredentials) -> Self {
        let (_tx, rx) = watch::channel(Some(credentials));
        Self { rx }
    }

    /// A source that will never produce credentials
    pub fn missing() -> Self {
        let (_tx, rx) = watch::channel(None);
        Self { rx }
    }

    /// A source fed later through the returned sender
    pub fn pending() -> (watch::Sender<Option<CloudCredentials>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    pub fn from_parts(url: Option<String>, anon_key: Option<String>) -> Self {
        match (url, anon_key) {
            (Some(url), Some(anon_key)) => Self::ready(CloudCredentials::new(url, anon_key)),
            _ => Self::missing(),
        }
    }

    /// Wait up to `limit` for validated credentials
    pub async fn wait(&self, limit: Duration) -> StorageResult<CloudCredentials> {
        let mut rx = self.rx.clone();
        let arrival = async move { rx.wait_for(Option::is_some).await.map(|value| value.clone()) };
        let credentials = match tokio::time::timeout(limit, arrival).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) => None,
            Err(_) => {
                return Err(StorageError::Configuration(format!(
                    "cloud credentials did not arrive within {}ms",
                    limit.as_millis()
                )))
            }
        };

        let credentials = credentials
            .ok_or_else(|| StorageError::Configuration("cloud credentials are not configured".to_string()))?;
        credentials.validate()?;
        info!("Cloud credentials loaded for {}", credentials.url);
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real() -> CloudCredentials {
        CloudCredentials::new("https://abcd.supabase.co", "eyJhbGciOiJIUzI1NiJ9.payload.signature")
    }

    #[tokio::test]
    async fn test_ready_credentials_are_returned() {
        let source = CredentialSource::ready(real());
        assert_eq!(source.wait(Duration::from_millis(10)).await.unwrap(), real());
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_waiting() {
        let source = CredentialSource::from_parts(Some("https://abcd.supabase.co".into()), None);
        let started = std::time::Instant::now();

        let result = source.wait(Duration::from_secs(5)).await;

        assert!(matches!(result, Err(StorageError::Configuration(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_late_credentials_are_picked_up() {
        let (tx, source) = CredentialSource::pending();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(Some(real())).ok();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let credentials = source.wait(Duration::from_secs(2)).await.unwrap();
        assert_eq!(credentials, real());
    }

    #[tokio::test]
    async fn test_wait_is_bounded() {
        let (_tx, source) = CredentialSource::pending();
        let result = source.wait(Duration::from_millis(30)).await;
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }

    #[test]
    fn test_placeholders_are_rejected() {
        let template = CloudCredentials::new("https://your-project.supabase.co", "your_anon_key");
        assert!(template.validate().unwrap_err().is_configuration());

        let blank = CloudCredentials::new("https://abcd.supabase.co", "  ");
        assert!(blank.validate().is_err());

        assert!(real().validate().is_ok());
    }
}
