use shared::ValidationError;
use thiserror::Error;

/// Failures a storage driver can report.
///
/// Everything except `Validation` is a backend problem, which the
/// coordinator answers by retrying the operation on local storage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("{0}")]
    Validation(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Corrupt stored data: {0}")]
    Serialization(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Whether another backend may be tried after this failure
    pub fn is_fallback_eligible(&self) -> bool {
        !matches!(self, StorageError::Validation(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, StorageError::Configuration(_))
    }
}

impl From<ValidationError> for StorageError {
    fn from(e: ValidationError) -> Self {
        StorageError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_validation_stays_with_the_caller() {
        assert!(!StorageError::from(ValidationError::InvalidGender).is_fallback_eligible());
        assert!(StorageError::Connection("refused".into()).is_fallback_eligible());
        assert!(StorageError::Read("500".into()).is_fallback_eligible());
        assert!(StorageError::Write("500".into()).is_fallback_eligible());
        assert!(StorageError::Configuration("missing".into()).is_fallback_eligible());
    }

    #[test]
    fn test_validation_message_is_kept_verbatim() {
        let error = StorageError::from(ValidationError::MissingField("nome"));
        assert_eq!(error.to_string(), "Campo obrigatório ausente: nome");
    }
}
