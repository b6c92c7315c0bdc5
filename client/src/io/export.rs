use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use shared::GuessRecord;

use crate::error::{StorageError, StorageResult};

/// `palpites_<YYYY-MM-DD>.json`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("palpites_{}.json", date.format("%Y-%m-%d"))
}

/// Write `records` as a pretty-printed JSON array into `dir`, replacing an
/// export from the same day
pub async fn write_export(dir: &Path, records: &[GuessRecord], date: NaiveDate) -> StorageResult<PathBuf> {
    let payload = serde_json::to_vec_pretty(records)
        .map_err(|e| StorageError::Serialization(format!("cannot encode export: {e}")))?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StorageError::Write(format!("cannot create {}: {e}", dir.display())))?;

    let path = dir.join(export_file_name(date));
    tokio::fs::write(&path, payload)
        .await
        .map_err(|e| StorageError::Write(format!("cannot write {}: {e}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::Gender;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_carries_the_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(export_file_name(date), "palpites_2025-03-07.json");
    }

    #[tokio::test]
    async fn test_export_is_a_readable_array() {
        let dir = TempDir::new().unwrap();
        let record = GuessRecord {
            id: 1,
            name: "Ana".to_string(),
            gender: Gender::Girl,
            suggested_name: None,
            message: "oi".to_string(),
            guess_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            registered_at: Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap(),
            is_winner: false,
        };
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();

        let path = write_export(&dir.path().join("out"), &[record.clone()], date).await.unwrap();

        assert_eq!(path, dir.path().join("out").join("palpites_2025-01-02.json"));
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains('\n'));
        let parsed: Vec<GuessRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, vec![record]);
    }
}
